//! Background sampling of memory and battery during an attempt.
//!
//! `start` takes a baseline and spawns a cancellable task that samples the
//! probe every `sample_interval`. `stop` cancels the task, takes one last
//! sample, and freezes the accumulators into a `SampleSnapshot`. Start and
//! stop are serialized by an async control lock; the accumulators sit behind
//! a short synchronous lock shared with the sampling task.

mod probe;

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

pub use probe::{BatteryReading, DeviceInfo, DeviceProbe, FixedProbe, SystemProbe};

const BYTES_PER_MB: u64 = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct SamplerConfig {
    pub sample_interval: Duration,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self { sample_interval: Duration::from_millis(100) }
    }
}

/// Frozen sampler state returned by `stop`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleSnapshot {
    pub baseline_bytes: u64,
    pub peak_bytes: u64,
    pub average_bytes: u64,
    pub final_bytes: u64,
    pub sample_count: u64,
    pub battery_before: Option<BatteryReading>,
    pub battery_after: Option<BatteryReading>,
    pub elapsed: Duration,
}

impl SampleSnapshot {
    pub fn peak_mb(&self) -> u64 {
        self.peak_bytes / BYTES_PER_MB
    }

    pub fn average_mb(&self) -> u64 {
        self.average_bytes / BYTES_PER_MB
    }

    /// Growth over the baseline; negative when memory was freed.
    pub fn delta_bytes(&self) -> i64 {
        self.final_bytes as i64 - self.baseline_bytes as i64
    }

    pub fn delta_mb(&self) -> i64 {
        self.delta_bytes() / BYTES_PER_MB as i64
    }

    pub fn charging(&self) -> bool {
        self.battery_after.or(self.battery_before).map_or(false, |b| b.charging)
    }

    /// Percentage points lost; 0 without battery readings.
    pub fn battery_drain(&self) -> f32 {
        match (self.battery_before, self.battery_after) {
            (Some(before), Some(after)) => before.level_percent - after.level_percent,
            _ => 0.0,
        }
    }

    /// Drain extrapolated to one hour; 0 when no time elapsed.
    pub fn drain_per_hour(&self) -> f32 {
        let hours = self.elapsed.as_secs_f32() / 3600.0;
        if hours > 0.0 {
            self.battery_drain() / hours
        } else {
            0.0
        }
    }
}

#[derive(Default)]
struct Accumulator {
    baseline: u64,
    peak: u64,
    sum: u128,
    count: u64,
    last: u64,
    battery_before: Option<BatteryReading>,
    started: Option<Instant>,
}

impl Accumulator {
    fn record(&mut self, bytes: u64) {
        self.peak = self.peak.max(bytes);
        self.sum += u128::from(bytes);
        self.count += 1;
        self.last = bytes;
    }

    fn snapshot(&self, battery_after: Option<BatteryReading>) -> SampleSnapshot {
        let average = if self.count == 0 { 0 } else { (self.sum / u128::from(self.count)) as u64 };
        SampleSnapshot {
            baseline_bytes: self.baseline,
            peak_bytes: self.peak,
            average_bytes: average,
            final_bytes: self.last,
            sample_count: self.count,
            battery_before: self.battery_before,
            battery_after,
            elapsed: self.started.map(|s| s.elapsed()).unwrap_or_default(),
        }
    }
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct MetricsSampler {
    probe: Arc<dyn DeviceProbe>,
    config: SamplerConfig,
    control: tokio::sync::Mutex<Option<Running>>,
    acc: Arc<Mutex<Accumulator>>,
    last_snapshot: Mutex<Option<SampleSnapshot>>,
}

impl MetricsSampler {
    pub fn new(probe: Arc<dyn DeviceProbe>, config: SamplerConfig) -> Self {
        Self {
            probe,
            config,
            control: tokio::sync::Mutex::new(None),
            acc: Arc::new(Mutex::new(Accumulator::default())),
            last_snapshot: Mutex::new(None),
        }
    }

    /// Begin sampling. Restarting while running resets the accumulators and
    /// replaces the sampling task.
    pub async fn start(&self) {
        let mut control = self.control.lock().await;
        if let Some(previous) = control.take() {
            previous.cancel.cancel();
            let _ = previous.handle.await;
        }

        let baseline = self.probe.memory_used_bytes();
        {
            let mut acc = self.acc.lock();
            *acc = Accumulator {
                baseline,
                battery_before: self.probe.battery(),
                started: Some(Instant::now()),
                ..Default::default()
            };
            acc.record(baseline);
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(sample_loop(
            self.probe.clone(),
            self.acc.clone(),
            self.config.sample_interval,
            cancel.clone(),
        ));
        *control = Some(Running { cancel, handle });
    }

    /// Stop sampling and return the frozen snapshot. Without a running
    /// sampler this returns the previous snapshot (or an empty one).
    pub async fn stop(&self) -> SampleSnapshot {
        let mut control = self.control.lock().await;
        let Some(running) = control.take() else {
            return self.last_snapshot().unwrap_or_default();
        };
        running.cancel.cancel();
        if let Err(e) = running.handle.await {
            tracing::warn!(error = %e, "sampler task ended abnormally");
        }

        let final_reading = self.probe.memory_used_bytes();
        let battery_after = self.probe.battery();
        let snapshot = {
            let mut acc = self.acc.lock();
            acc.record(final_reading);
            acc.snapshot(battery_after)
        };
        *self.last_snapshot.lock() = Some(snapshot.clone());
        snapshot
    }

    /// Cancel sampling without producing a snapshot.
    pub async fn cancel(&self) {
        if let Some(running) = self.control.lock().await.take() {
            running.cancel.cancel();
            let _ = running.handle.await;
        }
    }

    pub async fn is_running(&self) -> bool {
        self.control.lock().await.is_some()
    }

    pub fn last_snapshot(&self) -> Option<SampleSnapshot> {
        self.last_snapshot.lock().clone()
    }

    /// Static device information, independent of sampling state.
    pub fn device_info(&self) -> DeviceInfo {
        self.probe.device_info()
    }

    pub fn current_memory_bytes(&self) -> u64 {
        self.probe.memory_used_bytes()
    }

    pub fn available_memory_bytes(&self) -> u64 {
        self.probe.available_memory_bytes()
    }
}

async fn sample_loop(
    probe: Arc<dyn DeviceProbe>,
    acc: Arc<Mutex<Accumulator>>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately; the baseline already covers it.
    ticker.tick().await;
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let bytes = probe.memory_used_bytes();
                acc.lock().record(bytes);
            }
        }
    }
}
