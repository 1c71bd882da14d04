//! Integration tests for the benchmark scheduler over mock backends.

use std::sync::Arc;
use std::time::Duration;

use bench_core::backend::{
    BackendEvent, BackendRegistry, EventLog, InferenceBackend, MockBackend, MockFailure, ProviderId,
    TaskKind,
};
use bench_core::benchmark::{
    BenchmarkScheduler, BenchmarkSession, BenchmarkStatus, SchedulerConfig, SchedulerError, TestCase,
};
use bench_core::orchestrator::{ProviderOrchestrator, ProviderSettings};
use bench_core::sampler::{BatteryReading, DeviceInfo, DeviceProbe, FixedProbe, MetricsSampler, SamplerConfig};
use tokio::sync::watch;

const MB: u64 = 1024 * 1024;

fn scheduler_with(registry: BackendRegistry, delay: Duration) -> BenchmarkScheduler {
    let initial = registry.providers()[0];
    let orchestrator = Arc::new(ProviderOrchestrator::new(registry, initial));
    let sampler = Arc::new(MetricsSampler::new(
        Arc::new(FixedProbe::new(256 * MB)),
        SamplerConfig { sample_interval: Duration::from_millis(5) },
    ));
    BenchmarkScheduler::new(orchestrator, sampler, SchedulerConfig { inter_test_delay: delay })
}

fn cases(n: usize) -> Vec<TestCase> {
    (0..n)
        .map(|i| TestCase::new(format!("case-{}", i), format!("Case {}", i), TaskKind::Chat, "Hello there"))
        .collect()
}

fn slow(provider: ProviderId) -> Arc<MockBackend> {
    Arc::new(
        MockBackend::new(provider)
            .with_tokens(["one", " two", " three", " four"])
            .with_token_delay(Duration::from_millis(60)),
    )
}

async fn wait_for_results(scheduler: &BenchmarkScheduler, count: usize) {
    let mut rx = scheduler.subscribe_results();
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if rx.borrow_and_update().len() >= count {
                return;
            }
            rx.changed().await.unwrap();
        }
    })
    .await
    .expect("results did not arrive in time");
}

#[tokio::test]
async fn two_by_two_with_failing_provider() {
    let good = Arc::new(
        MockBackend::new(ProviderId::NativeCpp)
            .with_tokens(["a", "b", "c"])
            .with_token_delay(Duration::from_millis(5)),
    );
    let bad = Arc::new(
        MockBackend::new(ProviderId::LiteRuntime)
            .with_failure(MockFailure::GenerateRejects("interpreter crashed".into())),
    );
    let scheduler = scheduler_with(BackendRegistry::new().with(good).with(bad), Duration::ZERO);

    let session = BenchmarkSession::new(
        "2x2",
        cases(2),
        vec![ProviderId::NativeCpp, ProviderId::LiteRuntime],
    );
    scheduler.start(session).unwrap();
    let done = scheduler.wait_until_finished().await.unwrap();

    assert_eq!(done.status, BenchmarkStatus::Completed);
    assert_eq!(done.results.len(), 4);

    let order: Vec<(&str, ProviderId)> =
        done.results.iter().map(|r| (r.test_case_id.as_str(), r.provider)).collect();
    assert_eq!(
        order,
        vec![
            ("case-0", ProviderId::NativeCpp),
            ("case-0", ProviderId::LiteRuntime),
            ("case-1", ProviderId::NativeCpp),
            ("case-1", ProviderId::LiteRuntime),
        ]
    );

    let failures: Vec<_> = done.results.iter().filter(|r| !r.success).collect();
    assert_eq!(failures.len(), 2);
    assert!(failures.iter().all(|r| r.provider == ProviderId::LiteRuntime));
    assert!(failures[0].error_message.as_deref().unwrap().contains("interpreter crashed"));
    assert_eq!(failures[0].latency.total_latency_ms, 0);

    for r in done.results.iter().filter(|r| r.success) {
        assert_eq!(r.latency.total_tokens, 3);
        assert_eq!(r.generated_text, "abc");
        assert!(r.latency.total_latency_ms > 0);
        let expected = r.latency.total_tokens as f64 * 1000.0 / r.latency.total_latency_ms as f64;
        assert!((r.latency.tokens_per_second - expected).abs() < 1e-9);
        assert!(r.latency.first_token_latency_ms <= r.latency.total_latency_ms);
        assert_eq!(r.model_name.as_deref(), Some("mock-native_cpp"));
    }

    let progress = scheduler.progress();
    assert_eq!(progress.total_tests, 4);
    assert_eq!(progress.completed_tests, 4);
    assert_eq!(progress.progress_percentage(), 100.0);
    assert!(progress.is_completed);
}

#[tokio::test]
async fn cancel_after_two_of_four_pairs() {
    let scheduler = scheduler_with(
        BackendRegistry::new()
            .with(slow(ProviderId::NativeCpp))
            .with(slow(ProviderId::OnDeviceService)),
        Duration::ZERO,
    );
    let session = BenchmarkSession::new(
        "cancel",
        cases(2),
        vec![ProviderId::NativeCpp, ProviderId::OnDeviceService],
    );
    scheduler.start(session).unwrap();

    wait_for_results(&scheduler, 2).await;
    assert!(scheduler.stop().await);

    let session = scheduler.current_session().unwrap();
    assert_eq!(session.status, BenchmarkStatus::Cancelled);
    assert!(session.end_time.is_some());
    assert_eq!(session.results.len(), 2);
    assert_eq!(scheduler.results().len(), 2);
    assert!(!scheduler.progress().is_running);
    assert!(!scheduler.progress().is_completed);
}

#[tokio::test]
async fn cancel_during_inter_test_delay() {
    let scheduler = scheduler_with(
        BackendRegistry::new().with(Arc::new(MockBackend::new(ProviderId::NativeCpp))),
        Duration::from_secs(30),
    );
    let session = BenchmarkSession::new("delay", cases(3), vec![ProviderId::NativeCpp]);
    scheduler.start(session).unwrap();

    wait_for_results(&scheduler, 1).await;
    let stopped = tokio::time::timeout(Duration::from_secs(5), scheduler.stop())
        .await
        .expect("stop should not wait out the delay");
    assert!(stopped);
    assert_eq!(scheduler.current_session().unwrap().status, BenchmarkStatus::Cancelled);
    assert_eq!(scheduler.results().len(), 1);
}

#[tokio::test]
async fn second_start_is_rejected() {
    let scheduler = scheduler_with(
        BackendRegistry::new().with(slow(ProviderId::NativeCpp)),
        Duration::ZERO,
    );
    let first = BenchmarkSession::new("first", cases(2), vec![ProviderId::NativeCpp]);
    let second = BenchmarkSession::new("second", cases(1), vec![ProviderId::NativeCpp]);

    scheduler.start(first).unwrap();
    assert!(matches!(scheduler.start(second), Err(SchedulerError::AlreadyRunning)));
    assert!(scheduler.is_running());
    assert!(scheduler.stop().await);
}

#[tokio::test]
async fn stop_on_finished_session_is_noop() {
    let scheduler = scheduler_with(
        BackendRegistry::new().with(Arc::new(MockBackend::new(ProviderId::NativeCpp))),
        Duration::ZERO,
    );
    scheduler
        .start(BenchmarkSession::new("done", cases(1), vec![ProviderId::NativeCpp]))
        .unwrap();
    let done = scheduler.wait_until_finished().await.unwrap();
    assert_eq!(done.status, BenchmarkStatus::Completed);

    assert!(!scheduler.stop().await);
    let after = scheduler.current_session().unwrap();
    assert_eq!(after.status, BenchmarkStatus::Completed);
    assert_eq!(after.end_time, done.end_time);
}

#[tokio::test]
async fn unavailable_and_panicking_providers_produce_failed_rows() {
    let broken = Arc::new(
        MockBackend::new(ProviderId::LiteRuntime)
            .with_failure(MockFailure::InitFails("no model file".into())),
    );
    let panicky = Arc::new(MockBackend::new(ProviderId::OnDeviceService).with_failure(MockFailure::Panics));
    let good = Arc::new(MockBackend::new(ProviderId::NativeCpp));
    let scheduler = scheduler_with(
        BackendRegistry::new().with(good).with(broken).with(panicky),
        Duration::ZERO,
    );

    let session = BenchmarkSession::new("faults", cases(1), ProviderId::ALL.to_vec());
    scheduler.start(session).unwrap();
    let done = scheduler.wait_until_finished().await.unwrap();

    assert_eq!(done.status, BenchmarkStatus::Completed);
    assert_eq!(done.results.len(), 3);
    assert!(done.results[0].success);

    let unavailable = &done.results[1];
    assert!(!unavailable.success);
    assert!(unavailable.error_message.as_deref().unwrap().contains("not available"));

    let panicked = &done.results[2];
    assert!(!panicked.success);
    assert!(panicked.error_message.as_deref().unwrap().contains("panicked"));
}

#[tokio::test]
async fn mid_stream_error_is_recorded_and_run_continues() {
    let flaky = Arc::new(MockBackend::new(ProviderId::NativeCpp).with_failure(
        MockFailure::GenerateErrors { after_tokens: 2, message: "context overflow".into() },
    ));
    let scheduler = scheduler_with(BackendRegistry::new().with(flaky), Duration::ZERO);
    scheduler
        .start(BenchmarkSession::new("flaky", cases(2), vec![ProviderId::NativeCpp]))
        .unwrap();
    let done = scheduler.wait_until_finished().await.unwrap();

    assert_eq!(done.results.len(), 2);
    assert!(done.results.iter().all(|r| !r.success));
    assert!(done.results[1].error_message.as_deref().unwrap().contains("context overflow"));
}

#[tokio::test]
async fn backend_released_after_session_ends() {
    let log = EventLog::default();
    let a = Arc::new(MockBackend::new(ProviderId::NativeCpp).with_event_log(log.clone()));
    let b = Arc::new(MockBackend::new(ProviderId::LiteRuntime).with_event_log(log.clone()));
    let scheduler = scheduler_with(BackendRegistry::new().with(a.clone()).with(b.clone()), Duration::ZERO);

    scheduler
        .start(BenchmarkSession::new(
            "release",
            cases(1),
            vec![ProviderId::NativeCpp, ProviderId::LiteRuntime],
        ))
        .unwrap();
    scheduler.wait_until_finished().await.unwrap();

    let events = log.lock().clone();
    assert_eq!(events.last(), Some(&BackendEvent::Release(ProviderId::LiteRuntime)));
    assert!(!a.is_available());
    assert!(!b.is_available());

    // Every initialize of a new provider is preceded by a release of the old one.
    let init_b = events
        .iter()
        .position(|e| *e == BackendEvent::Initialize(ProviderId::LiteRuntime))
        .unwrap();
    assert!(events[..init_b].contains(&BackendEvent::Release(ProviderId::NativeCpp)));
}

#[tokio::test]
async fn finished_session_can_be_rerun() {
    let scheduler = scheduler_with(
        BackendRegistry::new().with(Arc::new(MockBackend::new(ProviderId::NativeCpp))),
        Duration::ZERO,
    );
    let session = BenchmarkSession::new("again", cases(1), vec![ProviderId::NativeCpp]);
    scheduler.start(session).unwrap();
    let first = scheduler.wait_until_finished().await.unwrap();

    let id = scheduler.start(first.clone()).unwrap();
    assert_ne!(id, first.id);
    let second = scheduler.wait_until_finished().await.unwrap();
    assert_eq!(second.id, id);
    assert_eq!(second.status, BenchmarkStatus::Completed);
    assert_eq!(second.results.len(), 1);

    scheduler.clear();
    assert!(scheduler.current_session().is_none());
    assert!(scheduler.results().is_empty());
    assert_eq!(scheduler.progress().total_tests, 0);
}

#[tokio::test]
async fn progress_never_exceeds_results() {
    let scheduler = scheduler_with(
        BackendRegistry::new()
            .with(Arc::new(MockBackend::new(ProviderId::NativeCpp)))
            .with(Arc::new(MockBackend::new(ProviderId::LiteRuntime))),
        Duration::from_millis(5),
    );
    let mut progress = scheduler.subscribe_progress();
    let results = scheduler.subscribe_results();

    scheduler
        .start(BenchmarkSession::new(
            "watch",
            cases(3),
            vec![ProviderId::NativeCpp, ProviderId::LiteRuntime],
        ))
        .unwrap();

    tokio::time::timeout(Duration::from_secs(10), async {
        while progress.changed().await.is_ok() {
            let p = progress.borrow_and_update().clone();
            assert!(p.completed_tests <= results.borrow().len());
            assert!(p.completed_tests <= p.total_tests);
            if !p.is_running {
                break;
            }
        }
    })
    .await
    .unwrap();

    assert_eq!(scheduler.results().len(), 6);
}

#[tokio::test]
async fn panic_during_activation_fails_only_that_pair() {
    let good = Arc::new(MockBackend::new(ProviderId::NativeCpp));
    let crashing = Arc::new(MockBackend::new(ProviderId::LiteRuntime).with_failure(MockFailure::InitPanics));
    let scheduler = scheduler_with(BackendRegistry::new().with(good).with(crashing), Duration::ZERO);

    scheduler
        .start(BenchmarkSession::new(
            "init-panic",
            cases(2),
            vec![ProviderId::NativeCpp, ProviderId::LiteRuntime],
        ))
        .unwrap();
    let done = scheduler.wait_until_finished().await.unwrap();

    assert_eq!(done.status, BenchmarkStatus::Completed);
    assert_eq!(done.results.len(), 4);
    let failures: Vec<_> = done.results.iter().filter(|r| !r.success).collect();
    assert_eq!(failures.len(), 2);
    for r in failures {
        assert_eq!(r.provider, ProviderId::LiteRuntime);
        assert!(r.error_message.as_deref().unwrap().contains("panicked during activation"));
    }
}

/// Probe whose device lookup crashes, taking down the session loop itself.
struct BrokenDeviceProbe;

impl DeviceProbe for BrokenDeviceProbe {
    fn memory_used_bytes(&self) -> u64 {
        256 * MB
    }

    fn available_memory_bytes(&self) -> u64 {
        1024 * MB
    }

    fn battery(&self) -> Option<BatteryReading> {
        None
    }

    fn device_info(&self) -> DeviceInfo {
        panic!("device table corrupted")
    }
}

#[tokio::test]
async fn loop_panic_marks_session_failed() {
    let native = Arc::new(MockBackend::new(ProviderId::NativeCpp));
    let orchestrator = Arc::new(ProviderOrchestrator::new(
        BackendRegistry::new().with(native.clone()),
        ProviderId::NativeCpp,
    ));
    let sampler = Arc::new(MetricsSampler::new(
        Arc::new(BrokenDeviceProbe),
        SamplerConfig { sample_interval: Duration::from_millis(5) },
    ));
    let scheduler = BenchmarkScheduler::new(orchestrator, sampler, SchedulerConfig { inter_test_delay: Duration::ZERO });

    scheduler
        .start(BenchmarkSession::new("broken", cases(2), vec![ProviderId::NativeCpp]))
        .unwrap();
    let done = tokio::time::timeout(Duration::from_secs(5), scheduler.wait_until_finished())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(done.status, BenchmarkStatus::Failed);
    assert!(done.end_time.is_some());
    assert!(done.results.is_empty());

    // The supervisor clears the running flag last, after publishing `Failed`.
    tokio::time::timeout(Duration::from_secs(5), async {
        while scheduler.is_running() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .unwrap();
    assert!(!scheduler.progress().is_running);
    assert!(!native.is_available());
}

#[tokio::test]
async fn settings_switches_never_mislabel_results() {
    let native = Arc::new(
        MockBackend::new(ProviderId::NativeCpp)
            .with_tokens(["n1", "n2"])
            .with_token_delay(Duration::from_millis(3)),
    );
    let lite = Arc::new(
        MockBackend::new(ProviderId::LiteRuntime)
            .with_tokens(["l1", "l2"])
            .with_token_delay(Duration::from_millis(3)),
    );
    let orchestrator = Arc::new(ProviderOrchestrator::new(
        BackendRegistry::new().with(native).with(lite),
        ProviderId::NativeCpp,
    ));
    let sampler = Arc::new(MetricsSampler::new(
        Arc::new(FixedProbe::new(256 * MB)),
        SamplerConfig { sample_interval: Duration::from_millis(5) },
    ));
    let scheduler = BenchmarkScheduler::new(
        orchestrator.clone(),
        sampler,
        SchedulerConfig { inter_test_delay: Duration::from_millis(2) },
    );

    let (tx, rx) = watch::channel(ProviderSettings::default());
    let follower = orchestrator.clone().follow_settings(rx);
    let toggler = tokio::spawn(async move {
        for _ in 0..30 {
            tokio::time::sleep(Duration::from_millis(4)).await;
            tx.send_modify(|s| {
                s.provider = if s.provider == ProviderId::NativeCpp {
                    ProviderId::LiteRuntime
                } else {
                    ProviderId::NativeCpp
                };
            });
        }
    });

    scheduler
        .start(BenchmarkSession::new("switching", cases(6), vec![ProviderId::NativeCpp]))
        .unwrap();
    let done = scheduler.wait_until_finished().await.unwrap();
    toggler.await.unwrap();
    follower.await.unwrap();

    assert_eq!(done.status, BenchmarkStatus::Completed);
    assert_eq!(done.results.len(), 6);
    for r in &done.results {
        assert_eq!(r.provider, ProviderId::NativeCpp);
        if r.success {
            assert_eq!(r.generated_text, "n1n2");
        } else {
            assert!(r.error_message.as_deref().unwrap().contains("changed"), "{:?}", r.error_message);
        }
    }
}
