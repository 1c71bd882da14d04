//! Device readings: process memory, system memory, battery, device identity.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Battery state at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatteryReading {
    /// Charge level, 0-100.
    pub level_percent: f32,
    pub charging: bool,
    pub temperature_c: Option<f32>,
}

/// Static device information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub manufacturer: String,
    pub model: String,
    pub os: String,
    pub os_version: String,
    pub cpu_arch: String,
    pub cpu_cores: usize,
    pub total_ram_bytes: u64,
    pub hostname: String,
}

impl DeviceInfo {
    pub fn total_ram_mb(&self) -> u64 {
        self.total_ram_bytes / (1024 * 1024)
    }
}

/// Source of device readings for the sampler.
pub trait DeviceProbe: Send + Sync {
    /// Resident memory of this process.
    fn memory_used_bytes(&self) -> u64;

    fn available_memory_bytes(&self) -> u64;

    /// `None` on devices without a battery.
    fn battery(&self) -> Option<BatteryReading>;

    fn device_info(&self) -> DeviceInfo;
}

/// Linux probe reading procfs and sysfs.
pub struct SystemProbe {
    proc_root: PathBuf,
    power_supply_root: PathBuf,
    dmi_root: PathBuf,
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self {
            proc_root: PathBuf::from("/proc"),
            power_supply_root: PathBuf::from("/sys/class/power_supply"),
            dmi_root: PathBuf::from("/sys/class/dmi/id"),
        }
    }
}

impl SystemProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Probe rooted somewhere other than `/proc` and `/sys`.
    pub fn with_roots(
        proc_root: impl Into<PathBuf>,
        power_supply_root: impl Into<PathBuf>,
        dmi_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            proc_root: proc_root.into(),
            power_supply_root: power_supply_root.into(),
            dmi_root: dmi_root.into(),
        }
    }

    fn meminfo_bytes(&self, key: &str) -> Option<u64> {
        let text = std::fs::read_to_string(self.proc_root.join("meminfo")).ok()?;
        kib_field(&text, key)
    }

    fn battery_dir(&self) -> Option<PathBuf> {
        let entries = std::fs::read_dir(&self.power_supply_root).ok()?;
        let mut dirs: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| read_trimmed(&p.join("type")).as_deref() == Some("Battery"))
            .collect();
        dirs.sort();
        dirs.into_iter().next()
    }

    fn dmi(&self, name: &str) -> Option<String> {
        read_trimmed(&self.dmi_root.join(name)).filter(|s| !s.is_empty())
    }

    fn os_release(&self) -> Option<String> {
        read_trimmed(&self.proc_root.join("sys/kernel/osrelease"))
    }
}

impl DeviceProbe for SystemProbe {
    fn memory_used_bytes(&self) -> u64 {
        std::fs::read_to_string(self.proc_root.join("self/status"))
            .ok()
            .and_then(|text| kib_field(&text, "VmRSS"))
            .unwrap_or(0)
    }

    fn available_memory_bytes(&self) -> u64 {
        self.meminfo_bytes("MemAvailable").unwrap_or(0)
    }

    fn battery(&self) -> Option<BatteryReading> {
        let dir = self.battery_dir()?;
        let level_percent = read_trimmed(&dir.join("capacity"))?.parse::<f32>().ok()?;
        let status = read_trimmed(&dir.join("status")).unwrap_or_default();
        // sysfs reports tenths of a degree
        let temperature_c = read_trimmed(&dir.join("temp"))
            .and_then(|t| t.parse::<f32>().ok())
            .map(|t| t / 10.0);
        Some(BatteryReading {
            level_percent,
            charging: matches!(status.as_str(), "Charging" | "Full"),
            temperature_c,
        })
    }

    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            manufacturer: self.dmi("sys_vendor").unwrap_or_else(|| "unknown".to_string()),
            model: self.dmi("product_name").unwrap_or_else(|| "unknown".to_string()),
            os: std::env::consts::OS.to_string(),
            os_version: self.os_release().unwrap_or_else(|| "unknown".to_string()),
            cpu_arch: std::env::consts::ARCH.to_string(),
            cpu_cores: num_cpus::get(),
            total_ram_bytes: self.meminfo_bytes("MemTotal").unwrap_or(0),
            hostname: hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| "unknown".to_string()),
        }
    }
}

fn read_trimmed(path: &Path) -> Option<String> {
    std::fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}

/// Parse a `Key:   1234 kB` line into bytes.
fn kib_field(text: &str, key: &str) -> Option<u64> {
    text.lines().find_map(|line| {
        let (name, rest) = line.split_once(':')?;
        if name.trim() != key {
            return None;
        }
        let kib = rest.split_whitespace().next()?.parse::<u64>().ok()?;
        Some(kib * 1024)
    })
}

/// Scripted probe. Each reading pops the next scripted value; the last
/// value repeats once the script runs out.
pub struct FixedProbe {
    memory: Mutex<VecDeque<u64>>,
    battery: Mutex<VecDeque<Option<BatteryReading>>>,
    available_bytes: u64,
    info: DeviceInfo,
}

impl FixedProbe {
    pub fn new(memory_bytes: u64) -> Self {
        Self {
            memory: Mutex::new(VecDeque::from([memory_bytes])),
            battery: Mutex::new(VecDeque::from([None])),
            available_bytes: 4 * 1024 * 1024 * 1024,
            info: DeviceInfo {
                manufacturer: "Bench".to_string(),
                model: "Fixed".to_string(),
                os: "test".to_string(),
                os_version: "0".to_string(),
                cpu_arch: std::env::consts::ARCH.to_string(),
                cpu_cores: 8,
                total_ram_bytes: 8 * 1024 * 1024 * 1024,
                hostname: "fixed-probe".to_string(),
            },
        }
    }

    pub fn with_memory_script(self, readings: impl IntoIterator<Item = u64>) -> Self {
        let script: VecDeque<u64> = readings.into_iter().collect();
        if !script.is_empty() {
            *self.memory.lock() = script;
        }
        self
    }

    pub fn with_battery_script(self, readings: impl IntoIterator<Item = BatteryReading>) -> Self {
        let script: VecDeque<Option<BatteryReading>> = readings.into_iter().map(Some).collect();
        if !script.is_empty() {
            *self.battery.lock() = script;
        }
        self
    }

    pub fn with_available_memory(mut self, bytes: u64) -> Self {
        self.available_bytes = bytes;
        self
    }
}

fn next_scripted<T: Copy>(script: &Mutex<VecDeque<T>>) -> Option<T> {
    let mut script = script.lock();
    if script.len() > 1 {
        script.pop_front()
    } else {
        script.front().copied()
    }
}

impl DeviceProbe for FixedProbe {
    fn memory_used_bytes(&self) -> u64 {
        next_scripted(&self.memory).unwrap_or(0)
    }

    fn available_memory_bytes(&self) -> u64 {
        self.available_bytes
    }

    fn battery(&self) -> Option<BatteryReading> {
        next_scripted(&self.battery).flatten()
    }

    fn device_info(&self) -> DeviceInfo {
        self.info.clone()
    }
}
