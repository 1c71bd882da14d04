//! Runtime configuration loading from environment variables.
//!
//! All configuration values are loaded from `BENCH_CORE_*` environment
//! variables with sensible defaults. Invalid values fall back to defaults
//! without crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `BENCH_CORE_INTER_TEST_DELAY_MS` | 2000 | Pause between attempts (ms) |
//! | `BENCH_CORE_SAMPLE_INTERVAL_MS` | 100 | Sampler period (ms, floor 10) |
//! | `BENCH_CORE_STREAM_BUFFER` | 64 | Token channel capacity (floor 1) |
//! | `BENCH_CORE_PROMPT_MODE` | unified | `unified` or `optimized` |
//! | `BENCH_CORE_MODEL_DIR` | models | Directory scanned for model files |
//! | `BENCH_CORE_CONTEXT_SIZE` | 2048 | Native context window (floor 128) |
//! | `BENCH_CORE_THREADS` | 0 | Native threads (0 = auto) |
//! | `BENCH_CORE_GPU` | false | Offload native layers to the GPU |
//! | `BENCH_CORE_LOG_FORMAT` | json | `json` or `pretty` |
//! | `BENCH_CORE_LOG_LEVEL` | info | tracing filter directive |

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::backend::{NativeOptions, PromptMode};
use crate::benchmark::SchedulerConfig;
use crate::sampler::SamplerConfig;
use crate::telemetry::{LogConfig, LogFormat};

/// Effective runtime configuration summary (serializable).
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub inter_test_delay_ms: u64,
    pub sample_interval_ms: u64,
    pub stream_buffer: usize,
    pub prompt_mode: PromptMode,
    pub model_dir: PathBuf,
    pub context_size: u32,
    pub threads: usize,
    pub gpu_enabled: bool,
    pub log_format: String,
    pub log_level: String,
}

/// All runtime configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub model_dir: PathBuf,
    pub prompt_mode: PromptMode,
    pub stream_buffer: usize,
    pub scheduler: SchedulerConfig,
    pub sampler: SamplerConfig,
    pub native: NativeOptions,
    pub log: LogConfig,
}

/// Parse a `usize` env var, returning `default` on missing or invalid.
fn parse_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a `u32` env var, returning `default` on missing or invalid.
fn parse_u32(key: &str, default: u32) -> u32 {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<u32>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a `u64` env var, returning `default` on missing or invalid.
fn parse_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<u64>().unwrap_or(default),
        Err(_) => default,
    }
}

fn parse_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => match val.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

fn load_scheduler_config() -> SchedulerConfig {
    let delay_ms = parse_u64("BENCH_CORE_INTER_TEST_DELAY_MS", 2000);
    SchedulerConfig { inter_test_delay: Duration::from_millis(delay_ms) }
}

fn load_sampler_config() -> SamplerConfig {
    let interval_ms = parse_u64("BENCH_CORE_SAMPLE_INTERVAL_MS", 100).max(10); // floor: 10ms
    SamplerConfig { sample_interval: Duration::from_millis(interval_ms) }
}

fn load_native_options() -> NativeOptions {
    let context_size = parse_u32("BENCH_CORE_CONTEXT_SIZE", 2048).max(128);
    let threads = parse_usize("BENCH_CORE_THREADS", 0);
    let gpu_enabled = parse_bool("BENCH_CORE_GPU", false);
    NativeOptions { context_size, threads, gpu_enabled }
}

fn load_log_config() -> LogConfig {
    let format = std::env::var("BENCH_CORE_LOG_FORMAT")
        .ok()
        .and_then(|v| v.parse::<LogFormat>().ok())
        .unwrap_or_default();
    let level = std::env::var("BENCH_CORE_LOG_LEVEL")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| "info".to_string());
    LogConfig { format, level, output_path: None }
}

/// Load all configuration from environment variables.
///
/// Missing or invalid values fall back to safe defaults without panicking.
pub fn load() -> EnvConfig {
    let model_dir = std::env::var("BENCH_CORE_MODEL_DIR")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("models"));
    let prompt_mode = std::env::var("BENCH_CORE_PROMPT_MODE")
        .ok()
        .and_then(|v| v.parse::<PromptMode>().ok())
        .unwrap_or_default();
    let stream_buffer = parse_usize("BENCH_CORE_STREAM_BUFFER", 64).max(1);

    EnvConfig {
        model_dir,
        prompt_mode,
        stream_buffer,
        scheduler: load_scheduler_config(),
        sampler: load_sampler_config(),
        native: load_native_options(),
        log: load_log_config(),
    }
}

impl EnvConfig {
    /// Return a serializable summary of all effective values.
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            inter_test_delay_ms: self.scheduler.inter_test_delay.as_millis() as u64,
            sample_interval_ms: self.sampler.sample_interval.as_millis() as u64,
            stream_buffer: self.stream_buffer,
            prompt_mode: self.prompt_mode,
            model_dir: self.model_dir.clone(),
            context_size: self.native.context_size,
            threads: self.native.threads,
            gpu_enabled: self.native.gpu_enabled,
            log_format: match self.log.format {
                LogFormat::Json => "json".to_string(),
                LogFormat::Pretty => "pretty".to_string(),
            },
            log_level: self.log.level.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Serialize env-mutating tests to avoid cross-test pollution.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const ENV_KEYS: &[&str] = &[
        "BENCH_CORE_INTER_TEST_DELAY_MS",
        "BENCH_CORE_SAMPLE_INTERVAL_MS",
        "BENCH_CORE_STREAM_BUFFER",
        "BENCH_CORE_PROMPT_MODE",
        "BENCH_CORE_MODEL_DIR",
        "BENCH_CORE_CONTEXT_SIZE",
        "BENCH_CORE_THREADS",
        "BENCH_CORE_GPU",
        "BENCH_CORE_LOG_FORMAT",
        "BENCH_CORE_LOG_LEVEL",
    ];

    fn clear_env_vars() {
        for k in ENV_KEYS {
            std::env::remove_var(k);
        }
    }

    #[test]
    fn test_defaults_are_sensible() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let cfg = load();
        assert_eq!(cfg.scheduler.inter_test_delay, Duration::from_millis(2000));
        assert_eq!(cfg.sampler.sample_interval, Duration::from_millis(100));
        assert_eq!(cfg.stream_buffer, 64);
        assert_eq!(cfg.prompt_mode, PromptMode::Unified);
        assert_eq!(cfg.model_dir, PathBuf::from("models"));
        assert_eq!(cfg.native.context_size, 2048);
        assert_eq!(cfg.native.threads, 0);
        assert!(!cfg.native.gpu_enabled);
        assert_eq!(cfg.log.format, LogFormat::Json);
        assert_eq!(cfg.log.level, "info");
    }

    #[test]
    fn test_env_vars_override_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("BENCH_CORE_INTER_TEST_DELAY_MS", "0");
        std::env::set_var("BENCH_CORE_PROMPT_MODE", "optimized");
        std::env::set_var("BENCH_CORE_MODEL_DIR", "/data/models");
        std::env::set_var("BENCH_CORE_THREADS", "6");
        std::env::set_var("BENCH_CORE_GPU", "yes");
        std::env::set_var("BENCH_CORE_LOG_FORMAT", "pretty");
        let cfg = load();
        assert_eq!(cfg.scheduler.inter_test_delay, Duration::ZERO);
        assert_eq!(cfg.prompt_mode, PromptMode::Optimized);
        assert_eq!(cfg.model_dir, PathBuf::from("/data/models"));
        assert_eq!(cfg.native.threads, 6);
        assert!(cfg.native.gpu_enabled);
        assert_eq!(cfg.log.format, LogFormat::Pretty);
        clear_env_vars();
    }

    #[test]
    fn test_invalid_env_falls_back_to_default() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("BENCH_CORE_INTER_TEST_DELAY_MS", "soon");
        std::env::set_var("BENCH_CORE_PROMPT_MODE", "turbo");
        std::env::set_var("BENCH_CORE_CONTEXT_SIZE", "xyz");
        std::env::set_var("BENCH_CORE_LOG_FORMAT", "xml");
        let cfg = load();
        assert_eq!(cfg.scheduler.inter_test_delay, Duration::from_millis(2000));
        assert_eq!(cfg.prompt_mode, PromptMode::Unified);
        assert_eq!(cfg.native.context_size, 2048);
        assert_eq!(cfg.log.format, LogFormat::Json);
        clear_env_vars();
    }

    #[test]
    fn test_floors_applied() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("BENCH_CORE_SAMPLE_INTERVAL_MS", "1");
        std::env::set_var("BENCH_CORE_STREAM_BUFFER", "0");
        std::env::set_var("BENCH_CORE_CONTEXT_SIZE", "16");
        let cfg = load();
        assert_eq!(cfg.sampler.sample_interval, Duration::from_millis(10));
        assert_eq!(cfg.stream_buffer, 1);
        assert_eq!(cfg.native.context_size, 128);
        clear_env_vars();
    }

    #[test]
    fn test_effective_config_serializes() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let eff = load().effective_config();
        let json = serde_json::to_value(&eff).unwrap();
        assert_eq!(json["prompt_mode"], "unified");
        assert_eq!(json["inter_test_delay_ms"], 2000);
        assert_eq!(json["log_format"], "json");
    }
}
