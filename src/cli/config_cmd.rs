// Copyright 2024-2026 bench-core Contributors
// SPDX-License-Identifier: Apache-2.0

//! Config CLI subcommands: show, defaults, validate.
//!
//! These commands read configuration directly from environment variables.

use crate::config::{self, EffectiveConfig};

/// Print effective config as key-value pairs to stdout.
pub fn run_show(json: bool) {
    let cfg = config::load().effective_config();
    if json {
        match serde_json::to_string_pretty(&cfg) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("Failed to serialize config: {}", e),
        }
    } else {
        print_config(&cfg);
    }
}

/// Print default config values (no env overrides) to stdout.
pub fn run_defaults() {
    println!("BENCH_CORE_INTER_TEST_DELAY_MS=2000");
    println!("BENCH_CORE_SAMPLE_INTERVAL_MS=100");
    println!("BENCH_CORE_STREAM_BUFFER=64");
    println!("BENCH_CORE_PROMPT_MODE=unified");
    println!("BENCH_CORE_MODEL_DIR=models");
    println!("BENCH_CORE_CONTEXT_SIZE=2048");
    println!("BENCH_CORE_THREADS=0");
    println!("BENCH_CORE_GPU=false");
    println!("BENCH_CORE_LOG_FORMAT=json");
    println!("BENCH_CORE_LOG_LEVEL=info");
}

/// Check configuration for settings that make a run misbehave.
///
/// Returns 0 if valid, 1 if any warnings are found.
pub fn run_validate() -> i32 {
    let cfg = config::load().effective_config();
    let warnings = validate(&cfg);
    for w in &warnings {
        eprintln!("WARNING: {}", w);
    }
    if warnings.is_empty() {
        println!("Configuration is valid.");
        0
    } else {
        1
    }
}

fn validate(cfg: &EffectiveConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    if !cfg.model_dir.is_dir() {
        warnings.push(format!(
            "BENCH_CORE_MODEL_DIR ({}) is not a directory; local backends will be unavailable",
            cfg.model_dir.display()
        ));
    }
    if cfg.sample_interval_ms >= cfg.inter_test_delay_ms && cfg.inter_test_delay_ms > 0 {
        warnings.push(format!(
            "BENCH_CORE_SAMPLE_INTERVAL_MS ({}) is not below BENCH_CORE_INTER_TEST_DELAY_MS ({})",
            cfg.sample_interval_ms, cfg.inter_test_delay_ms
        ));
    }
    warnings
}

fn print_config(cfg: &EffectiveConfig) {
    println!("BENCH_CORE_INTER_TEST_DELAY_MS={}", cfg.inter_test_delay_ms);
    println!("BENCH_CORE_SAMPLE_INTERVAL_MS={}", cfg.sample_interval_ms);
    println!("BENCH_CORE_STREAM_BUFFER={}", cfg.stream_buffer);
    println!("BENCH_CORE_PROMPT_MODE={}", cfg.prompt_mode);
    println!("BENCH_CORE_MODEL_DIR={}", cfg.model_dir.display());
    println!("BENCH_CORE_CONTEXT_SIZE={}", cfg.context_size);
    println!("BENCH_CORE_THREADS={}", cfg.threads);
    println!("BENCH_CORE_GPU={}", cfg.gpu_enabled);
    println!("BENCH_CORE_LOG_FORMAT={}", cfg.log_format);
    println!("BENCH_CORE_LOG_LEVEL={}", cfg.log_level);
}
