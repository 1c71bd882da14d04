// Copyright 2024-2026 bench-core Contributors
// SPDX-License-Identifier: Apache-2.0

//! CLI module for bench-core-cli commands.
//!
//! ## Usage
//!
//! ```bash
//! bench-core-cli run --quick          # Quick suite against every provider
//! bench-core-cli run --plan nightly.toml --json
//! bench-core-cli catalog              # List standard test cases
//! bench-core-cli models               # Model files found in BENCH_CORE_MODEL_DIR
//! bench-core-cli config show          # Effective configuration
//! ```

pub mod catalog_cmd;
pub mod config_cmd;
pub mod models_cmd;
pub mod run_cmd;

pub use run_cmd::{run_benchmark, RunArgs};

/// Truncate `s` to at most `max` characters for table output.
pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("Llama.cpp backend", 5), "Llama");
        assert_eq!(truncate("ééééé", 3), "ééé");
    }
}
