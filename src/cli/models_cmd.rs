// Copyright 2024-2026 bench-core Contributors
// SPDX-License-Identifier: Apache-2.0

//! Models CLI subcommand: list model files the local backends would load.

use std::path::Path;

use crate::backend::{validate_model_file, DirectoryCatalog, ModelCatalog, ModelFormat, ProviderId};

use super::truncate;

/// One row of the models table.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRow {
    pub provider: ProviderId,
    pub id: String,
    pub size_bytes: u64,
    /// `None` when the file validated, otherwise the reason it was rejected.
    pub problem: Option<String>,
}

/// Scan `model_dir` for every provider that loads files.
pub fn scan(model_dir: &Path) -> Vec<ModelRow> {
    let catalog = DirectoryCatalog::new(model_dir);
    let mut rows = Vec::new();
    for provider in ProviderId::ALL {
        let Some(format) = ModelFormat::for_provider(provider) else { continue };
        for file in catalog.models_for(provider) {
            let problem = validate_model_file(&file.path, format).err().map(|e| e.to_string());
            rows.push(ModelRow { provider, id: file.id, size_bytes: file.size_bytes, problem });
        }
    }
    rows
}

/// Run `models`; returns 0 when at least one usable file exists.
pub fn run_list(model_dir: &Path) -> i32 {
    let rows = scan(model_dir);
    print_models(model_dir, &rows);
    if rows.iter().any(|r| r.problem.is_none()) {
        0
    } else {
        1
    }
}

pub fn print_models(model_dir: &Path, rows: &[ModelRow]) {
    if rows.is_empty() {
        println!("No model files found in {}.", model_dir.display());
        return;
    }

    println!("{:<14} {:<30} {:>10}  {}", "PROVIDER", "MODEL", "SIZE (MB)", "STATUS");
    println!("{}", "-".repeat(72));
    for row in rows {
        println!(
            "{:<14} {:<30} {:>10}  {}",
            row.provider.as_str(),
            truncate(&row.id, 29),
            row.size_bytes / (1024 * 1024),
            row.problem.as_deref().unwrap_or("ok"),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_reports_valid_and_broken_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut good = b"GGUF".to_vec();
        good.extend_from_slice(&[0u8; 60]);
        std::fs::write(dir.path().join("tiny.gguf"), good).unwrap();
        std::fs::write(dir.path().join("broken.gguf"), b"nope, not a model").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let rows = scan(dir.path());
        let native: Vec<_> = rows.iter().filter(|r| r.provider == ProviderId::NativeCpp).collect();
        assert_eq!(native.len(), 2);
        assert_eq!(native[0].id, "broken");
        assert!(native[0].problem.is_some());
        assert_eq!(native[1].id, "tiny");
        assert!(native[1].problem.is_none());
        assert_eq!(run_list(dir.path()), 0);
    }

    #[test]
    fn test_empty_dir_exits_nonzero() {
        let dir = tempfile::tempdir().unwrap();
        assert!(scan(dir.path()).is_empty());
        assert_eq!(run_list(dir.path()), 1);
    }
}
