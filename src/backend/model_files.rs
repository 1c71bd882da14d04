//! Model file discovery and validation.
//!
//! Model download and asset copying live outside this crate. Backends only
//! ask a `ModelCatalog` which files exist locally for their provider.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ProviderId;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("No downloaded model for provider {0}")]
    NoModel(ProviderId),

    #[error("Model file not found: {0}")]
    NotFound(PathBuf),

    #[error("Model file is empty: {0}")]
    Empty(PathBuf),

    #[error("Invalid model format: {0}")]
    InvalidFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LoadError {
    /// True when the file is absent, as opposed to present but unusable.
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::NoModel(_) | Self::NotFound(_))
    }
}

/// A locally known model file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelFile {
    pub id: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub downloaded: bool,
}

/// On-disk container format a provider can load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFormat {
    Gguf,
    TfLite,
}

impl ModelFormat {
    /// File format for a provider; `None` for providers that do not load files.
    pub fn for_provider(provider: ProviderId) -> Option<Self> {
        match provider {
            ProviderId::NativeCpp => Some(Self::Gguf),
            ProviderId::LiteRuntime => Some(Self::TfLite),
            ProviderId::OnDeviceService => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Gguf => "gguf",
            Self::TfLite => "tflite",
        }
    }

    fn matches_header(&self, header: &[u8]) -> bool {
        match self {
            Self::Gguf => header.len() >= 4 && &header[0..4] == b"GGUF",
            // FlatBuffer file identifier sits after the 4-byte root offset.
            Self::TfLite => header.len() >= 8 && &header[4..8] == b"TFL3",
        }
    }
}

/// Source of locally available model files.
pub trait ModelCatalog: Send + Sync {
    fn models_for(&self, provider: ProviderId) -> Vec<ModelFile>;
}

/// Catalog backed by a single directory of model files.
pub struct DirectoryCatalog {
    root: PathBuf,
}

impl DirectoryCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ModelCatalog for DirectoryCatalog {
    fn models_for(&self, provider: ProviderId) -> Vec<ModelFile> {
        let Some(format) = ModelFormat::for_provider(provider) else {
            return Vec::new();
        };
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!(root = %self.root.display(), error = %e, "model directory unreadable");
                return Vec::new();
            }
        };

        let mut models: Vec<ModelFile> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension().and_then(|e| e.to_str()) == Some(format.extension())
            })
            .map(|path| {
                let size_bytes = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
                let id = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("unknown")
                    .to_string();
                ModelFile { id, path, size_bytes, downloaded: true }
            })
            .collect();
        models.sort_by(|a, b| a.id.cmp(&b.id));
        models
    }
}

/// Check that `path` exists, is non-empty and carries the format's magic
/// bytes. Returns the file size.
pub fn validate_model_file(path: &Path, format: ModelFormat) -> Result<u64, LoadError> {
    let metadata = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(LoadError::NotFound(path.to_path_buf()));
        }
        Err(e) => return Err(LoadError::Io(e)),
    };
    if metadata.len() == 0 {
        return Err(LoadError::Empty(path.to_path_buf()));
    }

    let mut header = [0u8; 8];
    let mut file = File::open(path)?;
    let read = file.read(&mut header)?;
    if !format.matches_header(&header[..read]) {
        return Err(LoadError::InvalidFormat(format!(
            "{} is not a {} file",
            path.display(),
            format.extension()
        )));
    }
    Ok(metadata.len())
}
