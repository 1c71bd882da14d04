//! Backend error types.

use thiserror::Error;

use super::model_files::LoadError;

/// Errors raised by inference backends.
///
/// "Not ready" is never an error: an uninitialized backend answers with a
/// sentinel token instead.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Backend initialization failed: {0}")]
    InitFailure(String),

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Model load failed: {0}")]
    Load(#[from] LoadError),

    #[error("Service error: {0}")]
    Service(String),

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),
}

impl BackendError {
    /// Returns true for faults that indicate a broken native runtime rather
    /// than a bad request.
    pub fn is_fault(&self) -> bool {
        matches!(self, Self::InitFailure(_) | Self::Service(_))
    }
}
