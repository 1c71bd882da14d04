//! Telemetry module for bench-core.
//!
//! Provides structured logging, attempt tracing spans, and metrics emission.

mod logging;
mod metrics;
mod spans;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use self::metrics::{record_activation, record_attempt_failure, record_attempt_success};
pub use spans::{AttemptSpan, SpanExt};
