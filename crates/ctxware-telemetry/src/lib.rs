//! Logging setup for ctxware services.
//!
//! Every ctxware crate emits events through [`tracing`] with structured
//! fields. This crate installs the global subscriber that turns those events
//! into output: JSON lines in production, a pretty multi-line format while
//! developing.
//!
//! # Example
//!
//! ```rust,ignore
//! use ctxware_telemetry::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::production())?;
//! tracing::info!(request_id = %id, "request accepted");
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
pub mod logging;

pub use error::TelemetryError;
pub use logging::{create_env_filter, fields, init_logging, LogConfig, LogFormat};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
