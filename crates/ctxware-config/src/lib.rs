//! Typed configuration for ctxware services.
//!
//! [`CtxwareConfig`] gathers every tunable of a service in one strictly
//! validated tree:
//!
//! - [`ServerConfig`] - bind address, timeouts and body limit
//! - [`LogConfig`] - log subscriber
//! - [`BoundaryConfig`] - error boundary behavior
//! - [`RequestLogConfig`] - request logging stage
//! - [`LimitConfig`] - concurrency limit stage
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! http_addr = "0.0.0.0:8080"
//! shutdown_timeout_secs = 30
//! request_timeout_ms = 30000
//! max_body_bytes = 2097152
//!
//! [logging]
//! level = "info"
//! format = "json"
//!
//! [boundary]
//! suppress_internal_messages = true
//! catch_panics = true
//!
//! [request_log]
//! remote_addr = true
//! headers = ["user-agent"]
//!
//! [limit]
//! remote_limit = 100
//! total_limit = 1000000
//! retry_after_secs = 3600
//! ```
//!
//! # Environment Variable Overrides
//!
//! Any value can be overridden with `PREFIX__SECTION__KEY`, for example
//! `CTXWARE__LIMIT__REMOTE_LIMIT=20`. Booleans accept `true/false`, `1/0`,
//! `yes/no` and `on/off`; list values are comma separated.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::{CtxwareConfig, CtxwareConfigBuilder};
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::ServerConfig;

pub use ctxware_middleware::stages::{LimitConfig, RequestLogConfig};
pub use ctxware_middleware::BoundaryConfig;
pub use ctxware_telemetry::{LogConfig, LogFormat};
