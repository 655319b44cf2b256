//! The root configuration type and its builder.

use ctxware_middleware::stages::{LimitConfig, RequestLogConfig};
use ctxware_middleware::BoundaryConfig;
use ctxware_telemetry::LogConfig;
use serde::{Deserialize, Serialize};

use crate::{ConfigError, ServerConfig};

/// Complete ctxware service configuration.
///
/// Every section falls back to its defaults when absent; unknown keys at any
/// level are rejected. Use [`ConfigLoader`](crate::ConfigLoader) to load it
/// from files and the environment.
///
/// # Example
///
/// ```
/// use ctxware_config::CtxwareConfig;
///
/// let config = CtxwareConfig::default();
/// assert_eq!(config.server.http_addr, "0.0.0.0:8080");
/// assert!(config.boundary.suppress_internal_messages);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct CtxwareConfig {
    /// Transport settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Log subscriber settings.
    #[serde(default)]
    pub logging: LogConfig,

    /// Error boundary settings.
    #[serde(default)]
    pub boundary: BoundaryConfig,

    /// Request logging stage settings.
    #[serde(default)]
    pub request_log: RequestLogConfig,

    /// Concurrency limit stage settings.
    #[serde(default)]
    pub limit: LimitConfig,
}

impl CtxwareConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> CtxwareConfigBuilder {
        CtxwareConfigBuilder::new()
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the first offending field:
    /// - `server.http_addr` is not a socket address
    /// - a timeout, the body limit or a concurrency limit is zero
    /// - `logging.level` is not a valid filter directive
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.socket_addr()?;

        let positive = [
            ("server.shutdown_timeout_secs", self.server.shutdown_timeout_secs == 0),
            ("server.request_timeout_ms", self.server.request_timeout_ms == 0),
            ("server.max_body_bytes", self.server.max_body_bytes == 0),
            ("limit.remote_limit", self.limit.remote_limit == 0),
            ("limit.total_limit", self.limit.total_limit == 0),
        ];
        if let Some((field, _)) = positive.iter().find(|(_, zero)| *zero) {
            return Err(ConfigError::invalid_value(*field, "must be greater than zero"));
        }

        ctxware_telemetry::create_env_filter(&self.logging.level)
            .map_err(|e| ConfigError::invalid_value("logging.level", e.to_string()))?;

        Ok(())
    }

    /// Development preset: pretty debug logs and internal error messages
    /// exposed in responses.
    ///
    /// ```
    /// use ctxware_config::CtxwareConfig;
    ///
    /// let config = CtxwareConfig::development();
    /// assert_eq!(config.logging.level, "debug");
    /// assert!(!config.boundary.suppress_internal_messages);
    /// ```
    #[must_use]
    pub fn development() -> Self {
        Self {
            logging: LogConfig::development(),
            boundary: BoundaryConfig::development(),
            request_log: RequestLogConfig {
                remote_addr: true,
                referer: true,
                ..RequestLogConfig::default()
            },
            ..Self::default()
        }
    }

    /// Production preset: JSON logs, suppressed internal messages and no
    /// completion events for successful requests.
    #[must_use]
    pub fn production() -> Self {
        Self {
            logging: LogConfig::production(),
            boundary: BoundaryConfig::default(),
            request_log: RequestLogConfig {
                ignore_under_400: true,
                ..RequestLogConfig::default()
            },
            ..Self::default()
        }
    }
}

/// Builder for [`CtxwareConfig`].
#[derive(Debug, Default)]
pub struct CtxwareConfigBuilder {
    server: Option<ServerConfig>,
    logging: Option<LogConfig>,
    boundary: Option<BoundaryConfig>,
    request_log: Option<RequestLogConfig>,
    limit: Option<LimitConfig>,
}

impl CtxwareConfigBuilder {
    /// Create a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the server section.
    #[must_use]
    pub fn server(mut self, server: ServerConfig) -> Self {
        self.server = Some(server);
        self
    }

    /// Set the logging section.
    #[must_use]
    pub fn logging(mut self, logging: LogConfig) -> Self {
        self.logging = Some(logging);
        self
    }

    /// Set the boundary section.
    #[must_use]
    pub fn boundary(mut self, boundary: BoundaryConfig) -> Self {
        self.boundary = Some(boundary);
        self
    }

    /// Set the request logging section.
    #[must_use]
    pub fn request_log(mut self, request_log: RequestLogConfig) -> Self {
        self.request_log = Some(request_log);
        self
    }

    /// Set the concurrency limit section.
    #[must_use]
    pub fn limit(mut self, limit: LimitConfig) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Build the configuration; unset sections use their defaults.
    #[must_use]
    pub fn build(self) -> CtxwareConfig {
        CtxwareConfig {
            server: self.server.unwrap_or_default(),
            logging: self.logging.unwrap_or_default(),
            boundary: self.boundary.unwrap_or_default(),
            request_log: self.request_log.unwrap_or_default(),
            limit: self.limit.unwrap_or_default(),
        }
    }
}
