//! Layered configuration loading.
//!
//! This module provides the [`ConfigLoader`] for loading configuration from
//! defaults, files and environment variables.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use ctxware_telemetry::LogFormat;

use crate::{ConfigError, CtxwareConfig};

/// Configuration loader.
///
/// Layers apply in order, later layers overriding earlier ones:
/// 1. Defaults, or the development / production preset
/// 2. A configuration file or string (TOML or JSON)
/// 3. Environment variables named `PREFIX__SECTION__KEY`
///
/// # Example
///
/// ```no_run
/// use ctxware_config::ConfigLoader;
///
/// # fn main() -> Result<(), ctxware_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_defaults()
///     .with_file("ctxware.toml")?
///     .with_env_prefix("CTXWARE")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: CtxwareConfig,
    env_prefix: Option<String>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a loader starting from the defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: CtxwareConfig::default(),
            env_prefix: None,
        }
    }

    /// Reset to the default values.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.config = CtxwareConfig::default();
        self
    }

    /// Start from the development preset.
    ///
    /// ```
    /// use ctxware_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new().with_development().load().unwrap();
    /// assert_eq!(config.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = CtxwareConfig::development();
        self
    }

    /// Start from the production preset.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = CtxwareConfig::production();
        self
    }

    /// Load a `.toml` or `.json` file, chosen by extension.
    ///
    /// The file replaces the configuration loaded so far; sections it omits
    /// take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file does not exist, cannot be read, has
    /// an unsupported extension or contains invalid or unknown fields.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;

        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| ConfigError::UnsupportedFormat(path.display().to_string()))?;
        self.config = parse(&content, format)?;

        Ok(self)
    }

    /// Like [`with_file`](Self::with_file), but a missing file is skipped.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration from a string in the given format (`toml` or
    /// `json`).
    ///
    /// ```
    /// use ctxware_config::ConfigLoader;
    ///
    /// let toml = r#"
    ///     [server]
    ///     http_addr = "127.0.0.1:3000"
    ///
    ///     [limit]
    ///     remote_limit = 10
    /// "#;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string(toml, "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.server.http_addr, "127.0.0.1:3000");
    /// assert_eq!(config.limit.remote_limit, 10);
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = parse(content, format)?;
        Ok(self)
    }

    /// Enable environment overrides with the given prefix.
    ///
    /// With prefix `CTXWARE`:
    /// - `CTXWARE__SERVER__HTTP_ADDR=0.0.0.0:9000`
    /// - `CTXWARE__BOUNDARY__SUPPRESS_INTERNAL_MESSAGES=false`
    /// - `CTXWARE__REQUEST_LOG__HEADERS=user-agent,x-tenant`
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Load variables from a `.env` file in the working directory, if one
    /// exists.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Dotenv`] if the file exists but cannot be
    /// parsed.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(_) => Ok(self),
            Err(e) if e.not_found() => Ok(self),
            Err(e) => Err(e.into()),
        }
    }

    /// Apply environment overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an override does not parse or the result
    /// fails [`CtxwareConfig::validate`].
    ///
    /// ```
    /// use ctxware_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new().load().unwrap();
    /// assert_eq!(config.server.http_addr, "0.0.0.0:8080");
    /// ```
    pub fn load(mut self) -> Result<CtxwareConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            self.apply_env_overrides(&prefix)?;
        }

        self.config.validate()?;

        Ok(self.config)
    }

    /// Return the configuration without environment overrides or validation.
    #[must_use]
    pub fn load_unvalidated(self) -> CtxwareConfig {
        self.config
    }

    fn apply_env_overrides(&mut self, prefix: &str) -> Result<(), ConfigError> {
        for (key, value) in prefixed_vars(env::vars_os(), prefix)? {
            self.apply_env_var(&key, &value, prefix)?;
        }

        Ok(())
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let Some(path) = key.strip_prefix(prefix).and_then(|k| k.strip_prefix("__")) else {
            // Same leading characters but a different prefix, e.g. CTXWARE_X.
            return Ok(());
        };

        let parts: Vec<&str> = path.split("__").collect();
        let config = &mut self.config;

        match parts.as_slice() {
            ["SERVER", "HTTP_ADDR"] => config.server.http_addr = value.to_string(),
            ["SERVER", "SHUTDOWN_TIMEOUT_SECS"] => {
                config.server.shutdown_timeout_secs = parse_number(key, value)?;
            }
            ["SERVER", "REQUEST_TIMEOUT_MS"] => {
                config.server.request_timeout_ms = parse_number(key, value)?;
            }
            ["SERVER", "MAX_BODY_BYTES"] => config.server.max_body_bytes = parse_number(key, value)?,

            ["LOGGING", "ENABLED"] => config.logging.enabled = parse_flag(key, value)?,
            ["LOGGING", "LEVEL"] => config.logging.level = value.to_string(),
            ["LOGGING", "FORMAT"] => {
                config.logging.format = match value.to_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    "pretty" => LogFormat::Pretty,
                    _ => return Err(ConfigError::invalid_env(key, "expected 'json' or 'pretty'")),
                };
            }
            ["LOGGING", "SPAN_EVENTS"] => config.logging.span_events = parse_flag(key, value)?,
            ["LOGGING", "FILE_LINE_INFO"] => config.logging.file_line_info = parse_flag(key, value)?,
            ["LOGGING", "THREAD_IDS"] => config.logging.thread_ids = parse_flag(key, value)?,
            ["LOGGING", "INCLUDE_TARGET"] => config.logging.include_target = parse_flag(key, value)?,
            ["LOGGING", "SERVICE_NAME"] => config.logging.service_name = value.to_string(),

            ["BOUNDARY", "SUPPRESS_INTERNAL_MESSAGES"] => {
                config.boundary.suppress_internal_messages = parse_flag(key, value)?;
            }
            ["BOUNDARY", "CATCH_PANICS"] => config.boundary.catch_panics = parse_flag(key, value)?,
            ["BOUNDARY", "INTERNAL_MESSAGE"] => config.boundary.internal_message = value.to_string(),

            ["REQUEST_LOG", "START"] => config.request_log.start = parse_flag(key, value)?,
            ["REQUEST_LOG", "END"] => config.request_log.end = parse_flag(key, value)?,
            ["REQUEST_LOG", "REFERER"] => config.request_log.referer = parse_flag(key, value)?,
            ["REQUEST_LOG", "REMOTE_ADDR"] => config.request_log.remote_addr = parse_flag(key, value)?,
            ["REQUEST_LOG", "HEADERS"] => {
                config.request_log.headers = value
                    .split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            ["REQUEST_LOG", "IGNORE_UNDER_400"] => {
                config.request_log.ignore_under_400 = parse_flag(key, value)?;
            }
            ["REQUEST_LOG", "IGNORE_4XX"] => config.request_log.ignore_4xx = parse_flag(key, value)?,

            ["LIMIT", "REMOTE_LIMIT"] => config.limit.remote_limit = parse_number(key, value)?,
            ["LIMIT", "TOTAL_LIMIT"] => config.limit.total_limit = parse_number(key, value)?,
            ["LIMIT", "RETRY_AFTER_SECS"] => config.limit.retry_after_secs = parse_number(key, value)?,

            _ => {
                return Err(ConfigError::invalid_env(key, "unknown configuration key"));
            }
        }

        Ok(())
    }
}


/// Collects the variables under `prefix`, sorted by name.
///
/// Variables whose name is not UTF-8 cannot carry the prefix and are
/// skipped; a prefixed variable with a non-UTF-8 value is an error.
fn prefixed_vars<I>(vars: I, prefix: &str) -> Result<Vec<(String, String)>, ConfigError>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    let mut selected = Vec::new();
    for (key, value) in vars {
        let Ok(key) = key.into_string() else {
            continue;
        };
        if !key.starts_with(prefix) {
            continue;
        }
        let value = value
            .into_string()
            .map_err(|_| ConfigError::invalid_env(&key, "value is not valid UTF-8"))?;
        selected.push((key, value));
    }
    selected.sort();
    Ok(selected)
}

fn parse(content: &str, format: &str) -> Result<CtxwareConfig, ConfigError> {
    match format.to_lowercase().as_str() {
        "toml" => Ok(toml::from_str(content)?),
        "json" => Ok(serde_json::from_str(content)?),
        other => Err(ConfigError::UnsupportedFormat(other.to_string())),
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid_env(key, "expected integer"))
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    parse_bool(value).ok_or_else(|| ConfigError::invalid_env(key, "expected boolean"))
}

/// Parse a boolean from a string.
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_loader_new() {
        let config = ConfigLoader::new().load().unwrap();
        assert_eq!(config, CtxwareConfig::default());
    }

    #[test]
    fn test_loader_presets() {
        let config = ConfigLoader::new().with_development().load().unwrap();
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(!config.boundary.suppress_internal_messages);

        let config = ConfigLoader::new()
            .with_development()
            .with_defaults()
            .load()
            .unwrap();
        assert_eq!(config, CtxwareConfig::default());

        let config = ConfigLoader::new().with_production().load().unwrap();
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_loader_with_string_json() {
        let json = r#"{"boundary": {"catch_panics": false}, "request_log": {"headers": ["x-tenant"]}}"#;

        let config = ConfigLoader::new()
            .with_string(json, "json")
            .unwrap()
            .load()
            .unwrap();

        assert!(!config.boundary.catch_panics);
        assert!(config.boundary.suppress_internal_messages);
        assert_eq!(config.request_log.headers, vec!["x-tenant".to_string()]);
    }

    #[test]
    fn test_loader_rejects_unknown_fields() {
        let toml = r#"
            [limit]
            remote_limit = 10
            burst = 5
        "#;
        let result = ConfigLoader::new().with_string(toml, "toml");
        assert!(matches!(result, Err(ConfigError::Parse { format: "toml", .. })));
    }

    #[test]
    fn test_loader_rejects_unknown_format() {
        let result = ConfigLoader::new().with_string("a: 1", "yaml");
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_loader_with_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[server]\nhttp_addr = \"127.0.0.1:4000\"\n\n[logging]\nlevel = \"warn\"").unwrap();

        let config = ConfigLoader::new()
            .with_file(file.path())
            .unwrap()
            .load()
            .unwrap();

        assert_eq!(config.server.http_addr, "127.0.0.1:4000");
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_loader_with_json_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"limit": {{"retry_after_secs": 0}}}}"#).unwrap();

        let config = ConfigLoader::new()
            .with_file(file.path())
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(config.limit.retry_after_secs, 0);
    }

    #[test]
    fn test_loader_with_file_not_found() {
        let result = ConfigLoader::new().with_file("/nonexistent/ctxware.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn test_loader_with_optional_file_not_found() {
        let config = ConfigLoader::new()
            .with_optional_file("/nonexistent/ctxware.toml")
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(config.server.http_addr, "0.0.0.0:8080");
    }

    #[cfg(unix)]
    #[test]
    fn test_prefixed_vars_skips_non_utf8_names() {
        use std::os::unix::ffi::OsStringExt;

        let vars = vec![
            (OsString::from("CTXWARE__SERVER__HTTP_ADDR"), OsString::from("127.0.0.1:1")),
            (OsString::from_vec(vec![0x66, 0xff, 0x6f]), OsString::from("ignored")),
            (OsString::from("PATH"), OsString::from_vec(vec![0xff])),
            (OsString::from("CTXWARE__LIMIT__REMOTE_LIMIT"), OsString::from("3")),
        ];

        let selected = prefixed_vars(vars, "CTXWARE").unwrap();
        assert_eq!(
            selected,
            vec![
                ("CTXWARE__LIMIT__REMOTE_LIMIT".to_string(), "3".to_string()),
                ("CTXWARE__SERVER__HTTP_ADDR".to_string(), "127.0.0.1:1".to_string()),
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_prefixed_vars_rejects_non_utf8_value() {
        use std::os::unix::ffi::OsStringExt;

        let vars = vec![(OsString::from("CTXWARE__LOGGING__LEVEL"), OsString::from_vec(vec![0xff]))];
        let result = prefixed_vars(vars, "CTXWARE");
        assert!(matches!(result, Err(ConfigError::InvalidEnv { var, .. }) if var == "CTXWARE__LOGGING__LEVEL"));
    }

    #[test]
    fn test_load_validates() {
        let result = ConfigLoader::new()
            .with_string("[server]\nmax_body_bytes = 0\n", "toml")
            .unwrap()
            .load();
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_load_unvalidated() {
        let config = ConfigLoader::new()
            .with_string("[server]\nhttp_addr = \"nowhere\"\n", "toml")
            .unwrap()
            .load_unvalidated();
        assert_eq!(config.server.http_addr, "nowhere");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_bool() {
        for truthy in ["true", "TRUE", "1", "yes", "on"] {
            assert_eq!(parse_bool(truthy), Some(true), "{truthy}");
        }
        for falsy in ["false", "False", "0", "no", "off"] {
            assert_eq!(parse_bool(falsy), Some(false), "{falsy}");
        }
        assert_eq!(parse_bool("maybe"), None);
        assert_eq!(parse_bool(""), None);
    }

    // Environment overrides are exercised through apply_env_var directly so
    // tests do not mutate process-wide state.

    #[test]
    fn test_apply_env_var_server() {
        let mut loader = ConfigLoader::new();
        loader.apply_env_var("TEST__SERVER__HTTP_ADDR", "192.168.1.1:9000", "TEST").unwrap();
        loader.apply_env_var("TEST__SERVER__MAX_BODY_BYTES", "1024", "TEST").unwrap();
        assert_eq!(loader.config.server.http_addr, "192.168.1.1:9000");
        assert_eq!(loader.config.server.max_body_bytes, 1024);
    }

    #[test]
    fn test_apply_env_var_sections() {
        let mut loader = ConfigLoader::new();
        loader.apply_env_var("TEST__LOGGING__FORMAT", "Pretty", "TEST").unwrap();
        loader
            .apply_env_var("TEST__BOUNDARY__SUPPRESS_INTERNAL_MESSAGES", "off", "TEST")
            .unwrap();
        loader
            .apply_env_var("TEST__REQUEST_LOG__HEADERS", "user-agent, x-tenant,", "TEST")
            .unwrap();
        loader.apply_env_var("TEST__LIMIT__REMOTE_LIMIT", "7", "TEST").unwrap();

        let config = loader.load_unvalidated();
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(!config.boundary.suppress_internal_messages);
        assert_eq!(config.request_log.headers, vec!["user-agent", "x-tenant"]);
        assert_eq!(config.limit.remote_limit, 7);
    }

    #[test]
    fn test_apply_env_var_errors() {
        let mut loader = ConfigLoader::new();
        assert!(loader.apply_env_var("TEST__LIMIT__TOTAL_LIMIT", "lots", "TEST").is_err());
        assert!(loader.apply_env_var("TEST__BOUNDARY__CATCH_PANICS", "maybe", "TEST").is_err());
        assert!(loader.apply_env_var("TEST__LOGGING__FORMAT", "xml", "TEST").is_err());
        assert!(loader.apply_env_var("TEST__SERVER__HTTP2", "true", "TEST").is_err());
    }

    #[test]
    fn test_apply_env_var_other_prefix_ignored() {
        let mut loader = ConfigLoader::new();
        loader.apply_env_var("TESTING_HOME", "/tmp", "TEST").unwrap();
        assert_eq!(loader.load_unvalidated(), CtxwareConfig::default());
    }
}
