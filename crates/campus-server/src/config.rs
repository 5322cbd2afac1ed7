//! Configuration loading and validation for the campus-entry server.
//!
//! All values are read from environment variables at startup. The process will
//! exit with a clear error message if any required variable is missing or invalid.

use std::fmt;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Validated server configuration.
#[derive(Clone, Deserialize)]
pub struct Config {
    /// Shared secret the field cipher keys are derived from. **Required.**
    ///
    /// There is no built-in fallback: a missing secret stops startup.
    pub cipher_secret: String,

    /// Port the HTTP server listens on.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Upper bound (milliseconds) on any single record-store call.
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,

    /// Path of the JSON snapshot the record store writes through to.
    /// When unset, records live only in memory.
    #[serde(default)]
    pub data_file: Option<String>,

    /// OTLP endpoint for span export. When unset, logs go to stdout only.
    #[serde(default)]
    pub otel_exporter_otlp_endpoint: Option<String>,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_listen_port() -> u16 {
    5000
}
fn default_store_timeout_ms() -> u64 {
    5000
}
fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any required variable is absent or cannot be parsed.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to build configuration from environment")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        ensure_non_empty(&self.cipher_secret, "CIPHER_SECRET")?;
        if self.store_timeout_ms == 0 {
            anyhow::bail!("STORE_TIMEOUT_MS must be > 0");
        }
        if let Some(path) = &self.data_file {
            ensure_non_empty(path, "DATA_FILE")?;
        }
        if let Some(endpoint) = &self.otel_exporter_otlp_endpoint {
            ensure_non_empty(endpoint, "OTEL_EXPORTER_OTLP_ENDPOINT")?;
        }
        Ok(())
    }

    /// Configuration used by unit tests. This is the only place a built-in
    /// secret exists.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            cipher_secret: "campus-entry-test-secret".into(),
            listen_port: 0,
            store_timeout_ms: default_store_timeout_ms(),
            data_file: None,
            otel_exporter_otlp_endpoint: None,
            log_level: default_log_level(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("cipher_secret", &"[REDACTED]")
            .field("listen_port", &self.listen_port)
            .field("store_timeout_ms", &self.store_timeout_ms)
            .field("data_file", &self.data_file)
            .field("otel_exporter_otlp_endpoint", &self.otel_exporter_otlp_endpoint)
            .field("log_level", &self.log_level)
            .finish()
    }
}

fn ensure_non_empty(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("{name} is required and must not be empty");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_correct() {
        assert_eq!(default_listen_port(), 5000);
        assert_eq!(default_store_timeout_ms(), 5000);
        assert_eq!(default_log_level(), "info");
    }

    #[test]
    fn test_config_is_valid() {
        assert!(Config::for_tests().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_secret() {
        let cfg = Config {
            cipher_secret: "  ".into(),
            ..Config::for_tests()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_timeout() {
        let cfg = Config {
            store_timeout_ms: 0,
            ..Config::for_tests()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_blank_data_file() {
        let cfg = Config {
            data_file: Some(String::new()),
            ..Config::for_tests()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn debug_redacts_secret() {
        let rendered = format!("{:?}", Config::for_tests());
        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.contains("campus-entry-test-secret"));
    }
}
