//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - either store name is empty, or both are the same
    /// - the manifest or the API pattern list is empty, or contains an empty entry
    /// - `origin` is not http(s) or `shell_path` is not absolute
    /// - `max_bytes` is 0 or exceeds 50MB
    /// - `timeout_ms` is set and outside 100ms..=5 minutes
    /// - `user_agent` is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.static_store.trim().is_empty() {
            return Err(invalid("static_store", "must not be empty"));
        }
        if self.dynamic_store.trim().is_empty() {
            return Err(invalid("dynamic_store", "must not be empty"));
        }
        if self.static_store == self.dynamic_store {
            return Err(invalid("dynamic_store", "must differ from static_store"));
        }

        if self.manifest.is_empty() {
            return Err(invalid("manifest", "must list at least one asset"));
        }
        if self.manifest.iter().any(|m| m.trim().is_empty()) {
            return Err(invalid("manifest", "entries must not be empty"));
        }

        if self.api_patterns.is_empty() || self.api_patterns.iter().any(|p| p.is_empty()) {
            return Err(invalid("api_patterns", "must list at least one non-empty pattern"));
        }

        if !matches!(self.origin.scheme(), "http" | "https") {
            return Err(invalid("origin", "must be an http or https URL"));
        }

        if !self.shell_path.starts_with('/') {
            return Err(invalid("shell_path", "must be an absolute path"));
        }

        if self.max_bytes == 0 {
            return Err(invalid("max_bytes", "must be greater than 0"));
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(invalid("max_bytes", "must not exceed 50MB"));
        }

        if let Some(timeout_ms) = self.timeout_ms {
            if timeout_ms < 100 {
                return Err(invalid("timeout_ms", "must be at least 100ms"));
            }
            if timeout_ms > 300_000 {
                return Err(invalid("timeout_ms", "must not exceed 5 minutes (300000ms)"));
            }
        } else {
            tracing::debug!("no outbound timeout configured; stalled fetches never fall back");
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_of(result: Result<(), ConfigError>) -> String {
        match result {
            Err(ConfigError::Invalid { field, .. }) => field,
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_default_config() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_same_store_names() {
        let config = AppConfig { dynamic_store: "gramsevak-v1".into(), ..Default::default() };
        assert_eq!(field_of(config.validate()), "dynamic_store");
    }

    #[test]
    fn test_validate_empty_store_name() {
        let config = AppConfig { static_store: " ".into(), ..Default::default() };
        assert_eq!(field_of(config.validate()), "static_store");
    }

    #[test]
    fn test_validate_empty_manifest() {
        let config = AppConfig { manifest: Vec::new(), ..Default::default() };
        assert_eq!(field_of(config.validate()), "manifest");
    }

    #[test]
    fn test_validate_empty_pattern() {
        let config = AppConfig { api_patterns: vec!["/query".into(), String::new()], ..Default::default() };
        assert_eq!(field_of(config.validate()), "api_patterns");
    }

    #[test]
    fn test_validate_origin_scheme() {
        let config = AppConfig { origin: url::Url::parse("ftp://example.com").unwrap(), ..Default::default() };
        assert_eq!(field_of(config.validate()), "origin");
    }

    #[test]
    fn test_validate_relative_shell() {
        let config = AppConfig { shell_path: "index.html".into(), ..Default::default() };
        assert_eq!(field_of(config.validate()), "shell_path");
    }

    #[test]
    fn test_validate_max_bytes_zero() {
        let config = AppConfig { max_bytes: 0, ..Default::default() };
        assert_eq!(field_of(config.validate()), "max_bytes");
    }

    #[test]
    fn test_validate_max_bytes_exceeds_limit() {
        let config = AppConfig { max_bytes: 51 * 1024 * 1024, ..Default::default() }; // 51MB
        assert_eq!(field_of(config.validate()), "max_bytes");
    }

    #[test]
    fn test_validate_timeout_bounds() {
        let config = AppConfig { timeout_ms: Some(50), ..Default::default() };
        assert_eq!(field_of(config.validate()), "timeout_ms");

        let config = AppConfig { timeout_ms: Some(301_000), ..Default::default() }; // 5min 1sec
        assert_eq!(field_of(config.validate()), "timeout_ms");

        let config = AppConfig { timeout_ms: Some(100), ..Default::default() };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_empty_user_agent() {
        let config = AppConfig { user_agent: String::new(), ..Default::default() };
        assert_eq!(field_of(config.validate()), "user_agent");
    }
}
