//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (GRAMSEVAK_*)
//! 2. TOML config file (if GRAMSEVAK_CONFIG_FILE set, or passed explicitly)
//! 3. Built-in defaults

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (GRAMSEVAK_*)
/// 2. TOML config file
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Origin serving the application shell and the query backend.
    ///
    /// Set via GRAMSEVAK_ORIGIN environment variable.
    #[serde(default = "default_origin")]
    pub origin: Url,

    /// Address the caching host listens on.
    ///
    /// Set via GRAMSEVAK_LISTEN_ADDR environment variable.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Path to SQLite store database.
    ///
    /// Set via GRAMSEVAK_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Versioned name of the static-asset store.
    ///
    /// Bumping it invalidates every cached asset on the next activation.
    #[serde(default = "default_static_store")]
    pub static_store: String,

    /// Versioned name of the dynamic API-response store.
    #[serde(default = "default_dynamic_store")]
    pub dynamic_store: String,

    /// Assets cached at install time, relative to `origin` or absolute.
    #[serde(default = "default_manifest")]
    pub manifest: Vec<String>,

    /// URL substrings that route a request network-first.
    #[serde(default = "default_api_patterns")]
    pub api_patterns: Vec<String>,

    /// Application shell served to failed navigations.
    #[serde(default = "default_shell_path")]
    pub shell_path: String,

    /// User-Agent string for outbound HTTP requests.
    ///
    /// Set via GRAMSEVAK_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum bytes to read per response.
    ///
    /// Set via GRAMSEVAK_MAX_BYTES environment variable.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Outbound request timeout in milliseconds. Unset means no timeout.
    ///
    /// Set via GRAMSEVAK_TIMEOUT_MS environment variable.
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Maximum number of redirects to follow.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
}

fn default_origin() -> Url {
    Url::parse("http://127.0.0.1:8000/").expect("default origin is a valid URL")
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./gramsevak-cache.sqlite")
}

fn default_static_store() -> String {
    "gramsevak-v1".into()
}

fn default_dynamic_store() -> String {
    "gramsevak-offline-v1".into()
}

fn default_manifest() -> Vec<String> {
    [
        "/",
        "/index.html",
        "/style.css",
        "/app.js",
        "/manifest.json",
        "https://fonts.googleapis.com/css2?family=Noto+Sans+Devanagari:wght@400;600&display=swap",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_api_patterns() -> Vec<String> {
    vec!["/query".into(), "/offline-pack".into()]
}

fn default_shell_path() -> String {
    "/index.html".into()
}

fn default_user_agent() -> String {
    "gramsevak/0.1".into()
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_max_redirects() -> usize {
    5
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            listen_addr: default_listen_addr(),
            db_path: default_db_path(),
            static_store: default_static_store(),
            dynamic_store: default_dynamic_store(),
            manifest: default_manifest(),
            api_patterns: default_api_patterns(),
            shell_path: default_shell_path(),
            user_agent: default_user_agent(),
            max_bytes: default_max_bytes(),
            timeout_ms: None,
            max_redirects: default_max_redirects(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest, if one is configured.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// The two store names that survive activation.
    pub fn current_stores(&self) -> [&str; 2] {
        [&self.static_store, &self.dynamic_store]
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// The TOML file is taken from `GRAMSEVAK_CONFIG_FILE` when set.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let file = std::env::var_os("GRAMSEVAK_CONFIG_FILE").map(PathBuf::from);
        Self::load_with_file(file.as_deref())
    }

    /// Load configuration using an explicit TOML file instead of `GRAMSEVAK_CONFIG_FILE`.
    pub fn load_with_file(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(path) = file {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(
            Env::prefixed("GRAMSEVAK_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
