//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (SWCACHE_*)
//! 2. TOML config file (if SWCACHE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (SWCACHE_*)
/// 2. TOML config file (if SWCACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Version token appended to every partition name.
    ///
    /// Bump it whenever precached assets change. Set via SWCACHE_CACHE_VERSION.
    #[serde(default = "default_cache_version")]
    pub cache_version: String,

    /// Path to SQLite cache database.
    ///
    /// Set via SWCACHE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Origin server that intercepted requests are forwarded to.
    ///
    /// Set via SWCACHE_ORIGIN environment variable.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Socket address the proxy listens on.
    ///
    /// Set via SWCACHE_LISTEN_ADDR environment variable.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// User-Agent string for origin requests.
    ///
    /// Set via SWCACHE_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum bytes to fetch per request.
    ///
    /// Set via SWCACHE_MAX_BYTES environment variable.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// HTTP request timeout in milliseconds, applied to every origin fetch.
    ///
    /// Set via SWCACHE_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Bound on the network leg of the network-first API strategy.
    ///
    /// Set via SWCACHE_API_TIMEOUT_MS environment variable.
    #[serde(default = "default_api_timeout_ms")]
    pub api_timeout_ms: u64,

    /// Path prefix that routes a request to the API partition.
    ///
    /// Set via SWCACHE_API_PREFIX environment variable.
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,

    /// Entry cap of the API partition (FIFO eviction above it).
    ///
    /// Set via SWCACHE_MAX_API_ENTRIES environment variable.
    #[serde(default = "default_max_api_entries")]
    pub max_api_entries: usize,

    /// Age after which image entries are evicted.
    ///
    /// Set via SWCACHE_IMAGE_MAX_AGE_DAYS environment variable.
    #[serde(default = "default_image_max_age_days")]
    pub image_max_age_days: u32,

    /// Paths fetched into the static partition at install time.
    ///
    /// Set via SWCACHE_PRECACHE environment variable (`[/, /index.html]`).
    #[serde(default = "default_precache")]
    pub precache: Vec<String>,

    /// Page served when a static request misses and the network is down.
    ///
    /// Set via SWCACHE_OFFLINE_PAGE environment variable.
    #[serde(default = "default_offline_page")]
    pub offline_page: String,

    /// Upper bound on the total size of cached bodies.
    ///
    /// Set via SWCACHE_QUOTA_BYTES environment variable.
    #[serde(default = "default_quota_bytes")]
    pub quota_bytes: u64,

    /// Interval of the background eviction sweep in seconds.
    ///
    /// Set via SWCACHE_SWEEP_INTERVAL_SECS environment variable.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_cache_version() -> String {
    "v1".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./swcache.sqlite")
}

fn default_origin() -> String {
    "http://127.0.0.1:3000".into()
}

fn default_listen_addr() -> String {
    "127.0.0.1:8080".into()
}

fn default_user_agent() -> String {
    "swcache/0.1".into()
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_api_timeout_ms() -> u64 {
    5_000
}

fn default_api_prefix() -> String {
    "/api/".into()
}

fn default_max_api_entries() -> usize {
    100
}

fn default_image_max_age_days() -> u32 {
    30
}

fn default_precache() -> Vec<String> {
    ["/", "/index.html", "/offline.html", "/manifest.json", "/favicon.ico"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_offline_page() -> String {
    "/offline.html".into()
}

fn default_quota_bytes() -> u64 {
    50 * 1024 * 1024
}

fn default_sweep_interval_secs() -> u64 {
    3_600
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cache_version: default_cache_version(),
            db_path: default_db_path(),
            origin: default_origin(),
            listen_addr: default_listen_addr(),
            user_agent: default_user_agent(),
            max_bytes: default_max_bytes(),
            timeout_ms: default_timeout_ms(),
            api_timeout_ms: default_api_timeout_ms(),
            api_prefix: default_api_prefix(),
            max_api_entries: default_max_api_entries(),
            image_max_age_days: default_image_max_age_days(),
            precache: default_precache(),
            offline_page: default_offline_page(),
            quota_bytes: default_quota_bytes(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Network-first bound as Duration.
    pub fn api_timeout(&self) -> Duration {
        Duration::from_millis(self.api_timeout_ms)
    }

    /// Image max age as Duration.
    pub fn image_max_age(&self) -> Duration {
        Duration::from_secs(u64::from(self.image_max_age_days) * 24 * 60 * 60)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `SWCACHE_`
    /// 2. TOML file from `SWCACHE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("SWCACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("SWCACHE_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.cache_version, "v1");
        assert_eq!(config.db_path, PathBuf::from("./swcache.sqlite"));
        assert_eq!(config.user_agent, "swcache/0.1");
        assert_eq!(config.max_bytes, 5_242_880);
        assert_eq!(config.timeout_ms, 20_000);
        assert_eq!(config.api_timeout_ms, 5_000);
        assert_eq!(config.api_prefix, "/api/");
        assert_eq!(config.max_api_entries, 100);
        assert_eq!(config.image_max_age_days, 30);
        assert_eq!(config.offline_page, "/offline.html");
        assert_eq!(config.precache, vec!["/", "/index.html", "/offline.html", "/manifest.json", "/favicon.ico"]);
    }

    #[test]
    fn test_durations() {
        let config = AppConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(20_000));
        assert_eq!(config.api_timeout(), Duration::from_secs(5));
        assert_eq!(config.image_max_age(), Duration::from_secs(30 * 86_400));
        assert_eq!(config.sweep_interval(), Duration::from_secs(3_600));
    }

    #[test]
    fn test_load_from_toml_and_env() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "swcache.toml",
                r#"
                cache_version = "v7"
                max_api_entries = 20
                precache = ["/", "/offline.html"]
                "#,
            )?;
            jail.set_env("SWCACHE_CONFIG_FILE", "swcache.toml");
            jail.set_env("SWCACHE_MAX_API_ENTRIES", "40");

            let config = AppConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.cache_version, "v7");
            assert_eq!(config.max_api_entries, 40);
            assert_eq!(config.precache, vec!["/", "/offline.html"]);
            Ok(())
        });
    }
}
