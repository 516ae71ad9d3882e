//! Dashboard configuration
//!
//! Loaded from a TOML file whose path comes from `PULSEBOARD_CONFIG`
//! (default `pulseboard.toml`). A missing file means defaults, an invalid
//! file is reported and replaced by defaults. `PULSEBOARD_BACKEND_URL` and
//! `PULSEBOARD_LISTEN` override the file.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

pub const CONFIG_ENV: &str = "PULSEBOARD_CONFIG";
pub const BACKEND_URL_ENV: &str = "PULSEBOARD_BACKEND_URL";
pub const LISTEN_ENV: &str = "PULSEBOARD_LISTEN";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub live: LiveConfig,
    pub latency: LatencyConfig,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
}

/// Which live transport the scheduler may use
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// WebSocket push with polling fallback
    #[default]
    Auto,
    /// Never open a push channel
    Poll,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LiveConfig {
    pub transport: TransportMode,
    pub refresh_interval_ms: u64,
    pub reconnect_backoff_ms: u64,
    pub poll_interval_ms: u64,
    pub history_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LatencyConfig {
    pub window_hours: u32,
    pub smoothing_window: usize,
    pub smoothing_alpha: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HttpConfig {
    pub listen: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:25774".to_string(),
            request_timeout_secs: 10,
        }
    }
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            transport: TransportMode::Auto,
            refresh_interval_ms: 2000,
            reconnect_backoff_ms: 3000,
            poll_interval_ms: 5000,
            history_capacity: crate::aggregator::DEFAULT_HISTORY_CAPACITY,
        }
    }
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            window_hours: 48,
            smoothing_window: 11,
            smoothing_alpha: 0.3,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { listen: "0.0.0.0:8080".to_string() }
    }
}

impl LiveConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Config {
    /// Parse a TOML document and validate it
    pub fn from_toml(txt: &str) -> Result<Self, ConfigError> {
        if txt.trim().is_empty() {
            return Ok(Self::default());
        }
        let cfg: Config = toml::from_str(txt)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read a config file. A missing file yields the defaults.
    pub async fn from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let txt = tokio::fs::read_to_string(path).await?;
        Self::from_toml(&txt)
    }

    /// Load config from `PULSEBOARD_CONFIG` and apply env overrides.
    ///
    /// Never fails: an unreadable or invalid file falls back to defaults.
    pub async fn load() -> Self {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| "pulseboard.toml".into());
        let mut cfg = match Self::from_path(Path::new(&path)).await {
            Ok(cfg) => {
                info!("Configuration loaded from {}", path);
                cfg
            }
            Err(e) => {
                warn!("Invalid configuration in {}: {} - using defaults", path, e);
                Self::default()
            }
        };
        cfg.apply_env_overrides(|key| std::env::var(key).ok());
        cfg
    }

    /// Apply overrides from a key lookup (the process environment in `load`)
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(BACKEND_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.backend.base_url = url;
        }
        if let Some(listen) = lookup(LISTEN_ENV).filter(|v| !v.trim().is_empty()) {
            self.http.listen = listen;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let live = &self.live;
        if live.refresh_interval_ms == 0 || live.reconnect_backoff_ms == 0 || live.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("live intervals must be non-zero".into()));
        }
        if live.history_capacity == 0 {
            return Err(ConfigError::Invalid("history_capacity must be at least 1".into()));
        }
        if self.latency.smoothing_window == 0 {
            return Err(ConfigError::Invalid("smoothing_window must be at least 1".into()));
        }
        let alpha = self.latency.smoothing_alpha;
        if !(alpha > 0.0 && alpha <= 1.0) {
            return Err(ConfigError::Invalid(format!("smoothing_alpha {alpha} not in (0, 1]")));
        }
        if self.backend.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("backend.base_url is empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.live.refresh_interval(), Duration::from_secs(2));
        assert_eq!(cfg.live.reconnect_backoff(), Duration::from_secs(3));
        assert_eq!(cfg.live.poll_interval(), Duration::from_secs(5));
        assert_eq!(cfg.live.history_capacity, 30);
        assert_eq!(cfg.latency.smoothing_window, 11);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let cfg = Config::from_toml(
            r#"
            [backend]
            base_url = "https://status.example.net"

            [live]
            transport = "poll"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.backend.base_url, "https://status.example.net");
        assert_eq!(cfg.backend.request_timeout_secs, 10);
        assert_eq!(cfg.live.transport, TransportMode::Poll);
        assert_eq!(cfg.live.poll_interval_ms, 5000);
    }

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(Config::from_toml("  \n").unwrap(), Config::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = Config::from_toml("[live]\nhistory_capacity = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = Config::from_toml("[latency]\nsmoothing_alpha = 1.5\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = Config::from_toml("[live\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            (BACKEND_URL_ENV, "http://10.0.0.2:25774"),
            (LISTEN_ENV, ""),
        ]);
        let mut cfg = Config::default();
        cfg.apply_env_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.backend.base_url, "http://10.0.0.2:25774");
        assert_eq!(cfg.http.listen, "0.0.0.0:8080");
    }

    #[tokio::test]
    async fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::from_path(&dir.path().join("absent.toml")).await.unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[tokio::test]
    async fn test_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pulseboard.toml");
        tokio::fs::write(&path, "[http]\nlisten = \"127.0.0.1:9000\"\n").await.unwrap();
        let cfg = Config::from_path(&path).await.unwrap();
        assert_eq!(cfg.http.listen, "127.0.0.1:9000");
    }
}
