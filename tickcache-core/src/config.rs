//! Service configuration.
//!
//! Loaded from an optional TOML file, then overridden by environment
//! variables. Every field has a default so an empty file is valid.

use crate::data::alpha_vantage::DEFAULT_BASE_URL;
use crate::data::retry::RetryPolicy;
use crate::domain::{normalize_symbols, Interval, OutputSize};
use chrono::Duration as ChronoDuration;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Hard ceiling for the per-cycle worker pool.
pub const MAX_WORKER_CAP: usize = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {name}: '{value}'")]
    InvalidEnv { name: String, value: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Everything the core and the orchestrator need to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Upstream API key. Never logged.
    pub api_key: String,
    pub base_url: String,
    pub symbols: Vec<String>,
    pub interval: Interval,
    pub output_size: OutputSize,
    pub refresh_interval_hours: u64,
    pub retention_hours: u64,
    /// Attempts per upstream call, including the first.
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub max_workers: usize,
    pub request_timeout_secs: u64,
    pub db_dir: PathBuf,
    pub db_name: String,
    pub db_pool_size: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            symbols: vec!["FB".into(), "AMZN".into(), "NFLX".into(), "GOOG".into()],
            interval: Interval::Min60,
            output_size: OutputSize::Full,
            refresh_interval_hours: 1,
            // Ten years: effectively keep everything, but still a hard cutoff.
            retention_hours: 87_600,
            max_retries: 3,
            retry_base_delay_ms: 2_000,
            max_workers: MAX_WORKER_CAP,
            request_timeout_secs: 30,
            db_dir: PathBuf::from("data"),
            db_name: "tickcache.db".into(),
            db_pool_size: 8,
        }
    }
}

impl ServiceConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut cfg: Self = toml::from_str(content)?;
        cfg.symbols = normalize_symbols(&cfg.symbols);
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Defaults overridden by the process environment, then validated.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        cfg.apply_env(|name| std::env::var(name).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Override fields from environment-style variables.
    ///
    /// `lookup` is injected so tests never touch the real environment. Blank
    /// values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(v) = get("ALPHAVANTAGE_API_KEY") {
            self.api_key = v;
        }
        if let Some(v) = get("ALPHAVANTAGE_BASE_URL") {
            self.base_url = v;
        }
        if let Some(v) = get("SYMBOLS") {
            self.symbols = normalize_symbols(v.split(','));
        }
        if let Some(v) = get("INTERVAL") {
            self.interval = parse_env("INTERVAL", &v)?;
        }
        if let Some(v) = get("OUTPUT_SIZE") {
            self.output_size = parse_env("OUTPUT_SIZE", &v)?;
        }
        if let Some(v) = get("FETCH_INTERVAL_HOURS") {
            self.refresh_interval_hours = parse_env("FETCH_INTERVAL_HOURS", &v)?;
        }
        if let Some(v) = get("RETENTION_HOURS") {
            self.retention_hours = parse_env("RETENTION_HOURS", &v)?;
        }
        if let Some(v) = get("MAX_RETRIES") {
            self.max_retries = parse_env("MAX_RETRIES", &v)?;
        }
        if let Some(v) = get("RETRY_DELAY_MS") {
            self.retry_base_delay_ms = parse_env("RETRY_DELAY_MS", &v)?;
        }
        if let Some(v) = get("MAX_WORKERS") {
            self.max_workers = parse_env("MAX_WORKERS", &v)?;
        }
        if let Some(v) = get("DB_DIR") {
            self.db_dir = PathBuf::from(v);
        }
        if let Some(v) = get("DB_NAME") {
            self.db_name = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbols.is_empty() {
            return Err(ConfigError::Invalid("symbol list is empty".into()));
        }
        if self.max_retries == 0 {
            return Err(ConfigError::Invalid("max_retries must be at least 1".into()));
        }
        if self.refresh_interval_hours == 0 {
            return Err(ConfigError::Invalid(
                "refresh_interval_hours must be at least 1".into(),
            ));
        }
        if self.retention_hours == 0 {
            return Err(ConfigError::Invalid("retention_hours must be at least 1".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be at least 1".into(),
            ));
        }
        if self.db_pool_size == 0 {
            return Err(ConfigError::Invalid("db_pool_size must be at least 1".into()));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.retry_base_delay_ms))
    }

    pub fn retention_window(&self) -> ChronoDuration {
        const MAX_HOURS: i64 = i64::MAX / 3_600_000;
        let hours = i64::try_from(self.retention_hours).unwrap_or(MAX_HOURS);
        ChronoDuration::hours(hours.min(MAX_HOURS))
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_hours.saturating_mul(3600))
    }

    /// Worker pool size for a cycle: `min(max_workers, symbols)`, within 1..=10.
    pub fn worker_count(&self) -> usize {
        self.max_workers
            .min(MAX_WORKER_CAP)
            .min(self.symbols.len())
            .max(1)
    }

    pub fn db_path(&self) -> PathBuf {
        self.db_dir.join(&self.db_name)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidEnv {
        name: name.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = ServiceConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.symbols, vec!["FB", "AMZN", "NFLX", "GOOG"]);
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.request_timeout_secs, 30);
        assert_eq!(cfg.db_path(), PathBuf::from("data/tickcache.db"));
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let cfg = ServiceConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, ServiceConfig::default());
    }

    #[test]
    fn toml_overrides_and_normalizes_symbols() {
        let cfg = ServiceConfig::from_toml_str(
            r#"
            symbols = ["aapl", " msft", "AAPL"]
            interval = "5min"
            output_size = "compact"
            retention_hours = 72
            "#,
        )
        .unwrap();
        assert_eq!(cfg.symbols, vec!["AAPL", "MSFT"]);
        assert_eq!(cfg.interval, Interval::Min5);
        assert_eq!(cfg.output_size, OutputSize::Compact);
        assert_eq!(cfg.retention_window(), ChronoDuration::hours(72));
    }

    #[test]
    fn bad_toml_is_a_parse_error() {
        let err = ServiceConfig::from_toml_str("interval = \"2min\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn env_overrides_fields() {
        let mut cfg = ServiceConfig::default();
        cfg.apply_env(env(&[
            ("ALPHAVANTAGE_API_KEY", "secret"),
            ("SYMBOLS", "aaa, bbb,,aaa"),
            ("FETCH_INTERVAL_HOURS", "2"),
            ("RETENTION_HOURS", "72"),
            ("MAX_RETRIES", "5"),
            ("RETRY_DELAY_MS", "10"),
            ("MAX_WORKERS", "4"),
            ("DB_DIR", "/tmp/tc"),
            ("DB_NAME", "x.db"),
        ]))
        .unwrap();

        assert_eq!(cfg.api_key, "secret");
        assert_eq!(cfg.symbols, vec!["AAA", "BBB"]);
        assert_eq!(cfg.refresh_interval(), Duration::from_secs(7200));
        assert_eq!(cfg.retention_hours, 72);
        assert_eq!(cfg.retry_policy(), RetryPolicy::new(5, Duration::from_millis(10)));
        assert_eq!(cfg.worker_count(), 2);
        assert_eq!(cfg.db_path(), PathBuf::from("/tmp/tc/x.db"));
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let mut cfg = ServiceConfig::default();
        cfg.apply_env(env(&[("ALPHAVANTAGE_BASE_URL", "   ")])).unwrap();
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn unparsable_env_value_is_reported() {
        let mut cfg = ServiceConfig::default();
        let err = cfg.apply_env(env(&[("MAX_RETRIES", "many")])).unwrap_err();
        match err {
            ConfigError::InvalidEnv { name, value } => {
                assert_eq!(name, "MAX_RETRIES");
                assert_eq!(value, "many");
            }
            other => panic!("expected InvalidEnv, got {other:?}"),
        }
    }

    #[test]
    fn worker_count_is_capped() {
        let mut cfg = ServiceConfig {
            max_workers: 50,
            ..ServiceConfig::default()
        };
        cfg.symbols = (0..20).map(|i| format!("S{i}")).collect();
        assert_eq!(cfg.worker_count(), MAX_WORKER_CAP);

        cfg.symbols = vec!["ONE".into()];
        assert_eq!(cfg.worker_count(), 1);

        cfg.max_workers = 0;
        assert_eq!(cfg.worker_count(), 1);
    }

    #[test]
    fn validation_rejects_degenerate_values() {
        let empty = ServiceConfig {
            symbols: vec![],
            ..ServiceConfig::default()
        };
        assert!(empty.validate().is_err());

        let no_retries = ServiceConfig {
            max_retries: 0,
            ..ServiceConfig::default()
        };
        assert!(no_retries.validate().is_err());

        let no_retention = ServiceConfig {
            retention_hours: 0,
            ..ServiceConfig::default()
        };
        assert!(no_retention.validate().is_err());

        let no_timeout = ServiceConfig {
            request_timeout_secs: 0,
            ..ServiceConfig::default()
        };
        assert!(no_timeout.validate().is_err());
    }
}
