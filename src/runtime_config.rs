// =============================================================================
// Engine Configuration: JSON settings with atomic save
// =============================================================================
//
// Every tunable of the chart engine lives here: which symbols to watch, the
// bar interval, history depth, retention, reconnect timing and endpoints.
//
// Persistence uses an atomic tmp + rename pattern. All fields carry
// `#[serde(default)]` so an older or partial file still loads.
//
// =============================================================================

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::binance::client::DEFAULT_REST_BASE_URL;
use crate::market_data::connector::DEFAULT_WS_BASE_URL;
use crate::signals::DEFAULT_LEVERAGE;
use crate::types::Interval;

pub const CONFIG_FILE: &str = "scalp_config.json";

pub const ENV_SYMBOLS: &str = "SCALP_SYMBOLS";
pub const ENV_INTERVAL: &str = "SCALP_INTERVAL";

/// The klines endpoint serves at most this many bars per request.
const MAX_HISTORY_LIMIT: u32 = 1000;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_symbols() -> Vec<String> {
    vec!["BTCUSDT".to_string()]
}

fn default_history_limit() -> u32 {
    500
}

fn default_max_bars() -> usize {
    1000
}

fn default_reconnect_delay_ms() -> u64 {
    3000
}

fn default_rest_base_url() -> String {
    DEFAULT_REST_BASE_URL.to_string()
}

fn default_ws_base_url() -> String {
    DEFAULT_WS_BASE_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_leverage() -> f64 {
    DEFAULT_LEVERAGE
}

// =============================================================================
// EngineConfig
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Symbols to chart. Empty means "discover the most traded USDT pairs".
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,

    #[serde(default)]
    pub interval: Interval,

    /// Bars requested for the bootstrap.
    #[serde(default = "default_history_limit")]
    pub history_limit: u32,

    /// Oldest bars are trimmed beyond this length.
    #[serde(default = "default_max_bars")]
    pub max_bars: usize,

    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    #[serde(default = "default_rest_base_url")]
    pub rest_base_url: String,

    #[serde(default = "default_ws_base_url")]
    pub ws_base_url: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Extra SMA overlay; off when absent.
    #[serde(default)]
    pub sma_period: Option<usize>,

    /// Leverage used for projected returns.
    #[serde(default = "default_leverage")]
    pub leverage: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            symbols: default_symbols(),
            interval: Interval::default(),
            history_limit: default_history_limit(),
            max_bars: default_max_bars(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            rest_base_url: default_rest_base_url(),
            ws_base_url: default_ws_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            sma_period: None,
            leverage: default_leverage(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// A missing file is an error so the caller can fall back to defaults
    /// with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read engine config from {}", path.display()))?;

        let mut config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse engine config from {}", path.display()))?;
        config.sanitize();

        info!(
            path = %path.display(),
            symbols = ?config.symbols,
            interval = %config.interval,
            "engine config loaded"
        );

        Ok(config)
    }

    /// Persist to `path` with an atomic write (write `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise engine config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "engine config saved (atomic)");
        Ok(())
    }

    /// Apply `SCALP_SYMBOLS` (comma separated) and `SCALP_INTERVAL`.
    ///
    /// `lookup` abstracts the environment so tests need not mutate it.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(syms) = lookup(ENV_SYMBOLS) {
            self.symbols = syms
                .split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect();
        }

        if let Some(raw) = lookup(ENV_INTERVAL) {
            match raw.trim().parse::<Interval>() {
                Ok(interval) => self.interval = interval,
                Err(e) => warn!(value = %raw, error = %e, "ignoring invalid SCALP_INTERVAL"),
            }
        }
    }

    /// Clamp values the engine cannot work with back into range.
    pub fn sanitize(&mut self) {
        if self.history_limit == 0 || self.history_limit > MAX_HISTORY_LIMIT {
            let clamped = self.history_limit.clamp(1, MAX_HISTORY_LIMIT);
            warn!(from = self.history_limit, to = clamped, "history_limit out of range");
            self.history_limit = clamped;
        }
        if self.max_bars == 0 {
            warn!("max_bars must be positive, using default");
            self.max_bars = default_max_bars();
        }
        if self.sma_period == Some(0) {
            warn!("sma_period 0 disables the SMA overlay");
            self.sma_period = None;
        }
        if !self.leverage.is_finite() || self.leverage <= 0.0 {
            warn!(leverage = self.leverage, "invalid leverage, using default");
            self.leverage = default_leverage();
        }
        self.symbols = self
            .symbols
            .iter()
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.symbols, vec!["BTCUSDT"]);
        assert_eq!(cfg.interval, Interval::H1);
        assert_eq!(cfg.history_limit, 500);
        assert_eq!(cfg.max_bars, 1000);
        assert_eq!(cfg.reconnect_delay(), Duration::from_secs(3));
        assert_eq!(cfg.request_timeout(), Duration::from_secs(10));
        assert_eq!(cfg.sma_period, None);
        assert!((cfg.leverage - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, EngineConfig::default());
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "interval": "5m", "symbols": ["ETHUSDT"], "sma_period": 9 }"#;
        let cfg: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.interval, Interval::M5);
        assert_eq!(cfg.symbols, vec!["ETHUSDT"]);
        assert_eq!(cfg.sma_period, Some(9));
        assert_eq!(cfg.max_bars, 1000);
    }

    #[test]
    fn unknown_interval_is_rejected() {
        let json = r#"{ "interval": "7m" }"#;
        assert!(serde_json::from_str::<EngineConfig>(json).is_err());
    }

    #[test]
    fn env_overrides() {
        let env: HashMap<&str, &str> = [(ENV_SYMBOLS, " ethusdt, ,solusdt "), (ENV_INTERVAL, "15m")]
            .into_iter()
            .collect();
        let mut cfg = EngineConfig::default();
        cfg.apply_env_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.symbols, vec!["ETHUSDT", "SOLUSDT"]);
        assert_eq!(cfg.interval, Interval::M15);
    }

    #[test]
    fn invalid_env_interval_keeps_current() {
        let mut cfg = EngineConfig::default();
        cfg.apply_env_overrides(|k| (k == ENV_INTERVAL).then(|| "2m".to_string()));
        assert_eq!(cfg.interval, Interval::H1);
        assert_eq!(cfg.symbols, vec!["BTCUSDT"]);
    }

    #[test]
    fn sanitize_clamps_bad_values() {
        let mut cfg = EngineConfig {
            history_limit: 5000,
            max_bars: 0,
            sma_period: Some(0),
            leverage: -1.0,
            symbols: vec![" btcusdt ".into(), "".into()],
            ..EngineConfig::default()
        };
        cfg.sanitize();
        assert_eq!(cfg.history_limit, 1000);
        assert_eq!(cfg.max_bars, 1000);
        assert_eq!(cfg.sma_period, None);
        assert!((cfg.leverage - 10.0).abs() < f64::EPSILON);
        assert_eq!(cfg.symbols, vec!["BTCUSDT"]);
    }

    #[test]
    fn save_then_load() {
        let dir = std::env::temp_dir().join(format!("scalp-config-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(CONFIG_FILE);

        let cfg = EngineConfig {
            symbols: vec!["SOLUSDT".into()],
            interval: Interval::M3,
            sma_period: Some(30),
            ..EngineConfig::default()
        };
        cfg.save(&path).unwrap();
        assert!(!path.with_extension("json.tmp").exists());

        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(loaded, cfg);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(EngineConfig::load("/definitely/not/here/scalp_config.json").is_err());
    }
}
