// =============================================================================
// Runtime Configuration — JSON settings with atomic save
// =============================================================================
//
// Everything tunable lives here: the data provider, how much history to
// fetch, where the dashboard API listens, and the full pipeline parameter
// set (lookback, indicator periods, model hyper-parameters).
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash. All fields carry `#[serde(default)]` so that adding new fields
// never breaks loading an older config file.
//
// Precedence: defaults < JSON file < FORECAST_* environment < CLI flags.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::pipeline::PipelineConfig;
use crate::types::ProviderKind;

/// File read at startup when no `--config` is given.
pub const DEFAULT_CONFIG_PATH: &str = "forecast_config.json";

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_history_days() -> u32 {
    // About two years: enough for SMA100 warm-up plus a useful training set.
    730
}

fn default_bind_addr() -> String {
    "0.0.0.0:3001".to_string()
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level configuration for the forecaster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Market data source used when a request does not name one.
    #[serde(default)]
    pub provider: ProviderKind,

    /// Calendar days of daily candles fetched per run.
    #[serde(default = "default_history_days")]
    pub history_days: u32,

    /// Listen address of the dashboard API.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Pipeline constants and model hyper-parameters.
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            history_days: default_history_days(),
            bind_addr: default_bind_addr(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config from {}", path.display()))?;

        info!(
            path = %path.display(),
            provider = %config.provider,
            history_days = config.history_days,
            epochs = config.pipeline.model.epochs,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content =
            serde_json::to_string_pretty(self).context("failed to serialise config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }

    /// Apply `FORECAST_*` overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup. Unparseable values are ignored
    /// with a warning.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("FORECAST_PROVIDER") {
            match raw.parse::<ProviderKind>() {
                Ok(kind) => self.provider = kind,
                Err(e) => warn!(value = %raw, error = %e, "ignoring FORECAST_PROVIDER"),
            }
        }
        if let Some(raw) = lookup("FORECAST_HISTORY_DAYS") {
            match raw.trim().parse::<u32>() {
                Ok(days) if days > 0 => self.history_days = days,
                _ => warn!(value = %raw, "ignoring FORECAST_HISTORY_DAYS"),
            }
        }
        if let Some(raw) = lookup("FORECAST_BIND_ADDR") {
            let addr = raw.trim();
            if addr.is_empty() {
                warn!("ignoring empty FORECAST_BIND_ADDR");
            } else {
                self.bind_addr = addr.to_string();
            }
        }
        if let Some(raw) = lookup("FORECAST_SEED") {
            match raw.trim().parse::<u64>() {
                Ok(seed) => self.pipeline.model.seed = Some(seed),
                Err(_) => warn!(value = %raw, "ignoring FORECAST_SEED"),
            }
        }
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
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.provider, ProviderKind::Yahoo);
        assert_eq!(cfg.history_days, 730);
        assert_eq!(cfg.bind_addr, "0.0.0.0:3001");
        assert_eq!(cfg.pipeline.lookback, 30);
        assert_eq!(cfg.pipeline.periods.sma, [10, 20, 50, 100]);
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: RuntimeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, RuntimeConfig::default());
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "provider": "binance", "pipeline": { "model": { "epochs": 20 } } }"#;
        let cfg: RuntimeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.provider, ProviderKind::Binance);
        assert_eq!(cfg.pipeline.model.epochs, 20);
        assert_eq!(cfg.pipeline.model.batch_size, 32);
        assert_eq!(cfg.pipeline.lookback, 30);
        assert_eq!(cfg.history_days, 730);
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = [
            ("FORECAST_PROVIDER", "binance"),
            ("FORECAST_HISTORY_DAYS", "365"),
            ("FORECAST_BIND_ADDR", "127.0.0.1:9000"),
            ("FORECAST_SEED", "17"),
        ]
        .into_iter()
        .collect();

        let mut cfg = RuntimeConfig::default();
        cfg.apply_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.provider, ProviderKind::Binance);
        assert_eq!(cfg.history_days, 365);
        assert_eq!(cfg.bind_addr, "127.0.0.1:9000");
        assert_eq!(cfg.pipeline.model.seed, Some(17));
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut cfg = RuntimeConfig::default();
        cfg.apply_overrides(|k| match k {
            "FORECAST_PROVIDER" => Some("nasdaq".into()),
            "FORECAST_HISTORY_DAYS" => Some("0".into()),
            "FORECAST_SEED" => Some("abc".into()),
            _ => None,
        });
        assert_eq!(cfg, RuntimeConfig::default());
    }

    #[test]
    fn save_then_load_roundtrip() {
        let dir = std::env::temp_dir().join(format!("forecast-cfg-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("forecast_config.json");

        let mut cfg = RuntimeConfig::default();
        cfg.history_days = 400;
        cfg.pipeline.model.hidden_units = 16;
        cfg.save(&path).unwrap();

        let loaded = RuntimeConfig::load(&path).unwrap();
        assert_eq!(loaded, cfg);
        assert!(!path.with_extension("json.tmp").exists());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn load_missing_file_errors() {
        assert!(RuntimeConfig::load("/nonexistent/forecast_config.json").is_err());
    }
}
