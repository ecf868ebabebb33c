use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

use crate::services::estimator::{BoostingParams, SequenceParams, TrainingParams};

const DEFAULT_DATA_ROOT: &str = "./data";

pub(crate) fn setup_config_path() -> Option<PathBuf> {
    std::env::var("SOC_SETUP_CONFIG_PATH")
        .ok()
        .map(|path| path.trim().to_string())
        .filter(|path| !path.is_empty())
        .map(PathBuf::from)
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SetupConfigOverrides {
    #[serde(default)]
    data_root: Option<String>,
    #[serde(default)]
    sequence_window: Option<usize>,
    #[serde(default)]
    sequence_epochs: Option<usize>,
    #[serde(default)]
    sequence_hidden_units: Option<usize>,
    #[serde(default)]
    fast_estimators: Option<usize>,
    #[serde(default)]
    live_floor_voltage: Option<f64>,
    #[serde(default)]
    live_ceiling_voltage: Option<f64>,
}

fn load_setup_config_overrides() -> Option<SetupConfigOverrides> {
    let path = setup_config_path()?;
    if !path.exists() {
        tracing::warn!(path = %path.display(), "setup config not found; using env defaults");
        return None;
    }
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "failed to read setup config; using env defaults"
            );
            return None;
        }
    };
    match serde_json::from_str(&contents) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "failed to parse setup config; using env defaults"
            );
            None
        }
    }
}

fn apply_setup_overrides(config: &mut CoreConfig, overrides: &SetupConfigOverrides) {
    if let Some(window) = overrides.sequence_window.filter(|v| *v > 0) {
        config.sequence.window = window;
    }
    if let Some(epochs) = overrides.sequence_epochs {
        config.sequence.epochs = epochs;
    }
    if let Some(hidden) = overrides.sequence_hidden_units.filter(|v| *v > 0) {
        config.sequence.hidden_units = hidden;
    }
    if let Some(estimators) = overrides.fast_estimators {
        config.boosting.n_estimators = estimators;
    }
    if let Some(floor) = overrides.live_floor_voltage.filter(|v| v.is_finite()) {
        config.live_floor_voltage = floor;
    }
    if let Some(ceiling) = overrides.live_ceiling_voltage.filter(|v| v.is_finite()) {
        config.live_ceiling_voltage = ceiling;
    }
}

#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub data_root: PathBuf,
    pub uploads_path: PathBuf,
    pub models_path: PathBuf,
    pub sequence: SequenceParams,
    pub boosting: BoostingParams,
    pub live_floor_voltage: f64,
    pub live_ceiling_voltage: f64,
}

impl CoreConfig {
    /// Environment first, then the optional setup file, then defaults.
    pub fn from_env(cli_data_root: Option<PathBuf>) -> Result<Self> {
        let setup_overrides = load_setup_config_overrides();

        let data_root = match cli_data_root {
            Some(path) => path,
            None => match env_optional_string("SOC_DATA_ROOT").or_else(|| {
                setup_overrides
                    .as_ref()
                    .and_then(|ov| ov.data_root.as_deref())
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(str::to_string)
            }) {
                Some(value) => PathBuf::from(value),
                None => PathBuf::from(DEFAULT_DATA_ROOT),
            },
        };
        if data_root.as_os_str().is_empty() {
            anyhow::bail!("SOC_DATA_ROOT resolved to an empty path");
        }
        let uploads_path = env_optional_path("SOC_UPLOADS_PATH")
            .unwrap_or_else(|| data_root.join("uploads"));
        let models_path =
            env_optional_path("SOC_MODELS_PATH").unwrap_or_else(|| data_root.join("models"));

        let sequence_defaults = SequenceParams::default();
        let boosting_defaults = BoostingParams::default();
        let mut config = Self {
            data_root,
            uploads_path,
            models_path,
            sequence: SequenceParams {
                window: env_usize("SOC_SEQUENCE_WINDOW", sequence_defaults.window),
                hidden_units: env_usize("SOC_SEQUENCE_HIDDEN_UNITS", sequence_defaults.hidden_units),
                epochs: env_usize("SOC_SEQUENCE_EPOCHS", sequence_defaults.epochs),
                batch_size: env_usize("SOC_SEQUENCE_BATCH_SIZE", sequence_defaults.batch_size),
                learning_rate: env_f64("SOC_SEQUENCE_LEARNING_RATE", sequence_defaults.learning_rate),
                seed: env_u64("SOC_SEED", sequence_defaults.seed),
            },
            boosting: BoostingParams {
                n_estimators: env_usize("SOC_FAST_ESTIMATORS", boosting_defaults.n_estimators),
                learning_rate: env_f64("SOC_FAST_LEARNING_RATE", boosting_defaults.learning_rate),
                max_depth: env_usize("SOC_FAST_MAX_DEPTH", boosting_defaults.max_depth),
                ..boosting_defaults
            },
            live_floor_voltage: env_f64("SOC_LIVE_FLOOR_VOLTAGE", 9.0),
            live_ceiling_voltage: env_f64("SOC_LIVE_CEILING_VOLTAGE", 12.6),
        };

        if let Some(overrides) = setup_overrides.as_ref() {
            apply_setup_overrides(&mut config, overrides);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn training_params(&self) -> TrainingParams {
        TrainingParams {
            boosting: self.boosting.clone(),
            sequence: self.sequence.clone(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.sequence.window == 0 {
            anyhow::bail!("SOC_SEQUENCE_WINDOW must be at least 1");
        }
        if self.live_ceiling_voltage <= self.live_floor_voltage {
            anyhow::bail!(
                "SOC_LIVE_CEILING_VOLTAGE ({}) must be above SOC_LIVE_FLOOR_VOLTAGE ({})",
                self.live_ceiling_voltage,
                self.live_floor_voltage
            );
        }
        Ok(())
    }

    /// Resolved settings as printed by `--print-config`.
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "data_root": self.data_root.display().to_string(),
            "uploads_path": self.uploads_path.display().to_string(),
            "models_path": self.models_path.display().to_string(),
            "sequence": self.sequence,
            "boosting": self.boosting,
            "live_voltage_range": [self.live_floor_voltage, self.live_ceiling_voltage],
        })
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.uploads_path, &self.models_path] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        Ok(())
    }
}

fn env_optional_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_optional_path(key: &str) -> Option<PathBuf> {
    env_optional_string(key).map(PathBuf::from)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_overrides_replace_defaults() {
        let mut config = CoreConfig {
            data_root: PathBuf::from("/tmp/soc"),
            uploads_path: PathBuf::from("/tmp/soc/uploads"),
            models_path: PathBuf::from("/tmp/soc/models"),
            sequence: SequenceParams::default(),
            boosting: BoostingParams::default(),
            live_floor_voltage: 9.0,
            live_ceiling_voltage: 12.6,
        };
        let overrides: SetupConfigOverrides = serde_json::from_str(
            r#"{"sequence_window": 20, "fast_estimators": 50, "live_ceiling_voltage": 14.4, "sequence_hidden_units": 0}"#,
        )
        .unwrap();
        apply_setup_overrides(&mut config, &overrides);

        assert_eq!(config.sequence.window, 20);
        assert_eq!(config.sequence.hidden_units, 50);
        assert_eq!(config.boosting.n_estimators, 50);
        assert_eq!(config.live_ceiling_voltage, 14.4);
        assert!(config.validate().is_ok());

        let params = config.training_params();
        assert_eq!(params.sequence.window, 20);
        assert_eq!(params.boosting.n_estimators, 50);
    }

    #[test]
    fn inverted_live_range_is_rejected() {
        let config = CoreConfig {
            data_root: PathBuf::from("/tmp/soc"),
            uploads_path: PathBuf::from("/tmp/soc/uploads"),
            models_path: PathBuf::from("/tmp/soc/models"),
            sequence: SequenceParams::default(),
            boosting: BoostingParams::default(),
            live_floor_voltage: 12.0,
            live_ceiling_voltage: 9.0,
        };
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("SOC_LIVE_CEILING_VOLTAGE"));
    }

    #[test]
    fn cli_data_root_wins_and_derives_subdirs() {
        let dir = tempfile::tempdir().unwrap();
        let config = CoreConfig::from_env(Some(dir.path().to_path_buf())).unwrap();
        assert_eq!(config.data_root, dir.path());
        if std::env::var("SOC_UPLOADS_PATH").is_err() {
            assert_eq!(config.uploads_path, dir.path().join("uploads"));
        }
        config.ensure_dirs().unwrap();
        assert!(config.models_path.exists());

        let summary = config.summary();
        assert_eq!(summary["data_root"], dir.path().display().to_string());
        assert!(summary["sequence"]["window"].as_u64().is_some());
    }
}
