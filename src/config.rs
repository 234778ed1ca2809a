use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use crate::classifier::ModelKind;
use crate::scorer::validate_threshold;

pub const MODEL_DIR_ENV: &str = "CHURN_MODEL_DIR";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub model_dir: PathBuf,
    pub default_model: ModelKind,
    pub thresholds: Thresholds,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub random_forest: f64,
    pub xgboost: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            default_model: ModelKind::Xgboost,
            thresholds: Thresholds::default(),
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            random_forest: ModelKind::RandomForest.default_threshold(),
            xgboost: ModelKind::Xgboost.default_threshold(),
        }
    }
}

impl Thresholds {
    pub fn for_model(&self, kind: ModelKind) -> f64 {
        match kind {
            ModelKind::RandomForest => self.random_forest,
            ModelKind::Xgboost => self.xgboost,
        }
    }
}

impl Config {
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(text).context("invalid configuration")?;
        validate_threshold(config.thresholds.random_forest)
            .context("thresholds.random_forest")?;
        validate_threshold(config.thresholds.xgboost).context("thresholds.xgboost")?;
        Ok(config)
    }

    /// Reads the optional config file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config {}", path.display()))?;
                Self::parse(&text)?
            }
            None => Self::default(),
        };

        if let Ok(dir) = std::env::var(MODEL_DIR_ENV) {
            config.model_dir = PathBuf::from(dir);
        }

        Ok(config)
    }
}
