use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::category::MatchMode;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Hyper-parameters for the offline training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub ngram_min: usize,
    pub ngram_max: usize,
    pub iterations: usize,
    pub learning_rate: f64,
    /// Inverse L2 regularisation strength; larger means weaker regularisation.
    pub c: f64,
    /// Add context-template variations of each keyword to the training set.
    pub augment: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            ngram_min: 1,
            ngram_max: 2,
            iterations: 500,
            learning_rate: 1.0,
            c: 10.0,
            augment: true,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ngram_min == 0 || self.ngram_min > self.ngram_max {
            return Err(ConfigError::Invalid {
                field: "training.ngram_min",
                reason: format!(
                    "n-gram range {}..={} is empty or starts at zero",
                    self.ngram_min, self.ngram_max
                ),
            });
        }
        if self.iterations == 0 {
            return Err(ConfigError::Invalid {
                field: "training.iterations",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ConfigError::Invalid {
                field: "training.learning_rate",
                reason: format!("{} is not a positive number", self.learning_rate),
            });
        }
        if !(self.c.is_finite() && self.c > 0.0) {
            return Err(ConfigError::Invalid {
                field: "training.c",
                reason: format!("{} is not a positive number", self.c),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategorizerConfig {
    pub taxonomy_path: PathBuf,
    pub model_path: PathBuf,
    pub confidence_threshold: f32,
    pub match_mode: MatchMode,
    pub watch_taxonomy: bool,
    /// Quiet period before a changed taxonomy file is reloaded.
    pub reload_debounce_ms: u64,
    pub training: TrainingConfig,
}

impl Default for CategorizerConfig {
    fn default() -> Self {
        Self {
            taxonomy_path: PathBuf::from("data/categories.csv"),
            model_path: PathBuf::from("data/model.json"),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            match_mode: MatchMode::default(),
            watch_taxonomy: true,
            reload_debounce_ms: 500,
            training: TrainingConfig::default(),
        }
    }
}

impl CategorizerConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: CategorizerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads `path`, or returns the defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_threshold(self.confidence_threshold)?;
        if self.reload_debounce_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "reload_debounce_ms",
                reason: "must be at least 1".to_string(),
            });
        }
        self.training.validate()
    }

    pub fn reload_debounce(&self) -> Duration {
        Duration::from_millis(self.reload_debounce_ms)
    }
}

pub fn validate_threshold(threshold: f32) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&threshold) {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field: "confidence_threshold",
            reason: format!("{threshold} is outside 0.0..=1.0"),
        })
    }
}
