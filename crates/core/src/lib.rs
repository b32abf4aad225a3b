pub mod category;
pub mod config;

pub use category::{
    ClassificationResult, ClassificationSource, MatchMode, DEFAULT_CATEGORIES, OTHER_CATEGORY,
};
pub use config::{
    validate_threshold, CategorizerConfig, ConfigError, TrainingConfig,
    DEFAULT_CONFIDENCE_THRESHOLD,
};
