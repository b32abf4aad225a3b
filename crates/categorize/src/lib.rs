//! Transaction categorization: a keyword taxonomy, a keyword rule matcher,
//! an offline TF-IDF + logistic regression trainer, and the hybrid policy
//! combining them.

pub mod artifact;
pub mod hybrid;
mod logistic;
pub mod model;
pub mod rules;
pub mod source;
pub mod taxonomy;
mod text;
pub mod training;
mod vectorizer;

pub use artifact::{ArtifactMetadata, ARTIFACT_FORMAT, ARTIFACT_VERSION};
pub use hybrid::{HybridCategorizer, ModelStatus};
pub use model::{LabelDrift, ModelClassifier, ModelError, Prediction, Predictor};
pub use rules::RuleMatcher;
pub use source::{spawn_reload_watcher, ReloadWatcher, TaxonomySource};
pub use taxonomy::{Category, Taxonomy, TaxonomyError};
pub use training::{train_from_file, TrainingError, TrainingExample, TrainingPipeline};
