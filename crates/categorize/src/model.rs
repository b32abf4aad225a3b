use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::artifact::{
    label_fingerprint, write_atomic, ArtifactHeader, ArtifactMetadata, ARTIFACT_FORMAT,
    ARTIFACT_VERSION,
};
use crate::logistic::LogisticRegression;
use crate::taxonomy::Taxonomy;
use crate::vectorizer::TfIdfVectorizer;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("No model artifact at {0}")]
    Unavailable(PathBuf),
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Model artifact {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },
    #[error("Model artifact {path} has format '{found}', expected '{expected}'", expected = ARTIFACT_FORMAT)]
    IncompatibleFormat { path: PathBuf, found: String },
    #[error(
        "Model artifact {path} has version {found}, expected {expected}; retrain the model",
        expected = ARTIFACT_VERSION
    )]
    IncompatibleVersion { path: PathBuf, found: u32 },
    #[error("Text contains no terms known to the model")]
    NoKnownTerms,
}

impl ModelError {
    /// Absence is the normal "not trained yet" path, not a failure.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, ModelError::Unavailable(_))
    }
}

/// A label suggested by a statistical model together with its probability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub category: String,
    pub confidence: f32,
}

/// Anything that can score a description against a frozen label set.
pub trait Predictor: Send + Sync {
    fn predict(&self, text: &str) -> Result<Prediction, ModelError>;
    fn labels(&self) -> &[String];
}

/// Difference between a model's trained label set and a taxonomy snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LabelDrift {
    /// Labels the model can predict that the taxonomy no longer declares.
    pub only_in_model: Vec<String>,
    /// Categories added to the taxonomy since the model was trained.
    pub only_in_taxonomy: Vec<String>,
}

impl LabelDrift {
    pub fn between(labels: &[String], taxonomy: &Taxonomy) -> Self {
        let trained: HashSet<&str> = labels.iter().map(String::as_str).collect();
        let current: HashSet<&str> = taxonomy.labels().collect();
        Self {
            only_in_model: labels
                .iter()
                .filter(|l| !current.contains(l.as_str()))
                .cloned()
                .collect(),
            only_in_taxonomy: taxonomy
                .labels()
                .filter(|l| !trained.contains(l))
                .map(str::to_string)
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.only_in_model.is_empty() && self.only_in_taxonomy.is_empty()
    }
}

/// A fitted TF-IDF + logistic regression pair and its metadata.
///
/// The serialized form of this struct is the on-disk artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelClassifier {
    metadata: ArtifactMetadata,
    vectorizer: TfIdfVectorizer,
    classifier: LogisticRegression,
}

impl ModelClassifier {
    pub(crate) fn from_parts(
        metadata: ArtifactMetadata,
        vectorizer: TfIdfVectorizer,
        classifier: LogisticRegression,
    ) -> Self {
        Self {
            metadata,
            vectorizer,
            classifier,
        }
    }

    /// Reads the artifact at `path`.
    ///
    /// A missing file is [`ModelError::Unavailable`]; anything else that keeps
    /// the artifact from being used as-is is a hard error.
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let bytes = std::fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ModelError::Unavailable(path.to_path_buf()),
            _ => ModelError::Io {
                path: path.to_path_buf(),
                source: e,
            },
        })?;
        let model = Self::decode(&bytes, path)?;
        tracing::info!(
            path = %path.display(),
            labels = model.metadata.labels.len(),
            vocabulary = model.metadata.vocabulary_size,
            trained_at = %model.metadata.trained_at,
            "model artifact loaded"
        );
        Ok(model)
    }

    /// Like [`load`](Self::load) but treats a missing artifact as `Ok(None)`.
    pub fn load_optional(path: &Path) -> Result<Option<Self>, ModelError> {
        match Self::load(path) {
            Ok(model) => Ok(Some(model)),
            Err(e) if e.is_unavailable() => {
                tracing::info!(path = %path.display(), "no model artifact; using keyword rules only");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Parses and validates artifact bytes. `path` is only used in errors.
    pub fn decode(bytes: &[u8], path: &Path) -> Result<Self, ModelError> {
        let corrupt = |reason: String| ModelError::Corrupt {
            path: path.to_path_buf(),
            reason,
        };

        let header: ArtifactHeader =
            serde_json::from_slice(bytes).map_err(|e| corrupt(e.to_string()))?;
        if header.metadata.format != ARTIFACT_FORMAT {
            return Err(ModelError::IncompatibleFormat {
                path: path.to_path_buf(),
                found: header.metadata.format,
            });
        }
        if header.metadata.version != ARTIFACT_VERSION {
            return Err(ModelError::IncompatibleVersion {
                path: path.to_path_buf(),
                found: header.metadata.version,
            });
        }

        let model: ModelClassifier =
            serde_json::from_slice(bytes).map_err(|e| corrupt(e.to_string()))?;
        model.check_consistency().map_err(corrupt)?;
        Ok(model)
    }

    /// Serialises the artifact and atomically replaces `path`.
    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        let bytes = serde_json::to_vec(self).map_err(|e| ModelError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        write_atomic(path, &bytes).map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn metadata(&self) -> &ArtifactMetadata {
        &self.metadata
    }

    /// Every label with its probability, highest first.
    pub fn rank(&self, text: &str) -> Result<Vec<Prediction>, ModelError> {
        let features = self.vectorizer.transform(text);
        if features.is_empty() {
            return Err(ModelError::NoKnownTerms);
        }
        let mut ranked: Vec<Prediction> = self
            .classifier
            .predict_proba(&features)
            .into_iter()
            .zip(&self.metadata.labels)
            .map(|(p, label)| Prediction {
                category: label.clone(),
                confidence: p as f32,
            })
            .collect();
        // Stable sort keeps declaration order among ties.
        ranked.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(ranked)
    }

    pub fn label_drift(&self, taxonomy: &Taxonomy) -> LabelDrift {
        LabelDrift::between(&self.metadata.labels, taxonomy)
    }

    fn check_consistency(&self) -> Result<(), String> {
        let labels = &self.metadata.labels;
        if labels.is_empty() {
            return Err("label set is empty".to_string());
        }
        if labels.iter().collect::<HashSet<_>>().len() != labels.len() {
            return Err("label set contains duplicates".to_string());
        }
        if self.metadata.label_fingerprint != label_fingerprint(labels) {
            return Err("label fingerprint does not match label set".to_string());
        }
        if !self.vectorizer.is_consistent() {
            return Err("vectorizer state is inconsistent".to_string());
        }
        if !self.classifier.is_consistent() {
            return Err("classifier weights are inconsistent".to_string());
        }
        if self.classifier.n_features() != self.vectorizer.vocabulary_size() {
            return Err(format!(
                "classifier expects {} features but vocabulary has {}",
                self.classifier.n_features(),
                self.vectorizer.vocabulary_size()
            ));
        }
        if self.classifier.n_classes() != labels.len() {
            return Err(format!(
                "classifier has {} classes but {} labels are declared",
                self.classifier.n_classes(),
                labels.len()
            ));
        }
        Ok(())
    }
}

impl Predictor for ModelClassifier {
    fn predict(&self, text: &str) -> Result<Prediction, ModelError> {
        self.rank(text)?
            .into_iter()
            .next()
            .ok_or(ModelError::NoKnownTerms)
    }

    fn labels(&self) -> &[String] {
        &self.metadata.labels
    }
}
