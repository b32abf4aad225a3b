use chrono::Utc;
use serde::Serialize;
use spendwise_core::{ConfigError, TrainingConfig};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::artifact::{label_fingerprint, ArtifactMetadata, ARTIFACT_FORMAT, ARTIFACT_VERSION};
use crate::logistic::{FitOptions, LogisticRegression};
use crate::model::{ModelClassifier, ModelError};
use crate::taxonomy::{self, Taxonomy, TaxonomyError};
use crate::text::tokenize;
use crate::vectorizer::TfIdfVectorizer;

/// Transaction-style contexts each keyword is placed in when augmenting.
///
/// The words around `{}` say how a payment was made, not what it was for, so
/// they are kept out of the model's features (see [`context_words`]).
const CONTEXT_TEMPLATES: &[&str] = &["{} payment", "paid {}", "upi {}", "pos {}"];

/// Template words that are not also part of some keyword in `taxonomy`.
fn context_words(taxonomy: &Taxonomy) -> BTreeSet<String> {
    let keyword_tokens: HashSet<String> = taxonomy
        .categories()
        .iter()
        .flat_map(|c| c.keywords.iter())
        .flat_map(|kw| tokenize(kw))
        .collect();
    CONTEXT_TEMPLATES
        .iter()
        .flat_map(|t| tokenize(&t.replace("{}", " ")))
        .filter(|w| !keyword_tokens.contains(w))
        .collect()
}

#[derive(Error, Debug)]
pub enum TrainingError {
    #[error("Taxonomy declares no categories to train on")]
    EmptyTaxonomy,
    #[error("Category '{0}' has no keywords to train on")]
    InsufficientData(String),
    #[error("Taxonomy error: {0}")]
    Taxonomy(#[from] TaxonomyError),
    #[error("Invalid training configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("IO error writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write model artifact: {0}")]
    Artifact(#[from] ModelError),
}

/// A synthesized `(text, label)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrainingExample {
    pub text: String,
    pub label: String,
}

/// Expands a taxonomy into examples and fits the TF-IDF + logistic model.
#[derive(Debug, Clone, Default)]
pub struct TrainingPipeline {
    config: TrainingConfig,
}

impl TrainingPipeline {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    /// Turns every keyword of every category into labelled examples.
    ///
    /// Each phrase yields itself; multi-word phrases also yield their words
    /// (unless a word is some category's keyword in its own right); with
    /// augmentation on, each phrase is also placed in [`CONTEXT_TEMPLATES`].
    pub fn expand(&self, taxonomy: &Taxonomy) -> Result<Vec<TrainingExample>, TrainingError> {
        if taxonomy.is_empty() {
            return Err(TrainingError::EmptyTaxonomy);
        }
        if let Some(empty) = taxonomy.categories().iter().find(|c| c.keywords.is_empty()) {
            return Err(TrainingError::InsufficientData(empty.name.clone()));
        }

        let all_keywords: HashSet<&str> = taxonomy
            .categories()
            .iter()
            .flat_map(|c| c.keywords.iter().map(String::as_str))
            .collect();

        let mut examples = Vec::new();
        for category in taxonomy.categories() {
            let mut push = |text: String| {
                examples.push(TrainingExample {
                    text,
                    label: category.name.clone(),
                })
            };
            for kw in &category.keywords {
                push(kw.clone());

                let words = tokenize(kw);
                if words.len() > 1 {
                    words
                        .into_iter()
                        .filter(|w| !all_keywords.contains(w.as_str()))
                        .for_each(&mut push);
                }

                if self.config.augment {
                    for template in CONTEXT_TEMPLATES {
                        push(template.replace("{}", kw));
                    }
                }
            }
        }
        Ok(examples)
    }

    /// Fits a model in memory without persisting it.
    pub fn fit(&self, taxonomy: &Taxonomy) -> Result<ModelClassifier, TrainingError> {
        self.config.validate()?;
        let examples = self.expand(taxonomy)?;

        let labels: Vec<String> = taxonomy.labels().map(str::to_string).collect();
        let texts: Vec<&str> = examples.iter().map(|e| e.text.as_str()).collect();
        let targets: Vec<usize> = examples
            .iter()
            .map(|e| {
                labels
                    .iter()
                    .position(|l| *l == e.label)
                    .unwrap_or_default()
            })
            .collect();

        let mut vectorizer = TfIdfVectorizer::new(self.config.ngram_min, self.config.ngram_max)
            .with_stop_words(context_words(taxonomy));
        let features = vectorizer.fit_transform(&texts);

        let classifier = LogisticRegression::fit(
            &features,
            &targets,
            labels.len(),
            vectorizer.vocabulary_size(),
            FitOptions {
                iterations: self.config.iterations,
                learning_rate: self.config.learning_rate,
                c: self.config.c,
            },
        );

        let metadata = ArtifactMetadata {
            format: ARTIFACT_FORMAT.to_string(),
            version: ARTIFACT_VERSION,
            label_fingerprint: label_fingerprint(&labels),
            labels,
            examples: examples.len(),
            vocabulary_size: vectorizer.vocabulary_size(),
            ngram_range: vectorizer.ngram_range(),
            trained_at: Utc::now(),
        };
        Ok(ModelClassifier::from_parts(metadata, vectorizer, classifier))
    }

    /// Fits a model and atomically writes it to `out_path`.
    ///
    /// Nothing is written unless fitting succeeds, and a previous artifact at
    /// `out_path` is replaced only once the new one is fully on disk.
    pub fn train(&self, taxonomy: &Taxonomy, out_path: &Path) -> Result<ArtifactMetadata, TrainingError> {
        let model = self.fit(taxonomy)?;
        model.save(out_path).map_err(|e| match e {
            ModelError::Io { path, source } => TrainingError::Io { path, source },
            other => TrainingError::Artifact(other),
        })?;

        let metadata = model.metadata().clone();
        tracing::info!(
            path = %out_path.display(),
            labels = metadata.labels.len(),
            examples = metadata.examples,
            vocabulary = metadata.vocabulary_size,
            "model trained"
        );
        Ok(metadata)
    }
}

/// Operator entry point: load the taxonomy file and train an artifact from it.
pub fn train_from_file(
    taxonomy_path: &Path,
    model_out_path: &Path,
    config: &TrainingConfig,
) -> Result<ArtifactMetadata, TrainingError> {
    let taxonomy = taxonomy::load(taxonomy_path)?;
    TrainingPipeline::new(config.clone()).train(&taxonomy, model_out_path)
}
