use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use spendwise_categorize::{
    spawn_reload_watcher, taxonomy, train_from_file, HybridCategorizer, LabelDrift, ModelClassifier,
    ModelStatus, ReloadWatcher, RuleMatcher, TaxonomySource,
};
use spendwise_core::{CategorizerConfig, ClassificationResult};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Line that makes `serve` re-read the taxonomy and the model.
pub const RELOAD_COMMAND: &str = ":reload";

#[derive(Debug, Serialize)]
pub struct Suggestion<'a> {
    pub text: &'a str,
    #[serde(flatten)]
    pub result: ClassificationResult,
}

pub fn init(config: &CategorizerConfig, force: bool) -> Result<()> {
    let path = &config.taxonomy_path;
    let written = taxonomy::write_template(path, force)
        .with_context(|| format!("Failed to write taxonomy template {}", path.display()))?;
    if written {
        println!("wrote {}", path.display());
    } else {
        println!("{} already exists; use --force to overwrite", path.display());
    }
    Ok(())
}

pub fn train(config: &CategorizerConfig) -> Result<()> {
    let metadata = train_from_file(&config.taxonomy_path, &config.model_path, &config.training)
        .context("Training failed")?;
    println!("{}", serde_json::to_string_pretty(&metadata)?);
    Ok(())
}

/// Opens the taxonomy and installs the model artifact, if one exists.
///
/// An unreadable taxonomy or a corrupt artifact is an error; a missing
/// artifact leaves the categorizer on keyword rules.
pub fn build_categorizer(config: &CategorizerConfig) -> Result<HybridCategorizer> {
    let source = TaxonomySource::open(&config.taxonomy_path).with_context(|| {
        format!("Failed to load taxonomy {}", config.taxonomy_path.display())
    })?;
    let categorizer = HybridCategorizer::new(Arc::new(source), RuleMatcher::new(config.match_mode))
        .with_threshold(config.confidence_threshold);
    categorizer
        .load_model(&config.model_path)
        .with_context(|| format!("Failed to load model {}", config.model_path.display()))?;
    Ok(categorizer)
}

pub fn categorize(config: &CategorizerConfig, texts: &[String]) -> Result<()> {
    let categorizer = build_categorizer(config)?;
    for text in texts {
        let suggestion = Suggestion {
            text,
            result: categorizer.suggest(text),
        };
        println!("{}", serde_json::to_string(&suggestion)?);
    }
    Ok(())
}

#[derive(Debug, Default, Serialize)]
pub struct CheckReport {
    pub categories: usize,
    pub keywords: usize,
    pub model: Option<ModelSummary>,
    pub errors: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ModelSummary {
    pub labels: usize,
    pub trained_at: String,
    pub drift: LabelDrift,
}

impl CheckReport {
    pub fn is_healthy(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validates the taxonomy and model without serving anything.
pub fn inspect(config: &CategorizerConfig) -> CheckReport {
    let mut report = CheckReport::default();

    let snapshot = match taxonomy::load(&config.taxonomy_path) {
        Ok(t) => {
            report.categories = t.len();
            report.keywords = t.keyword_count();
            Some(t)
        }
        Err(e) => {
            report.errors.push(format!("taxonomy: {e}"));
            None
        }
    };

    match ModelClassifier::load_optional(&config.model_path) {
        Ok(Some(model)) => {
            let drift = snapshot
                .as_ref()
                .map(|t| model.label_drift(t))
                .unwrap_or_default();
            if !drift.is_empty() {
                tracing::warn!(
                    only_in_model = ?drift.only_in_model,
                    only_in_taxonomy = ?drift.only_in_taxonomy,
                    "model label set differs from taxonomy; retrain the model"
                );
            }
            report.model = Some(ModelSummary {
                labels: model.metadata().labels.len(),
                trained_at: model.metadata().trained_at.to_rfc3339(),
                drift,
            });
        }
        Ok(None) => {}
        Err(e) => report.errors.push(format!("model: {e}")),
    }
    report
}

pub fn check(config: &CategorizerConfig) -> Result<ExitCode> {
    let report = inspect(config);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(if report.is_healthy() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

pub async fn run_serve(config: &CategorizerConfig, watch: bool) -> Result<()> {
    let categorizer = build_categorizer(config)?;
    // Dropping the watcher stops it, so it lives as long as the loop.
    let _watcher = if watch && config.watch_taxonomy {
        Some(
            spawn_reload_watcher(Arc::clone(categorizer.taxonomy()), config.reload_debounce())
                .context("Failed to start taxonomy watcher")?,
        )
    } else {
        None
    };

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let served = serve(&categorizer, config, stdin, tokio::io::stdout()).await?;
    tracing::info!(served, "input closed");
    Ok(())
}

/// Categorizes each non-empty input line and writes one JSON object per line.
///
/// A [`RELOAD_COMMAND`] line re-reads the taxonomy and the model artifact and
/// answers with a status object. Returns the number of descriptions served.
pub async fn serve<R, W>(
    categorizer: &HybridCategorizer,
    config: &CategorizerConfig,
    input: R,
    mut output: W,
) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut served = 0;
    while let Some(line) = lines.next_line().await.context("Failed to read input")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let reply = if line == RELOAD_COMMAND {
            reload(categorizer, config)
        } else {
            served += 1;
            serde_json::to_value(Suggestion {
                text: line,
                result: categorizer.suggest(line),
            })?
        };
        let mut encoded = serde_json::to_vec(&reply)?;
        encoded.push(b'\n');
        output.write_all(&encoded).await?;
        output.flush().await?;
    }
    Ok(served)
}

fn reload(categorizer: &HybridCategorizer, config: &CategorizerConfig) -> serde_json::Value {
    let mut errors = Vec::new();
    if let Err(e) = categorizer.reload_taxonomy() {
        errors.push(format!("taxonomy: {e}"));
    }
    let model = match categorizer.load_model(&config.model_path) {
        Ok(ModelStatus::Loaded { .. }) => "loaded",
        Ok(ModelStatus::Absent) => "absent",
        Err(e) => {
            tracing::warn!(error = %e, "model reload failed; keeping previous model");
            errors.push(format!("model: {e}"));
            if categorizer.model_available() {
                "previous"
            } else {
                "absent"
            }
        }
    };
    serde_json::json!({
        "reloaded": errors.is_empty(),
        "categories": categorizer.taxonomy().snapshot().len(),
        "model": model,
        "errors": errors,
    })
}
