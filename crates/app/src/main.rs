//! `spendwise` - operator CLI for the transaction categorizer.
//!
//! Results go to stdout as JSON; logs go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use spendwise_core::{validate_threshold, CategorizerConfig, MatchMode};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "spendwise")]
#[command(about = "Suggest spending categories for transaction descriptions")]
#[command(version)]
struct Cli {
    /// Configuration file (missing file means defaults)
    #[arg(short, long, global = true, default_value = "spendwise.toml", env = "SPENDWISE_CONFIG")]
    config: PathBuf,

    /// Taxonomy CSV, overriding `taxonomy_path`
    #[arg(long, global = true, env = "SPENDWISE_TAXONOMY")]
    taxonomy: Option<PathBuf>,

    /// Model artifact, overriding `model_path`
    #[arg(long, global = true, env = "SPENDWISE_MODEL")]
    model: Option<PathBuf>,

    /// Keyword matching mode: substring or whole_word
    #[arg(long, global = true, env = "SPENDWISE_MATCH_MODE")]
    match_mode: Option<MatchMode>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write the default taxonomy template
    Init {
        /// Overwrite an existing taxonomy file
        #[arg(long)]
        force: bool,
    },
    /// Train a model from the taxonomy and write the artifact
    Train,
    /// Categorize one or more descriptions
    Categorize {
        #[arg(required = true)]
        text: Vec<String>,

        /// Minimum model confidence (0.0-1.0)
        #[arg(short, long, env = "SPENDWISE_THRESHOLD")]
        threshold: Option<f32>,
    },
    /// Validate the taxonomy and model and report label drift
    Check,
    /// Categorize descriptions read line by line from stdin
    Serve {
        /// Minimum model confidence (0.0-1.0)
        #[arg(short, long, env = "SPENDWISE_THRESHOLD")]
        threshold: Option<f32>,

        /// Do not reload the taxonomy when its file changes
        #[arg(long)]
        no_watch: bool,
    },
}

impl Cli {
    /// File configuration with command-line overrides applied.
    fn resolve_config(&self) -> Result<CategorizerConfig> {
        let mut config = CategorizerConfig::load_or_default(&self.config)
            .with_context(|| format!("Failed to load config {}", self.config.display()))?;
        if let Some(path) = &self.taxonomy {
            config.taxonomy_path = path.clone();
        }
        if let Some(path) = &self.model {
            config.model_path = path.clone();
        }
        if let Some(mode) = self.match_mode {
            config.match_mode = mode;
        }
        match &self.command {
            Command::Categorize { threshold: Some(t), .. } | Command::Serve { threshold: Some(t), .. } => {
                validate_threshold(*t).context("Invalid --threshold")?;
                config.confidence_threshold = *t;
            }
            _ => {}
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "spendwise=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = cli.resolve_config()?;
    tracing::debug!(?config, "resolved configuration");

    match cli.command {
        Command::Init { force } => commands::init(&config, force)?,
        Command::Train => commands::train(&config)?,
        Command::Categorize { text, .. } => commands::categorize(&config, &text)?,
        Command::Check => return commands::check(&config),
        Command::Serve { no_watch, .. } => commands::run_serve(&config, !no_watch).await?,
    }
    Ok(ExitCode::SUCCESS)
}
