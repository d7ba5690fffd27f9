use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use language_pipeline::{
    analysis_plan, config::ServiceConfig, Config, JobPlanner, ObjectWriteEvent, OpenSearchIndex, Pipeline,
    S3ObjectStore, Stage, StageResponse,
};
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "language-pipeline")]
#[command(author, version, about = "Document validation, indexation and merge stages")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate an uploaded batch, quarantining it on failure
    Validate {
        #[arg(long)]
        bucket: String,
        #[arg(long)]
        key: String,
        /// Upload size in bytes
        #[arg(long)]
        size: u64,
    },

    /// Hydrate and index a validated batch
    Index {
        #[arg(long)]
        bucket: String,
        #[arg(long)]
        key: String,
    },

    /// Merge an analysis results batch into the search cluster
    Merge {
        #[arg(long)]
        bucket: String,
        #[arg(long)]
        key: String,
    },

    /// Run a stage on an object write notification
    Event {
        #[arg(long, value_enum)]
        stage: Stage,
        /// Read the event from this file instead of stdin
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Print the analysis job requests for an indexed batch
    PlanAnalysis {
        #[arg(long)]
        bucket: String,
        #[arg(long)]
        key: String,
    },

    /// Find the configured foreignisms in a text
    Foreignisms {
        #[arg(long)]
        text: String,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    init_tracing(&config.service);

    info!(
        service = %config.service.name,
        command = ?cli.command,
        "Starting language pipeline"
    );

    let result = match cli.command {
        Command::PlanAnalysis { bucket, key } => {
            let planner = JobPlanner::new(&config).context("Invalid analysis configuration")?;
            analysis_plan(&planner, &bucket, &key)
        }
        Command::Foreignisms { text } => build_pipeline(&config).await?.find_foreignisms(&text).await,
        Command::Validate { bucket, key, size } => {
            build_pipeline(&config).await?.validate(&bucket, &key, size).await
        }
        Command::Index { bucket, key } => build_pipeline(&config).await?.index(&bucket, &key).await,
        Command::Merge { bucket, key } => build_pipeline(&config).await?.merge(&bucket, &key).await,
        Command::Event { stage, file } => {
            let event = read_event(file.as_ref())?;
            build_pipeline(&config)
                .await?
                .handle_event(stage, &event)
                .await
        }
    };

    let response = StageResponse::from(result);
    let rendered = serde_json::to_string(&response)?;

    if response.is_success() {
        println!("{rendered}");
        Ok(ExitCode::SUCCESS)
    } else {
        error!(
            status = response.status_code,
            error_type = response.error_type.unwrap_or_default(),
            "Stage failed"
        );
        eprintln!("{rendered}");
        Ok(ExitCode::FAILURE)
    }
}

async fn build_pipeline(config: &Config) -> Result<Pipeline> {
    let store = Arc::new(
        S3ObjectStore::new(&config.storage)
            .await
            .context("Failed to initialize object store")?,
    );
    let search = Arc::new(
        OpenSearchIndex::new(&config.search, &config.storage.region)
            .await
            .context("Failed to initialize search client")?,
    );

    Pipeline::new(config, store, search).context("Failed to initialize pipeline")
}

fn read_event(file: Option<&PathBuf>) -> Result<ObjectWriteEvent> {
    let json = match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read event file {}", path.display()))?,
        None => {
            let mut json = String::new();
            std::io::stdin()
                .read_to_string(&mut json)
                .context("Failed to read event from stdin")?;
            json
        }
    };

    ObjectWriteEvent::from_json(&json).context("Invalid object write event")
}

/// Initialize tracing/logging
fn init_tracing(service: &ServiceConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&service.log_level));

    // Logs go to stderr so stdout carries only the stage response
    let registry = tracing_subscriber::registry().with(env_filter);
    if service.json_logs {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}
