use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use folio::config::Config;
use folio::models::ProcessingResult;
use folio::processing::{CheckpointLog, Orchestrator, ResultCache};

#[derive(Parser)]
#[command(name = "folio")]
#[command(about = "Chunked OCR for large PDF documents")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// OCR one document and write its artifacts
    Process {
        file: PathBuf,
        /// Overrides OUTPUT_DIR
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Remove expired cache entries
    SweepCache,
    /// Report what a checkpoint log holds
    Recover { log: PathBuf },
}

#[derive(Serialize)]
struct ProcessingResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<ProcessingResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct RecoveryReport {
    chunks: usize,
    chunk_indices: Vec<usize>,
    pages: usize,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "folio=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    if std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json")) {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    dotenvy::dotenv().ok();
    init_tracing();

    let mut config = Config::from_env();

    match args.command {
        Command::Process { file, output_dir } => {
            if let Some(output_dir) = output_dir {
                config.job.output_dir = output_dir;
            }
            let content = tokio::fs::read(&file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "document.pdf".to_string());

            let orchestrator = Orchestrator::from_config(config)?;
            let response = match orchestrator.process(content, &name).await {
                Ok(result) => ProcessingResponse {
                    success: true,
                    data: Some(result),
                    error: None,
                },
                Err(e) => ProcessingResponse {
                    success: false,
                    data: None,
                    error: Some(e.to_string()),
                },
            };

            println!("{}", serde_json::to_string_pretty(&response)?);
            if !response.success {
                std::process::exit(1);
            }
        }
        Command::SweepCache => {
            let cache = ResultCache::from_config(&config.cache);
            let removed = cache.sweep().await;
            println!("{}", serde_json::json!({ "removed": removed }));
        }
        Command::Recover { log } => {
            let results = CheckpointLog::recover(&log)
                .await
                .with_context(|| format!("failed to read {}", log.display()))?;
            let report = RecoveryReport {
                chunks: results.len(),
                chunk_indices: results.iter().map(|r| r.chunk_index).collect(),
                pages: results.iter().map(|r| r.pages.len()).sum(),
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
