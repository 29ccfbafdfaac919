// ==============================================================================
// main.rs - GWAS Indexer Entry Point
// ==============================================================================
// Description: Command line for index administration and study ingestion
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================
// Exit status:
//   0  ingestion verified (or admin command succeeded)
//   2  ingestion finished with an integrity shortfall
//   1  run failed
// ==============================================================================

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gwas_indexer::backend::ElasticBackend;
use gwas_indexer::config::{backend_url, LoaderSettings, DEFAULT_HOST, DEFAULT_PORT};
use gwas_indexer::extractor::BcftoolsExtractor;
use gwas_indexer::models::{IndexName, SampleSize, StudyId};
use gwas_indexer::pipeline::{self, IngestRequest, IngestionPipeline};
use gwas_indexer::verify::Verdict;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    backend: BackendArgs,

    /// Also write JSON logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct BackendArgs {
    /// Elasticsearch host
    #[arg(long, env = "ES_HOST", default_value = DEFAULT_HOST)]
    host: String,

    /// Elasticsearch port
    #[arg(long, env = "ES_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Full Elasticsearch URL, overrides host and port
    #[arg(long, env = "ES_URL")]
    url: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an index with the GWAS document mapping
    CreateIndex {
        #[arg(short, long)]
        index: String,

        #[arg(long)]
        shards: Option<u32>,

        #[arg(long)]
        replicas: Option<u32>,
    },

    /// Delete an index and all of its documents
    DeleteIndex {
        #[arg(short, long)]
        index: String,
    },

    /// Load one study's summary statistics
    Ingest(IngestArgs),
}

#[derive(Args, Debug)]
struct IngestArgs {
    /// Study id, e.g. ieu-a:2
    #[arg(short, long)]
    gwas_id: String,

    /// Target index
    #[arg(short, long)]
    index: String,

    /// Source file (.txt.gz, .vcf.gz or .bcf)
    #[arg(short, long)]
    file: PathBuf,

    /// Variant ids to mirror into the top-hits index
    #[arg(short, long)]
    tophits: Option<PathBuf>,

    /// Number of cases, for variant-call input without per-record sample size
    #[arg(long)]
    ncase: Option<u64>,

    /// Number of controls (or total sample size for continuous traits)
    #[arg(long)]
    ncontrol: Option<u64>,

    /// bcftools binary used for variant-call extraction
    #[arg(long, env = "BCFTOOLS", default_value = "bcftools")]
    bcftools: PathBuf,

    /// Directory for temporary extraction output
    #[arg(long)]
    scratch_dir: Option<PathBuf>,

    /// Print the ingestion report as JSON
    #[arg(long)]
    json: bool,
}

/// Append-mode log file behind a background writer thread
fn open_log_writer(path: &Path) -> Result<(NonBlocking, WorkerGuard)> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;
    Ok(tracing_appender::non_blocking(file))
}

/// Returned guard flushes the log file on drop and must live until exit
fn init_tracing(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let (file_layer, guard) = match log_file {
        Some(path) => {
            let (writer, guard) = open_log_writer(path)?;
            let layer = tracing_subscriber::fmt::layer().json().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gwas_indexer=info,audit=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();

    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize tracing
    let _log_guard = init_tracing(cli.log_file.as_deref())?;

    info!("GWAS indexer starting...");

    let mut settings = LoaderSettings::from_env().context("Invalid loader settings")?;
    let url = backend_url(cli.backend.url.as_deref(), &cli.backend.host, cli.backend.port);
    let backend = ElasticBackend::new(&url, settings.timeout).context("Failed to build Elasticsearch client")?;
    info!("Using Elasticsearch at {}", url);

    match cli.command {
        Command::CreateIndex { index, shards, replicas } => {
            let index = IndexName::new(&index)?;
            if let Some(shards) = shards {
                settings.index.shards = shards;
            }
            if let Some(replicas) = replicas {
                settings.index.replicas = replicas;
            }
            settings.validate()?;

            if !pipeline::create_index(&backend, &index, &settings).await? {
                warn!("Index {} already exists, nothing to do", index);
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::DeleteIndex { index } => {
            let index = IndexName::new(&index)?;
            pipeline::delete_index(&backend, &index).await?;
            Ok(ExitCode::SUCCESS)
        }

        Command::Ingest(args) => ingest(&backend, settings, args).await,
    }
}

async fn ingest(backend: &ElasticBackend, settings: LoaderSettings, args: IngestArgs) -> Result<ExitCode> {
    let request = IngestRequest {
        study: StudyId::parse(&args.gwas_id)?,
        index: IndexName::new(&args.index)?,
        source: args.file,
        top_hits: args.tophits,
        sample_size: SampleSize::from_counts(args.ncase, args.ncontrol)?,
    };

    let mut extractor = BcftoolsExtractor::new(args.bcftools);
    if let Some(dir) = args.scratch_dir {
        extractor = extractor.with_scratch_dir(dir);
    }

    let mut runner = IngestionPipeline::new(backend, &extractor, settings);

    match runner.run(&request).await {
        Ok(report) => {
            if args.json {
                println!("{}", report.to_json()?);
            } else {
                println!("{}", report);
            }

            match report.verdict() {
                Verdict::Verified => Ok(ExitCode::SUCCESS),
                Verdict::Shortfall => Ok(ExitCode::from(2)),
            }
        }
        Err(e) => {
            error!(run = %runner.run_id(), "Ingestion failed: {}", e);
            eprintln!("Error: {}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_log_writer_flushes_on_guard_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ingest.log");
        std::fs::write(&path, "earlier run\n").unwrap();

        let (mut writer, guard) = open_log_writer(&path).unwrap();
        writer.write_all(b"{\"message\":\"Ingestion finished\"}\n").unwrap();
        drop(guard);

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("earlier run\n"));
        assert!(contents.contains("Ingestion finished"));
    }

    #[test]
    fn test_log_writer_reports_bad_path() {
        let result = open_log_writer(Path::new("/nonexistent/dir/ingest.log"));
        assert!(result.is_err());
    }
}
