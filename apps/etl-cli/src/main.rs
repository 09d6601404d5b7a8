//! Dynamic-ETL CLI
//!
//! Ingests files into the document store, removes them again by fingerprint,
//! and inspects the schema history and file registry.

mod commands;
mod output;
mod telemetry;

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;

use etl_core::AppConfig;
use etl_ingestion::IngestionPipeline;
use output::OutputFormat;

#[derive(Parser)]
#[command(
    name = "etl",
    author = "Dynamic-ETL Team",
    version,
    about = "Dynamic-ETL - ingest unstructured files into a document store",
    long_about = "Parses JSON, CSV, XML, HTML and text files into flat records,\n\
                  loads them into a document store, and tracks how the shape of\n\
                  the data evolves across ingestions.\n\n\
                  Configuration comes from ETL__* environment variables (a .env\n\
                  file is honoured) or from --config."
)]
struct Cli {
    /// Configuration file (environment variables still override it)
    #[arg(short, long, env = "ETL_CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Log level filter; RUST_LOG takes precedence
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Enable verbose error output
    #[arg(short, long)]
    verbose: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest one or more files
    Ingest {
        /// Files to ingest
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Delete every record, registry entry and archived copy of a file
    Delete {
        /// Content fingerprint (64 hex characters)
        fingerprint: String,
    },

    /// Show the current schema
    Schema {
        /// Show every recorded version instead of the latest
        #[arg(long)]
        history: bool,
    },

    /// List ingested files
    Files,

    /// Print content fingerprints without ingesting
    Fingerprint {
        /// Files to fingerprint
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<AppConfig> {
    match path {
        Some(path) => {
            let path = path.to_string_lossy();
            AppConfig::load_from_file(&path)
                .with_context(|| format!("Failed to load configuration from {}", path))
        }
        None => AppConfig::load().context("Failed to load configuration from environment"),
    }
}

async fn connect(cli: &Cli) -> anyhow::Result<IngestionPipeline> {
    let config = load_config(cli.config.as_ref())?;
    commands::build_pipeline(&config).await
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Ingest { paths } => {
            commands::ingest::run(&connect(cli).await?, paths, cli.format).await
        }
        Commands::Delete { fingerprint } => {
            commands::delete::run(&connect(cli).await?, fingerprint, cli.format).await
        }
        Commands::Schema { history } => {
            commands::schema::run(&connect(cli).await?, *history, cli.format).await
        }
        Commands::Files => commands::files::run(&connect(cli).await?, cli.format).await,
        Commands::Fingerprint { paths } => commands::fingerprint::run(paths, cli.format).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    if let Err(e) = telemetry::init_telemetry(&cli.log_level, cli.json_logs) {
        eprintln!("{}: {:#}", "Error".red().bold(), e);
        return ExitCode::FAILURE;
    }

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {}", "Error".red().bold(), e);
            if cli.verbose {
                for cause in e.chain().skip(1) {
                    eprintln!("{}: {}", "Caused by".yellow(), cause);
                }
            }
            ExitCode::FAILURE
        }
    }
}
