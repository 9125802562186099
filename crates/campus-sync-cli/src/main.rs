//! campus-sync command-line entry point.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use campus_sync::pipeline;
use campus_sync::{MemoryStore, PostgrestStore, RunConfig, RunContext, RunStats, Store, StoreCredentials};

/// Set to any non-empty value for JSON log lines.
const LOG_JSON_VAR: &str = "CAMPUS_SYNC_LOG_JSON";

#[derive(Parser)]
#[command(
    name = "campus-sync",
    about = "Scrape the university portals and sync schedules, exams and the academic calendar into the store",
    version
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error). RUST_LOG takes precedence.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Run against an in-memory store; no credentials needed, nothing persisted.
    #[arg(long)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync classrooms, courses, academics and weekly course sessions.
    Schedule,

    /// Sync exam listings, one department at a time.
    Exams,

    /// Refresh the academic calendar.
    Calendar,

    /// Write every table to pretty-printed JSON files.
    Export {
        /// Target directory (defaults to CAMPUS_SYNC_EXPORT_DIR or ./data).
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Run schedule, exams and calendar in sequence.
    All,
}

fn init_tracing(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    let json = std::env::var(LOG_JSON_VAR).is_ok_and(|v| !v.trim().is_empty());
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn print_stats(stats: &RunStats) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(stats)?);
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; variables may come from the environment.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    // Credentials are checked before any network activity.
    let store: Arc<dyn Store> = if cli.dry_run {
        tracing::warn!("dry run: writes go to an in-memory store");
        Arc::new(MemoryStore::new())
    } else {
        let credentials = StoreCredentials::from_env()?;
        Arc::new(PostgrestStore::new(&credentials)?)
    };
    let config = RunConfig::from_env()?;
    let ctx = RunContext::new(store, config);

    match cli.command {
        Commands::Schedule => print_stats(&pipeline::run_schedule(&ctx, None).await?)?,
        Commands::Exams => print_stats(&pipeline::run_exams(&ctx, None).await?)?,
        Commands::Calendar => print_stats(&pipeline::run_calendar(&ctx, None).await?)?,
        Commands::Export { dir } => {
            let report = pipeline::run_export(&ctx, dir.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::All => {
            let runs = [
                pipeline::run_schedule(&ctx, None).await?,
                pipeline::run_exams(&ctx, None).await?,
                pipeline::run_calendar(&ctx, None).await?,
            ];
            println!("{}", serde_json::to_string_pretty(&runs)?);
        }
    }

    Ok(())
}
