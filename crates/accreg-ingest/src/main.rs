//! accreg-ingest - accreditation registry loader

use accreg_common::logging::{init_logging, LogConfig, LogLevel};
use accreg_ingest::db::{self, DbConfig};
use accreg_ingest::{
    ExecutionContext, IngestConfig, MemoryStore, NoRegionFallback, PgContext, Reconciler,
    RegistryParser, UpdateOrchestrator, UpdateOutcome,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "accreg-ingest")]
#[command(author, version, about = "Accreditation registry loader")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download, parse and load the registry
    Load {
        /// Reconcile into an in-memory store instead of the database
        #[arg(long)]
        dry_run: bool,

        /// Leave the region unset instead of guessing it from the address
        #[arg(long)]
        no_address_fallback: bool,
    },

    /// Parse XML files in a directory without loading them
    Parse {
        /// Directory holding the registry XML files
        dir: PathBuf,

        /// Print parsed records as JSON lines instead of a summary
        #[arg(long)]
        json: bool,

        /// Stop after this many records
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Apply database migrations
    Migrate,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    let log_config = LogConfig::builder()
        .level(level)
        .log_file_prefix("accreg-ingest")
        .build();

    // Environment takes precedence over flags
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    let _guard = match init_logging(&log_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: logging disabled: {e}");
            None
        },
    };

    match execute(cli.command).await {
        Ok(true) => {},
        Ok(false) => process::exit(1),
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {e:#}");
            process::exit(1);
        },
    }
}

/// Returns whether the command succeeded.
async fn execute(command: Command) -> Result<bool> {
    match command {
        Command::Load {
            dry_run,
            no_address_fallback,
        } => load(dry_run, no_address_fallback).await,
        Command::Parse { dir, json, limit } => parse(dir, json, limit).await,
        Command::Migrate => {
            let pool = db::create_pool(&DbConfig::from_env()?).await?;
            db::run_migrations(&pool).await?;
            Ok(true)
        },
    }
}

async fn load(dry_run: bool, no_address_fallback: bool) -> Result<bool> {
    let config = IngestConfig::from_env().context("Invalid loader configuration")?;

    let mut orchestrator = UpdateOrchestrator::new(config)?;
    if no_address_fallback {
        orchestrator = orchestrator.with_reconciler(Reconciler::new(Arc::new(NoRegionFallback)));
    }

    let outcome = if dry_run {
        info!("Dry run: reconciling into memory");
        let store = MemoryStore::new();
        let outcome = run(&orchestrator, &store).await?;
        let [regions, groups, specialties, organizations, programs] =
            store.snapshot().await.row_counts();
        info!(regions, groups, specialties, organizations, programs, "Dry run finished");
        outcome
    } else {
        let pool = db::create_pool(&DbConfig::from_env()?).await?;
        let ctx = PgContext::new(pool);
        run(&orchestrator, &ctx).await?
    };

    println!("{}", serde_json::to_string(&outcome)?);
    Ok(outcome.is_success())
}

async fn run(orchestrator: &UpdateOrchestrator, ctx: &dyn ExecutionContext) -> Result<UpdateOutcome> {
    orchestrator
        .run_update(Some(ctx))
        .await
        .context("Update failed, changes rolled back")
}

async fn parse(dir: PathBuf, json: bool, limit: Option<usize>) -> Result<bool> {
    let parser = match limit {
        Some(limit) => RegistryParser::with_limit(limit),
        None => RegistryParser::new(),
    };

    let output = tokio::task::spawn_blocking(move || parser.parse_directory(&dir)).await?;

    if json {
        for record in &output.records {
            println!("{}", serde_json::to_string(record)?);
        }
    } else {
        println!("{}", serde_json::to_string_pretty(&output.summary)?);
    }
    Ok(true)
}
