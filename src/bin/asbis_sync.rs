//! One-shot operator CLI: run a stage or a full sync, then exit.
//! Exit status is non-zero whenever the result reports `success=false`,
//! so an external scheduler can alert on it.
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use asbis_sync::database_ops::asbis::{AsbisClient, AsbisConfig};
use asbis_sync::database_ops::catalog::PgCatalogStore;
use asbis_sync::database_ops::db::Db;
use asbis_sync::sync::ledger::PgSyncLedger;
use asbis_sync::sync::{FullSyncCoordinator, SyncOrchestrator, SyncStage, VendorCatalog};
use asbis_sync::util::env as env_util;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::error;

#[derive(Parser, Debug)]
#[command(name = "asbis_sync", version, about = "Asbis vendor catalog sync")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Emit the result as compact JSON instead of pretty JSON
    #[arg(long, global = true)]
    compact: bool,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Sync vendor categories
    Categories,
    /// Sync vendor manufacturers
    Manufacturers,
    /// Sync parameters and their options
    Parameters,
    /// Sync products (run the other stages first)
    Products,
    /// Clear the cache and run every stage in order
    Full,
    /// Check that the vendor API answers, without touching the database
    TestConnection,
}

impl Command {
    fn stage(self) -> Option<SyncStage> {
        match self {
            Command::Categories => Some(SyncStage::Categories),
            Command::Manufacturers => Some(SyncStage::Manufacturers),
            Command::Parameters => Some(SyncStage::Parameters),
            Command::Products => Some(SyncStage::Products),
            _ => None,
        }
    }
}

fn print<T: Serialize>(value: &T, compact: bool) -> Result<()> {
    let out = if compact {
        serde_json::to_string(value)
    } else {
        serde_json::to_string_pretty(value)
    }
    .context("serialize result")?;
    println!("{out}");
    Ok(())
}

async fn connect() -> Result<Db> {
    let url = env_util::db_url()?;
    let max_conns = env_util::env_parse("DB_MAX_CONNS", 10u32);
    Db::connect(&url, max_conns).await.context("connect to database")
}

async fn run(cli: Cli) -> Result<bool> {
    let vendor: Arc<dyn VendorCatalog> = Arc::new(AsbisClient::new(AsbisConfig::from_env())?);

    match cli.command {
        Command::TestConnection => {
            let reachable = vendor.test_connection().await;
            print(&serde_json::json!({ "success": reachable, "api": vendor.info() }), cli.compact)?;
            return Ok(reachable);
        }
        _ => {}
    }

    env_util::preflight_check(
        "asbis_sync",
        &["DATABASE_URL"],
        &["DATABASE_URL", "ASBIS_API_URL", "ASBIS_USER", "ASBIS_PASSWORD"],
    )?;
    let db = connect().await?;
    let orchestrator = Arc::new(SyncOrchestrator::new(
        vendor,
        Arc::new(PgCatalogStore::new(db.clone())),
        Arc::new(PgSyncLedger::new(db)),
    ));

    if let Some(stage) = cli.command.stage() {
        let result = orchestrator.run_stage(stage).await.into_result(stage);
        print(&result, cli.compact)?;
        return Ok(result.success);
    }

    let report = FullSyncCoordinator::new(orchestrator).run_full_sync().await;
    print(&report, cli.compact)?;
    Ok(report.success)
}

#[tokio::main]
async fn main() -> ExitCode {
    env_util::init_env();
    if let Err(e) = asbis_sync::tracing::init_tracing(asbis_sync::tracing::DEFAULT_FILTER) {
        eprintln!("{e}");
    }

    match run(Cli::parse()).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            error!(error = %format!("{e:#}"), "asbis_sync aborted");
            ExitCode::from(2)
        }
    }
}
