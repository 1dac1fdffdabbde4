mod engine;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use common::config::{read_config, EngineConfig};
use common::ids::{DeviceTableId, JobId};
use tracing::{error, info};
use uuid::Uuid;

use crate::engine::Engine;

/// Scaffolding CLI for exercising the data-acquisition engine. Not the
/// REST façade (excluded from this engine's scope). No authentication.
#[derive(Parser)]
#[command(name = "neuract-agent")]
struct Cli {
    #[arg(long, env = "NEURACT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Starts a job and blocks until Ctrl-C, then stops it gracefully.
    RunJob { job_id: Uuid },
    /// Performs one read pass for every table bound to a job, without writing.
    DryRun { job_id: Uuid },
    /// Creates the physical table for a device table via the storage writer.
    MigrateTable { device_table_id: Uuid },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config: EngineConfig = cli
        .config
        .as_ref()
        .and_then(|path| read_config(path).ok())
        .unwrap_or_default();

    let _guard = common::log::init_tracing(&config.base);

    let engine = Engine::new();

    let result = match cli.command {
        Command::RunJob { job_id } => run_job(&engine, JobId(job_id)).await,
        Command::DryRun { job_id } => dry_run(&engine, JobId(job_id)).await,
        Command::MigrateTable { device_table_id } => engine.migrate_table(DeviceTableId(device_table_id)).await,
    };

    if let Err(err) = result {
        error!(code = err.code(), error = %err, "command failed");
        std::process::exit(1);
    }
}

async fn run_job(engine: &Engine, job_id: JobId) -> common::error::CResult<()> {
    engine.run_job(job_id).await?;
    info!(%job_id, "job running, press ctrl-c to stop");
    tokio::signal::ctrl_c().await.ok();
    engine.stop_job(job_id).await
}

async fn dry_run(engine: &Engine, job_id: JobId) -> common::error::CResult<()> {
    let report = engine.dry_run(job_id).await?;
    for (table_id, result) in report {
        match result {
            Ok(Some(row)) => info!(%table_id, ?row, "dry-run read"),
            Ok(None) => info!(%table_id, "dry-run read returned no value"),
            Err(err) => error!(%table_id, code = err.code(), error = %err, "dry-run read failed"),
        }
    }
    Ok(())
}
