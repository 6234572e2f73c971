use anyhow::Result;
use clap::Parser;
use std::sync::Arc;

use ppmp_planner::cli::{self, Cli, CliContext};
use ppmp_planner::{
    init_database, init_telemetry, shutdown_database, side_channel_metrics, MemoryStore, Planner,
    RecordStore,
};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = ppmp_planner::config()?.clone();
    if let Some(data) = &cli.data {
        settings.storage.data_file = data.clone();
    }
    init_telemetry(&settings.observability)?;

    tokio::runtime::Runtime::new()?.block_on(async move {
        let memory = Arc::new(MemoryStore::open(&settings.storage.data_file).await?);
        let store = select_store(&settings, memory.clone()).await?;

        let actor = cli.actor;
        let ctx = CliContext::new(Planner::new(settings, store), actor);
        let result = cli::run(cli, &ctx).await;

        // Flush regardless of the command result
        memory.flush().await?;
        side_channel_metrics().log_stats();
        shutdown_database().await;
        result
    })
}

#[cfg(feature = "database")]
async fn select_store(
    settings: &ppmp_planner::PlannerConfig,
    memory: Arc<MemoryStore>,
) -> Result<Arc<dyn RecordStore>> {
    match init_database(settings.database.as_ref()).await? {
        Some(sqlite) => Ok(Arc::new(sqlite)),
        None => Ok(memory),
    }
}

#[cfg(not(feature = "database"))]
async fn select_store(
    settings: &ppmp_planner::PlannerConfig,
    memory: Arc<MemoryStore>,
) -> Result<Arc<dyn RecordStore>> {
    init_database(settings.database.as_ref()).await?;
    Ok(memory)
}
