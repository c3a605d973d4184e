mod config;
mod file_drop;
mod main_lib;
mod scheduler;

use config::Config;
use main_lib::{build_state, init_tracing};
use scheduler::SchedulerSettings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();
    init_tracing(&config.log_format);
    let state = build_state(&config).await?;

    let scheduler = scheduler::start_item_sync_scheduler(
        state,
        SchedulerSettings {
            initial_delay: config.initial_delay,
            sync_interval: config.sync_interval,
            run_deadline: config.run_deadline,
        },
    );
    tracing::info!("Watching {} for provider payloads", config.drop_dir.display());

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    scheduler.abort();
    Ok(())
}
