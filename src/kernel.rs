//! Wires configuration, the store, and the scheduler service into one
//! handle the binary entrypoint (and tests) can hold and pass around.

use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::scheduler::SchedulerService;
use crate::store::{SqliteStore, Store};

pub struct SchedulerKernel {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub scheduler: Arc<SchedulerService>,
}

impl SchedulerKernel {
    pub async fn bootstrap(config: Config) -> anyhow::Result<Self> {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::connect(&config.database_url).await?);
        let scheduler = SchedulerService::new(
            Arc::clone(&store),
            Duration::from_secs(config.default_timeout_secs),
            config.max_concurrent_jobs,
        )?;

        scheduler.start().await;
        scheduler.rehydrate().await?;

        Ok(Self {
            config,
            store,
            scheduler,
        })
    }
}
