use http_scheduler_core::{Config, SchedulerKernel};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let kernel = SchedulerKernel::bootstrap(config).await?;

    tracing::info!("scheduler core running, press ctrl-c to stop");
    tokio::signal::ctrl_c().await?;

    kernel.scheduler.shutdown().await;
    Ok(())
}
