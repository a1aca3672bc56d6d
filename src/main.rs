/// CloudPocket server entrypoint
use cloudpocket::{
    config::ServerConfig, context::AppContext, error::PocketResult, jobs, metrics, server,
};
use std::{sync::Arc, time::Instant};
use tokio::time::{interval, Duration};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> PocketResult<()> {
    // Load configuration
    let config = ServerConfig::from_env()?;

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("cloudpocket={},tower_http=debug", config.logging.level).into()
    });
    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("CloudPocket v{}", env!("CARGO_PKG_VERSION"));

    // Create application context
    let ctx = Arc::new(AppContext::new(config).await?);

    // Start background jobs
    let scheduler = Arc::new(jobs::JobScheduler::new(Arc::clone(&ctx)));
    scheduler.start();

    tokio::spawn(track_uptime(Instant::now()));

    // Start server
    server::serve((*ctx).clone()).await?;

    Ok(())
}

async fn track_uptime(started: Instant) {
    let mut interval = interval(Duration::from_secs(15));
    loop {
        interval.tick().await;
        metrics::UPTIME_SECONDS.set(started.elapsed().as_secs_f64());
    }
}
