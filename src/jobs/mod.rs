use crate::metrics;
use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{error, info};

pub mod tasks;

/// Job scheduler for background tasks
pub struct JobScheduler {
    context: Arc<crate::context::AppContext>,
}

impl JobScheduler {
    pub fn new(context: Arc<crate::context::AppContext>) -> Self {
        Self { context }
    }

    /// Start all background jobs
    pub fn start(self: Arc<Self>) {
        info!("Starting background job scheduler");

        // Spawn cleanup tasks
        tokio::spawn(Self::otp_cleanup_job(Arc::clone(&self)));
        tokio::spawn(Self::lockout_cleanup_job(Arc::clone(&self)));

        // Spawn monitoring tasks
        tokio::spawn(Self::health_check_job(Arc::clone(&self)));

        info!("Background jobs started");
    }

    /// Cleanup expired passcode challenges (runs every 15 minutes)
    async fn otp_cleanup_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(900)); // Every 15 minutes

        loop {
            interval.tick().await;

            match tasks::cleanup_expired_otps(&scheduler.context).await {
                Ok(count) => {
                    metrics::record_background_job("otp_cleanup", "success");
                    if count > 0 {
                        info!("Cleaned up {} expired passcode challenges", count);
                    }
                }
                Err(e) => {
                    metrics::record_background_job("otp_cleanup", "failure");
                    error!("Failed to cleanup expired passcodes: {}", e);
                }
            }
        }
    }

    /// Cleanup stale lockout rows (runs every hour)
    async fn lockout_cleanup_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(3600)); // Every hour

        loop {
            interval.tick().await;
            info!("Running lockout cleanup");

            match tasks::cleanup_lockouts(&scheduler.context).await {
                Ok(count) => {
                    metrics::record_background_job("lockout_cleanup", "success");
                    if count > 0 {
                        info!("Cleaned up {} stale lockout records", count);
                    }
                }
                Err(e) => {
                    metrics::record_background_job("lockout_cleanup", "failure");
                    error!("Failed to cleanup lockouts: {}", e);
                }
            }
        }
    }

    /// Health check job (runs every 5 minutes)
    async fn health_check_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(300)); // Every 5 minutes

        loop {
            interval.tick().await;

            match tasks::health_check(&scheduler.context).await {
                Ok(_) => {
                    // Silent success - health is good
                    metrics::record_background_job("health_check", "success");
                }
                Err(e) => {
                    metrics::record_background_job("health_check", "failure");
                    error!("Health check failed: {}", e);
                }
            }
        }
    }
}
