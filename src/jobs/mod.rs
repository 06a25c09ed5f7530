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

        tokio::spawn(Self::deletion_reconcile_job(Arc::clone(&self)));
        tokio::spawn(Self::registry_refresh_job(Arc::clone(&self)));
        tokio::spawn(Self::health_check_job(Arc::clone(&self)));

        info!("Background jobs started");
    }

    /// Settle due deletions and pending recoveries.
    async fn deletion_reconcile_job(scheduler: Arc<Self>) {
        let period = scheduler.context.config.jobs.reconcile_interval_secs;
        let mut interval = interval(Duration::from_secs(period));

        loop {
            interval.tick().await;
            info!("Running deletion reconciler");
            tasks::reconcile_deletions(&scheduler.context).await;
        }
    }

    /// Re-read tenant configuration (tenants, app keys, holidays, white
    /// list) so operators can rotate credentials without a restart.
    async fn registry_refresh_job(scheduler: Arc<Self>) {
        let period = scheduler.context.config.jobs.refresh_interval_secs;
        let mut interval = interval(Duration::from_secs(period));

        loop {
            interval.tick().await;

            match tasks::refresh_registry(&scheduler.context) {
                Ok(()) => {
                    // Silent success
                }
                Err(e) => error!("Failed to refresh tenant registry: {}", e),
            }
        }
    }

    /// Health check job (runs every 5 minutes)
    async fn health_check_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(300));

        loop {
            interval.tick().await;

            match tasks::health_check(&scheduler.context).await {
                Ok(()) => {
                    // Silent success - health is good
                }
                Err(e) => error!("Health check failed: {}", e),
            }
        }
    }
}
