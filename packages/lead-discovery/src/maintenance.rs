//! Periodic housekeeping on the discovery scheduler's cron instance.
//!
//! - registry eviction, every minute on the minute
//! - idle session cleanup, every minute on the half minute
//! - proxy health check, every five minutes

use std::sync::Arc;

use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::SchedulerError;
use crate::evasion::EvasionLayer;
use crate::registry::JobRegistry;

pub const EVICTION_SCHEDULE: &str = "0 * * * * *";
pub const SESSION_CLEANUP_SCHEDULE: &str = "30 * * * * *";
pub const HEALTH_CHECK_SCHEDULE: &str = "0 */5 * * * *";

/// Register the maintenance jobs. Returns their cron job ids.
pub async fn register_maintenance(
    cron: &JobScheduler,
    registry: Arc<JobRegistry>,
    evasion: Arc<EvasionLayer>,
) -> Result<Vec<Uuid>, SchedulerError> {
    let eviction_job = Job::new_async(EVICTION_SCHEDULE, move |_uuid, _lock| {
        let registry = Arc::clone(&registry);
        Box::pin(async move {
            let evicted = registry.evict_expired();
            if evicted > 0 {
                debug!(evicted = evicted, remaining = registry.len(), "Job registry eviction");
            }
        })
    })?;

    let cleanup_evasion = Arc::clone(&evasion);
    let cleanup_job = Job::new_async(SESSION_CLEANUP_SCHEDULE, move |_uuid, _lock| {
        let evasion = Arc::clone(&cleanup_evasion);
        Box::pin(async move {
            evasion.cleanup_idle_sessions();
        })
    })?;

    let health_job = Job::new_async(HEALTH_CHECK_SCHEDULE, move |_uuid, _lock| {
        let evasion = Arc::clone(&evasion);
        Box::pin(async move {
            let report = evasion.health_check().await;
            debug!(
                healthy = report.healthy,
                total = report.total,
                quarantined = report.quarantined.len(),
                restored = report.restored.len(),
                "Proxy health check"
            );
        })
    })?;

    let ids = vec![
        cron.add(eviction_job).await?,
        cron.add(cleanup_job).await?,
        cron.add(health_job).await?,
    ];
    info!("Maintenance jobs registered (eviction, session cleanup, proxy health)");
    Ok(ids)
}
