//! Scheduling of discovery runs.
//!
//! [`DiscoveryRunner`] turns a configuration id into a job and a run.
//! [`DiscoveryScheduler`] owns one cron timer per active configuration on a
//! `tokio-cron-scheduler` instance and hands fired triggers to the runner.
//!
//! ```text
//! cron tick / run-now
//!     │
//!     └─► DiscoveryRunner
//!             ├─► re-read configuration, check owner is active
//!             ├─► JobRegistry::create (stage: initializing)
//!             ├─► SourceAggregator::run
//!             └─► LeadSink::record_run (last run, next run)
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::aggregator::SourceAggregator;
use crate::clock::Clock;
use crate::error::{PipelineError, RegistryError, Result, SchedulerError};
use crate::registry::JobRegistry;
use crate::traits::{ConfigurationProvider, LeadSink};
use crate::types::{ConfigSummary, Configuration, JobMeta};

/// Returned by run-now before the run finishes.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunTicket {
    pub job_id: String,
    pub config_summary: ConfigSummary,
}

pub struct DiscoveryRunner {
    provider: Arc<dyn ConfigurationProvider>,
    sink: Arc<dyn LeadSink>,
    registry: Arc<JobRegistry>,
    aggregator: Arc<SourceAggregator>,
    clock: Arc<dyn Clock>,
}

impl DiscoveryRunner {
    pub fn new(
        provider: Arc<dyn ConfigurationProvider>,
        sink: Arc<dyn LeadSink>,
        registry: Arc<JobRegistry>,
        aggregator: Arc<SourceAggregator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            provider,
            sink,
            registry,
            aggregator,
            clock,
        }
    }

    /// Validate, create the job and spawn the run. Returns without waiting for it.
    ///
    /// Inactive configurations may still be run by hand; an inactive owner may not.
    pub async fn start_manual(self: &Arc<Self>, config_id: Uuid) -> Result<RunTicket> {
        let config = self
            .load(config_id)
            .await?
            .ok_or(PipelineError::ConfigurationNotFound(config_id))?;
        config.validate()?;
        if !self.user_active(config.owner_id).await? {
            return Err(PipelineError::UserInactive(config.owner_id));
        }

        let job_id = self.create_job(&config)?;
        let ticket = RunTicket {
            job_id: job_id.clone(),
            config_summary: config.summary(),
        };
        info!(job_id = %job_id, config_id = %config_id, "Manual discovery run started");

        let runner = Arc::clone(self);
        tokio::spawn(async move {
            runner.execute(config, job_id).await;
        });
        Ok(ticket)
    }

    /// Handle a fired trigger. Returns the job id, or None when the run was skipped.
    pub async fn run_scheduled(&self, config_id: Uuid) -> Result<Option<String>> {
        let Some(config) = self.load(config_id).await? else {
            info!(config_id = %config_id, "Configuration no longer exists, skipping run");
            return Ok(None);
        };
        if !config.active {
            info!(config_id = %config_id, "Configuration inactive, skipping run");
            return Ok(None);
        }
        config.validate()?;
        if !self.user_active(config.owner_id).await? {
            info!(
                config_id = %config_id,
                user_id = %config.owner_id,
                "Owner inactive, skipping run"
            );
            return Ok(None);
        }

        let job_id = self.create_job(&config)?;
        info!(job_id = %job_id, config_id = %config_id, "Scheduled discovery run started");
        self.execute(config, job_id.clone()).await;
        Ok(Some(job_id))
    }

    async fn load(&self, config_id: Uuid) -> Result<Option<Configuration>> {
        self.provider
            .configuration(config_id)
            .await
            .map_err(PipelineError::Collaborator)
    }

    async fn user_active(&self, user_id: Uuid) -> Result<bool> {
        self.provider
            .is_user_active(user_id)
            .await
            .map_err(PipelineError::Collaborator)
    }

    /// `config-<configId>-<epochMillis>`, suffixed if two runs start in the same millisecond.
    fn create_job(&self, config: &Configuration) -> Result<String> {
        let base = format!("config-{}-{}", config.id, self.clock.now().timestamp_millis());
        let meta = JobMeta {
            config_id: config.id,
            user_id: config.owner_id,
        };

        let mut job_id = base.clone();
        let mut suffix = 1;
        loop {
            match self.registry.create(&job_id, meta) {
                Ok(_) => return Ok(job_id),
                Err(RegistryError::Duplicate(_)) => {
                    suffix += 1;
                    job_id = format!("{}-{}", base, suffix);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Run the aggregator, then record last/next run whatever the outcome.
    async fn execute(&self, config: Configuration, job_id: String) {
        if let Err(e) = self.aggregator.run(&config, &job_id).await {
            error!(job_id = %job_id, error = %e, "Discovery run failed");
            let still_running = self
                .registry
                .get(&job_id)
                .is_some_and(|job| !job.stage.is_terminal());
            if still_running {
                if let Err(reg) = self.registry.fail(&job_id, e.to_string()) {
                    warn!(job_id = %job_id, error = %reg, "Could not mark job as failed");
                }
            }
        }

        let now = self.clock.now();
        let next_run = config.frequency.next_run_after(now);
        if let Err(e) = self.sink.record_run(config.id, now, next_run).await {
            warn!(config_id = %config.id, error = %e, "Failed to record run timestamps");
        }
    }
}

/// Cron timers for discovery configurations.
pub struct DiscoveryScheduler {
    cron: JobScheduler,
    /// configuration id -> cron job id
    timers: Mutex<HashMap<Uuid, Uuid>>,
    runner: Arc<DiscoveryRunner>,
    clock: Arc<dyn Clock>,
}

impl DiscoveryScheduler {
    pub async fn new(
        runner: Arc<DiscoveryRunner>,
        clock: Arc<dyn Clock>,
    ) -> std::result::Result<Self, SchedulerError> {
        let cron = JobScheduler::new().await?;
        Ok(Self {
            cron,
            timers: Mutex::new(HashMap::new()),
            runner,
            clock,
        })
    }

    pub async fn start(&self) -> std::result::Result<(), SchedulerError> {
        self.cron.start().await?;
        info!("Discovery scheduler started");
        Ok(())
    }

    /// The underlying cron scheduler, for maintenance jobs.
    pub fn cron(&self) -> &JobScheduler {
        &self.cron
    }

    pub fn runner(&self) -> &Arc<DiscoveryRunner> {
        &self.runner
    }

    /// Install or replace the timer for `config`. Inactive configurations
    /// lose any existing timer and get none. Returns the next run time.
    ///
    /// The old timer is removed before validation, so an edit that leaves the
    /// configuration invalid also leaves it unscheduled.
    pub async fn schedule(&self, config: &Configuration) -> Result<Option<DateTime<Utc>>> {
        let mut timers = self.timers.lock().await;
        if let Some(existing) = timers.remove(&config.id) {
            self.cron
                .remove(&existing)
                .await
                .map_err(SchedulerError::from)?;
            debug!(config_id = %config.id, "Removed existing timer");
        }
        if !config.active {
            info!(config_id = %config.id, "Configuration inactive, not scheduling");
            return Ok(None);
        }
        config.validate()?;

        let expression = config.frequency.cron_expression();
        let runner = Arc::clone(&self.runner);
        let config_id = config.id;
        let job = Job::new_async(expression.as_str(), move |_uuid, _lock| {
            let runner = Arc::clone(&runner);
            Box::pin(async move {
                match runner.run_scheduled(config_id).await {
                    Ok(Some(job_id)) => {
                        debug!(config_id = %config_id, job_id = %job_id, "Scheduled run finished")
                    }
                    Ok(None) => {}
                    Err(e) => {
                        error!(config_id = %config_id, error = %e, "Scheduled run could not start")
                    }
                }
            })
        })
        .map_err(SchedulerError::from)?;

        let timer_id = self.cron.add(job).await.map_err(SchedulerError::from)?;
        timers.insert(config.id, timer_id);

        let next_run = config.frequency.next_run_after(self.clock.now());
        info!(
            config_id = %config.id,
            cron = %expression,
            next_run = ?next_run,
            "Configuration scheduled"
        );
        Ok(next_run)
    }

    /// Cancel the timer for a configuration. Returns whether one existed.
    pub async fn unschedule(&self, config_id: Uuid) -> Result<bool> {
        let mut timers = self.timers.lock().await;
        match timers.remove(&config_id) {
            Some(timer_id) => {
                self.cron
                    .remove(&timer_id)
                    .await
                    .map_err(SchedulerError::from)?;
                info!(config_id = %config_id, "Configuration unscheduled");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn run_now(&self, config_id: Uuid) -> Result<RunTicket> {
        self.runner.start_manual(config_id).await
    }

    pub async fn is_scheduled(&self, config_id: Uuid) -> bool {
        self.timers.lock().await.contains_key(&config_id)
    }

    pub async fn scheduled_count(&self) -> usize {
        self.timers.lock().await.len()
    }

    /// Stop every timer, maintenance jobs included.
    pub async fn shutdown(&self) -> std::result::Result<(), SchedulerError> {
        let mut cron = self.cron.clone();
        cron.shutdown().await?;
        let cancelled = {
            let mut timers = self.timers.lock().await;
            let count = timers.len();
            timers.clear();
            count
        };
        info!(timers = cancelled, "Discovery scheduler stopped");
        Ok(())
    }
}
