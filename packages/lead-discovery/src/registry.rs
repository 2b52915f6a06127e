//! In-memory registry of discovery jobs.
//!
//! Backed by a `DashMap`: every mutation of one job runs under that entry's
//! shard lock, so concurrent runs never interleave writes to the same job
//! while unrelated jobs update independently.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::mapref::one::RefMut;
use dashmap::DashMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::RegistryError;
use crate::types::{JobMeta, JobSnapshot, JobStage, ProgressView, RunSummary, StageUpdate};

/// How long finished jobs stay readable.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(300);

pub struct JobRegistry {
    jobs: DashMap<String, JobSnapshot>,
    grace_period: chrono::Duration,
    clock: Arc<dyn Clock>,
}

impl JobRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_grace_period(clock, DEFAULT_GRACE_PERIOD)
    }

    pub fn with_grace_period(clock: Arc<dyn Clock>, grace_period: Duration) -> Self {
        Self {
            jobs: DashMap::new(),
            grace_period: chrono::Duration::from_std(grace_period)
                .unwrap_or_else(|_| chrono::Duration::minutes(5)),
            clock,
        }
    }

    pub fn create(&self, job_id: &str, meta: JobMeta) -> Result<JobSnapshot, RegistryError> {
        match self.jobs.entry(job_id.to_string()) {
            Entry::Occupied(_) => Err(RegistryError::Duplicate(job_id.to_string())),
            Entry::Vacant(slot) => {
                let snapshot = JobSnapshot::new(job_id.to_string(), meta, self.clock.now());
                slot.insert(snapshot.clone());
                debug!(job_id = %job_id, config_id = %meta.config_id, "Job created");
                Ok(snapshot)
            }
        }
    }

    pub fn contains(&self, job_id: &str) -> bool {
        self.jobs.contains_key(job_id)
    }

    /// Apply a stage change or progress tick.
    ///
    /// Backward stage moves are rejected. The percentage never decreases; an
    /// update entering `Error` keeps the last percentage.
    pub fn update(&self, job_id: &str, update: StageUpdate) -> Result<JobSnapshot, RegistryError> {
        let mut job = self.entry(job_id)?;
        self.apply(&mut job, update)?;
        Ok(job.clone())
    }

    /// Move to `Completed` and attach the summary in one write.
    pub fn complete(&self, job_id: &str, summary: RunSummary) -> Result<JobSnapshot, RegistryError> {
        let message = format!(
            "Discovery complete: {} leads saved from {} sources",
            summary.saved_leads, summary.sources_succeeded
        );
        let total = summary.saved_leads;

        let mut job = self.entry(job_id)?;
        self.apply(
            &mut job,
            StageUpdate::new(JobStage::Completed, 100, message).with_counts(total, total),
        )?;
        job.summary = Some(summary);
        info!(job_id = %job_id, "Job completed");
        Ok(job.clone())
    }

    /// Move to `Error` and attach the message in one write.
    pub fn fail(&self, job_id: &str, error: impl Into<String>) -> Result<JobSnapshot, RegistryError> {
        let error = error.into();

        let mut job = self.entry(job_id)?;
        let (current, total) = (job.current, job.total);
        self.apply(
            &mut job,
            StageUpdate::new(JobStage::Error, 0, error.clone()).with_counts(current, total),
        )?;
        job.error = Some(error);
        Ok(job.clone())
    }

    fn entry(&self, job_id: &str) -> Result<RefMut<'_, String, JobSnapshot>, RegistryError> {
        self.jobs
            .get_mut(job_id)
            .ok_or_else(|| RegistryError::NotFound(job_id.to_string()))
    }

    fn apply(&self, job: &mut JobSnapshot, update: StageUpdate) -> Result<(), RegistryError> {
        if !job.stage.can_transition_to(update.stage) {
            return Err(RegistryError::InvalidTransition {
                job_id: job.id.clone(),
                from: job.stage,
                to: update.stage,
            });
        }

        if job.stage != update.stage {
            job.stage_history.push(update.stage);
            job.stage = update.stage;
        }
        if update.stage != JobStage::Error {
            job.percentage = job.percentage.max(update.percentage.min(100));
        }
        job.current = update.current;
        job.total = update.total;
        job.message = update.message;
        if update.stage.is_terminal() {
            job.ended_at = Some(self.clock.now());
        }
        Ok(())
    }

    /// Snapshot of a live or recently finished job. None for unknown and expired ids.
    pub fn get(&self, job_id: &str) -> Option<JobSnapshot> {
        let now = self.clock.now();
        self.jobs
            .get(job_id)
            .filter(|job| !self.is_expired(job, now))
            .map(|job| job.value().clone())
    }

    pub fn progress(&self, job_id: &str) -> Option<ProgressView> {
        self.get(job_id).map(|job| job.progress())
    }

    /// A user's jobs, newest first.
    pub fn list_by_user(&self, user_id: Uuid) -> Vec<JobSnapshot> {
        let now = self.clock.now();
        let mut jobs: Vec<JobSnapshot> = self
            .jobs
            .iter()
            .filter(|job| job.user_id == user_id && !self.is_expired(job, now))
            .map(|job| job.value().clone())
            .collect();
        jobs.sort_by(|a, b| b.started_at.cmp(&a.started_at).then_with(|| b.id.cmp(&a.id)));
        jobs
    }

    /// Drop finished jobs past the grace period. Returns how many were evicted.
    pub fn evict_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.jobs.len();
        self.jobs.retain(|_, job| !self.is_expired(job, now));
        let evicted = before.saturating_sub(self.jobs.len());
        if evicted > 0 {
            debug!(evicted = evicted, "Evicted expired jobs");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    fn is_expired(&self, job: &JobSnapshot, now: DateTime<Utc>) -> bool {
        job.stage.is_terminal()
            && job
                .ended_at
                .is_some_and(|ended| now - ended >= self.grace_period)
    }
}
