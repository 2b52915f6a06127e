//! Job state as tracked by the registry and read by progress queries.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stage of a discovery run. Declaration order is the forward order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    Initializing,
    Scraping,
    Enriching,
    Extracting,
    Saving,
    Completed,
    Error,
}

impl JobStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStage::Completed | JobStage::Error)
    }

    /// Stages only move forward (or stay put) or drop into `Error`.
    /// Nothing leaves a terminal stage.
    pub fn can_transition_to(self, next: JobStage) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == JobStage::Error || next >= self
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStage::Initializing => "initializing",
            JobStage::Scraping => "scraping",
            JobStage::Enriching => "enriching",
            JobStage::Extracting => "extracting",
            JobStage::Saving => "saving",
            JobStage::Completed => "completed",
            JobStage::Error => "error",
        }
    }
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ownership data for a new job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobMeta {
    pub config_id: Uuid,
    pub user_id: Uuid,
}

/// A stage change or progress tick written by the aggregator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageUpdate {
    pub stage: JobStage,
    pub current: usize,
    pub total: usize,
    pub percentage: u8,
    pub message: String,
}

impl StageUpdate {
    pub fn new(stage: JobStage, percentage: u8, message: impl Into<String>) -> Self {
        Self {
            stage,
            current: 0,
            total: 0,
            percentage,
            message: message.into(),
        }
    }

    pub fn with_counts(mut self, current: usize, total: usize) -> Self {
        self.current = current;
        self.total = total;
        self
    }
}

/// Counters reported when a run completes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub sources_planned: usize,
    pub sources_succeeded: usize,
    pub sources_failed: usize,
    pub candidates_found: usize,
    pub duplicates_removed: usize,
    pub candidates_enriched: usize,
    pub leads_generated: usize,
    pub verification_failures: usize,
    pub saved_leads: usize,
}

/// Full state of one job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub id: String,
    pub config_id: Uuid,
    pub user_id: Uuid,
    pub stage: JobStage,
    pub current: usize,
    pub total: usize,
    pub percentage: u8,
    pub message: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub summary: Option<RunSummary>,
    pub error: Option<String>,
    /// Every distinct stage the job has entered, in order
    pub stage_history: Vec<JobStage>,
}

impl JobSnapshot {
    pub(crate) fn new(id: String, meta: JobMeta, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            config_id: meta.config_id,
            user_id: meta.user_id,
            stage: JobStage::Initializing,
            current: 0,
            total: 0,
            percentage: 0,
            message: "Initializing discovery run".to_string(),
            started_at,
            ended_at: None,
            summary: None,
            error: None,
            stage_history: vec![JobStage::Initializing],
        }
    }

    pub fn progress(&self) -> ProgressView {
        ProgressView {
            stage: self.stage,
            progress: self.current,
            total: self.total,
            percentage: self.percentage,
            message: self.message.clone(),
        }
    }
}

/// What the progress query returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressView {
    pub stage: JobStage,
    pub progress: usize,
    pub total: usize,
    pub percentage: u8,
    pub message: String,
}
