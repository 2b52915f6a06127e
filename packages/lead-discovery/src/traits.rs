//! Contracts with the rest of the system.
//!
//! The pipeline reads configurations through [`ConfigurationProvider`] and
//! hands finished leads to a [`LeadSink`]. Both are owned by the host
//! application; [`crate::stores::MemoryStore`] implements them in memory.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{BoxError, SinkError};
use crate::types::{Configuration, Lead};

#[async_trait]
pub trait ConfigurationProvider: Send + Sync {
    /// Read-only snapshot of a configuration, None if it does not exist.
    async fn configuration(&self, id: Uuid) -> Result<Option<Configuration>, BoxError>;

    async fn is_user_active(&self, user_id: Uuid) -> Result<bool, BoxError>;
}

#[async_trait]
pub trait LeadSink: Send + Sync {
    /// Persist leads for a user. The sink deduplicates by user + URL and
    /// returns how many were actually stored.
    async fn save_leads(&self, user_id: Uuid, leads: &[Lead]) -> Result<usize, SinkError>;

    /// Record that a configuration ran and when it runs next.
    async fn record_run(
        &self,
        config_id: Uuid,
        last_run_at: DateTime<Utc>,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<(), SinkError>;
}
