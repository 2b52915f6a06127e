//! Typed errors for the discovery pipeline.
//!
//! Uses `thiserror` for library errors (not `anyhow`). Each concern gets its own
//! enum so callers can tell isolated failures (a source, an enrichment fetch)
//! from failures that end a run (the sink) and from failures that prevent a run
//! from ever starting (validation, inactive owner).

use thiserror::Error;
use uuid::Uuid;

use crate::evasion::FailureKind;
use crate::types::JobStage;

/// Boxed error returned by external collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced by the pipeline's public operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// No configuration with this id exists
    #[error("configuration not found: {0}")]
    ConfigurationNotFound(Uuid),

    /// Configuration failed validation; no job was created
    #[error("invalid configuration: {0}")]
    Validation(#[from] ValidationError),

    /// Owning user is no longer active; no job was created
    #[error("user {0} is not active")]
    UserInactive(Uuid),

    /// Sink rejected a write
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// Job registry rejected an operation
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Cron scheduler failure
    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// Configuration provider failed
    #[error("collaborator error: {0}")]
    Collaborator(#[source] BoxError),
}

/// Configuration validation failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("at least one keyword is required")]
    NoKeywords,

    #[error("at least one source must be enabled")]
    NoSources,

    #[error("max results must be greater than zero")]
    ZeroMaxResults,

    #[error("invalid frequency: {0}")]
    InvalidFrequency(String),
}

/// Errors from a single source query. Always isolated to that source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[source] BoxError),

    /// Provider answered with an error status
    #[error("{provider} API error {status}: {message}")]
    Api {
        provider: &'static str,
        status: u16,
        message: String,
    },

    /// Response could not be mapped into results
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Fetch through the evasion layer failed
    #[error("fetch failed: {0}")]
    Fetch(#[from] EvasionError),
}

/// Errors from the evasion layer.
#[derive(Debug, Error)]
pub enum EvasionError {
    /// URL could not be parsed or has no host
    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },

    /// Retry ceiling reached
    #[error("gave up on {url} after {attempts} attempts: {last}")]
    Exhausted {
        url: String,
        attempts: u32,
        last: FailureKind,
    },

    /// Non-retryable status (e.g. 404)
    #[error("non-retryable status {status} from {url}")]
    Rejected { url: String, status: u16 },

    /// Non-retryable transport failure
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Layer has been closed during shutdown
    #[error("evasion layer is closed")]
    Closed,
}

/// Errors from the underlying HTTP transport.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("{0}")]
    Other(String),
}

/// Errors from the job registry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("job not found: {0}")]
    NotFound(String),

    #[error("job already exists: {0}")]
    Duplicate(String),

    #[error("invalid transition for {job_id}: {from} -> {to}")]
    InvalidTransition {
        job_id: String,
        from: JobStage,
        to: JobStage,
    },
}

/// Errors from the persistence sink. Fatal to the run that hit them.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink rejected write: {0}")]
    Rejected(String),

    #[error("storage error: {0}")]
    Storage(#[source] BoxError),
}

/// Errors from the cron scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("cron scheduler error: {0}")]
    Cron(#[from] tokio_cron_scheduler::JobSchedulerError),
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
