//! Scheduled Lead Discovery
//!
//! Runs saved discovery configurations on a cron schedule (or on demand),
//! queries news APIs, web search and industry sites concurrently, merges and
//! deduplicates what comes back, extracts structured project fields and
//! scores each lead before handing it to the host's storage.
//!
//! # Design
//!
//! - One job per run, tracked in memory with stage and percentage
//! - A failing source is dropped from the run, never fatal
//! - A failing sink ends the run in the `error` stage
//! - Scraped traffic goes through rotating proxies and user agents
//! - Unknown fields stay explicitly unknown, nothing is invented
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use lead_discovery::{Configuration, DiscoveryPipeline, MemoryStore, PipelineSettings};
//!
//! let store = Arc::new(MemoryStore::new());
//! let config = Configuration::new(owner_id, "Hotels", ["hotel", "construction"]);
//! store.insert_configuration(config.clone());
//!
//! let pipeline = DiscoveryPipeline::builder(store.clone(), store.clone())
//!     .settings(PipelineSettings::default().with_tavily_api_key(key))
//!     .build()
//!     .await?;
//! pipeline.start().await?;
//! pipeline.schedule(&config).await?;
//!
//! let ticket = pipeline.run_now(config.id).await?;
//! let progress = pipeline.progress(&ticket.job_id);
//! ```
//!
//! # Modules
//!
//! - [`scheduler`] - Cron timers and the run trigger
//! - [`aggregator`] - The staged discovery run
//! - [`sources`] - Tavily, NewsAPI, web search and industry site sources
//! - [`evasion`] - Proxy rotation, sessions and retry with backoff
//! - [`extractor`] - Field heuristics over candidate text
//! - [`verifier`] - Confidence scoring
//! - [`registry`] - In-memory job progress
//! - [`stores`] - Storage implementations (MemoryStore)
//! - [`testing`] - Mock implementations for testing

pub mod aggregator;
pub mod clock;
pub mod error;
pub mod evasion;
pub mod extractor;
pub mod maintenance;
pub mod pipeline;
pub mod registry;
pub mod scheduler;
pub mod secret;
pub mod settings;
pub mod sources;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;
pub mod verifier;

// Re-export core types at crate root
pub use error::{
    EvasionError, PipelineError, RegistryError, SchedulerError, SinkError, SourceError,
    TransportError, ValidationError,
};
pub use types::{
    Budget, CandidateResult, Completeness, ConfigSummary, Configuration, Contact, Field,
    Frequency, JobMeta, JobSnapshot, JobStage, Lead, LeadDraft, LeadFields, ProgressView,
    ProjectType, RunSummary, SourceGroup, SourceKind, StageUpdate,
};

pub use aggregator::{AggregatorSettings, SourceAggregator};
pub use clock::{Clock, SystemClock};
pub use evasion::{EvasionLayer, FetchResponse, HealthReport, ProxyEndpoint, RequestOptions};
pub use pipeline::{DiscoveryPipeline, DiscoveryPipelineBuilder};
pub use registry::JobRegistry;
pub use scheduler::{DiscoveryRunner, DiscoveryScheduler, RunTicket};
pub use secret::SecretString;
pub use settings::PipelineSettings;
pub use sources::{ContentFetcher, LeadSource, SourceQuery, SourceResult};
pub use stores::MemoryStore;
pub use traits::{ConfigurationProvider, LeadSink};
pub use verifier::{Verification, Verifier};

// Re-export testing utilities
pub use testing::{InFlightGauge, ManualClock, MockSource, MockTransport, StaticFetcher};
