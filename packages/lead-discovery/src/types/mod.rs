pub mod candidate;
pub mod configuration;
pub mod job;
pub mod lead;

pub use candidate::CandidateResult;
pub use configuration::{ConfigSummary, Configuration, Frequency, SourceGroup, SourceKind};
pub use job::{JobMeta, JobSnapshot, JobStage, ProgressView, RunSummary, StageUpdate};
pub use lead::{Budget, Completeness, Contact, Field, Lead, LeadDraft, LeadFields, ProjectType};
