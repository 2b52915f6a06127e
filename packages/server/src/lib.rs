// Lead Discovery - API Core
//
// HTTP surface over the lead-discovery pipeline: run-now trigger, job
// progress and per-user job listing. Configurations and leads live in the
// pipeline's memory store, seeded from a JSON file at startup.

pub mod config;
pub mod server;

pub use config::*;
