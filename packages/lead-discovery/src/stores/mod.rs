//! Storage implementations for the discovery pipeline.
//!
//! Available backends:
//! - `MemoryStore` - In-memory configurations and leads (always available)

pub mod memory;

pub use memory::MemoryStore;
