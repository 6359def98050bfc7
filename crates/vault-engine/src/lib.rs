pub mod archaeology;
pub mod chunker;
pub mod config;
pub mod encoder;
pub mod engine;
pub mod errors;
pub mod index_manager;
pub mod pipeline;
pub mod profiles;
pub mod reranking;
pub mod search;
pub mod storage;
pub mod vault;

// Primary entry points
pub use config::EngineConfig;
pub use encoder::Encoder;
pub use engine::{EngineStats, SearchOutcome, SearchQuery, VaultEngine};
pub use errors::{EngineError, EngineResult};
pub use pipeline::{Candidate, DedupMode};

// Re-export common types
pub use anyhow::{Error, Result};
pub use uuid::Uuid;
