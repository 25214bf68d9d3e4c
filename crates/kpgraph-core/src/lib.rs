//! kpgraph core library
//!
//! This crate provides the knowledge point graph store:
//! - Knowledge points with prerequisite and related edges stored per row
//! - Fail-soft edge-list codec
//! - Transactional cascading delete that keeps every edge list consistent
//! - Best-effort ingestion of LLM-proposed knowledge points
//! - Storage (SQLite) and configuration

pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod llm;
pub mod storage;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::domain::caller::{Caller, Role};
    pub use crate::domain::knowledge::{
        DifficultyLevel, KnowledgePoint, KnowledgePointService, NewKnowledgePoint,
    };
    pub use crate::error::{Error, Result};
    pub use crate::storage::Database;
}
