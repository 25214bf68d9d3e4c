//! Knowledge point infrastructure implementations
//!
//! SQLite persistence for knowledge points and the LLM-backed collaborator.

mod collaborator;
mod repository;

pub use collaborator::LlmKnowledgeCollaborator;
pub use repository::SqliteKnowledgePointRepository;
pub(crate) use repository::parse_timestamp;
