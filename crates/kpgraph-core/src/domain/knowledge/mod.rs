//! Knowledge point graph
//!
//! Knowledge points are nodes; each node stores its outgoing edges as two
//! ordered id lists (prerequisites and related points). The graph service
//! keeps those lists consistent: no edge to a missing node, no self-edge.
//!
//! ## Components
//!
//! - **EdgeListCodec**: edge list <-> stored text, fail-soft on read
//! - **KnowledgePointRepository**: row I/O plus the two reference sweeps
//! - **KnowledgePointService**: validated writes and the cascading delete
//! - **GraphIngestionAdapter**: persists LLM candidates as a best-effort batch
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kpgraph_core::domain::caller::Caller;
//! use kpgraph_core::domain::knowledge::{KnowledgePointService, NewKnowledgePoint};
//!
//! let service = KnowledgePointService::new(repository);
//! let limits = service
//!     .create_knowledge_point(&caller, NewKnowledgePoint::new("Limits", course_id))
//!     .await?;
//! let report = service.delete_knowledge_point(&caller, limits.id).await?;
//! ```

mod cache;
mod codec;
mod collaborator;
mod entity;
mod event;
mod graph;
mod ingestion;
mod repository;
mod service;

pub use cache::KnowledgePointCache;
pub use codec::{CodecError, EdgeListCodec, EdgeListFormat};
pub use collaborator::{CandidateNode, CandidateStream, DRAFT_ID_FLOOR, KnowledgeCollaborator};
pub use entity::{DifficultyLevel, EdgeKind, KnowledgePoint, NewKnowledgePoint};
pub use event::{AuditSink, KnowledgeEvent};
pub use graph::{BrokenReference, GraphEdge, IntegrityReport, KnowledgeGraph};
pub use ingestion::{
    DroppedEdge, FailedCandidate, GraphIngestionAdapter, IngestedPoint, IngestionSummary,
};
pub use repository::KnowledgePointRepository;
pub use service::{DeletionReport, KnowledgePointService};
