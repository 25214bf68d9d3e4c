//! Domain events for the knowledge point graph
//!
//! Every mutating service call emits one event to an [`AuditSink`]. Sinks are
//! fire-and-forget: recording never fails the operation that produced it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::caller::Caller;

/// Events that can occur in the knowledge point graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum KnowledgeEvent {
    /// A knowledge point was created
    KnowledgePointCreated {
        knowledge_point_id: i64,
        course_id: i64,
        name: String,
        caller: Caller,
        timestamp: DateTime<Utc>,
    },
    /// A knowledge point was edited by its owner
    KnowledgePointUpdated {
        knowledge_point_id: i64,
        caller: Caller,
        timestamp: DateTime<Utc>,
    },
    /// A knowledge point was deleted and every reference to it scrubbed
    KnowledgePointDeleted {
        knowledge_point_id: i64,
        /// Rows whose prerequisite list was rewritten
        prerequisite_refs_removed: Vec<i64>,
        /// Rows whose related list was rewritten
        related_refs_removed: Vec<i64>,
        caller: Caller,
        timestamp: DateTime<Utc>,
    },
    /// A batch of LLM candidates was persisted
    IngestionCompleted {
        batch_id: String,
        course_id: i64,
        succeeded: usize,
        failed: usize,
        caller: Caller,
        timestamp: DateTime<Utc>,
    },
}

impl KnowledgeEvent {
    /// Get the timestamp of the event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::KnowledgePointCreated { timestamp, .. }
            | Self::KnowledgePointUpdated { timestamp, .. }
            | Self::KnowledgePointDeleted { timestamp, .. }
            | Self::IngestionCompleted { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type name
    pub fn event_type_name(&self) -> &'static str {
        match self {
            Self::KnowledgePointCreated { .. } => "knowledge_point_created",
            Self::KnowledgePointUpdated { .. } => "knowledge_point_updated",
            Self::KnowledgePointDeleted { .. } => "knowledge_point_deleted",
            Self::IngestionCompleted { .. } => "ingestion_completed",
        }
    }

    /// The caller that caused this event
    pub fn caller(&self) -> &Caller {
        match self {
            Self::KnowledgePointCreated { caller, .. }
            | Self::KnowledgePointUpdated { caller, .. }
            | Self::KnowledgePointDeleted { caller, .. }
            | Self::IngestionCompleted { caller, .. } => caller,
        }
    }

    /// The knowledge point this event is about, if it is about a single one
    pub fn knowledge_point_id(&self) -> Option<i64> {
        match self {
            Self::KnowledgePointCreated {
                knowledge_point_id, ..
            }
            | Self::KnowledgePointUpdated {
                knowledge_point_id, ..
            }
            | Self::KnowledgePointDeleted {
                knowledge_point_id, ..
            } => Some(*knowledge_point_id),
            Self::IngestionCompleted { .. } => None,
        }
    }

    pub fn created(caller: &Caller, knowledge_point_id: i64, course_id: i64, name: &str) -> Self {
        Self::KnowledgePointCreated {
            knowledge_point_id,
            course_id,
            name: name.to_string(),
            caller: caller.clone(),
            timestamp: Utc::now(),
        }
    }

    pub fn updated(caller: &Caller, knowledge_point_id: i64) -> Self {
        Self::KnowledgePointUpdated {
            knowledge_point_id,
            caller: caller.clone(),
            timestamp: Utc::now(),
        }
    }

    pub fn deleted(
        caller: &Caller,
        knowledge_point_id: i64,
        prerequisite_refs_removed: Vec<i64>,
        related_refs_removed: Vec<i64>,
    ) -> Self {
        Self::KnowledgePointDeleted {
            knowledge_point_id,
            prerequisite_refs_removed,
            related_refs_removed,
            caller: caller.clone(),
            timestamp: Utc::now(),
        }
    }

    pub fn ingestion_completed(
        caller: &Caller,
        batch_id: impl Into<String>,
        course_id: i64,
        succeeded: usize,
        failed: usize,
    ) -> Self {
        Self::IngestionCompleted {
            batch_id: batch_id.into(),
            course_id,
            succeeded,
            failed,
            caller: caller.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// Destination for audit events
pub trait AuditSink: Send + Sync {
    /// Record an event. Must not block and must not fail.
    fn record(&self, event: KnowledgeEvent);
}
