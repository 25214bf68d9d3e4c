//! Graph ingestion from the LLM collaborator
//!
//! Candidates arrive as a stream and are persisted one at a time through the
//! graph service, so every node gets the same validation as a hand-made one.
//! A bad candidate is recorded and skipped; the batch keeps going.
//!
//! Candidates may reference each other by draft id before any of them has a
//! real id. Ingestion runs in two passes:
//!
//! 1. create each node with the edges that already resolve (existing nodes,
//!    or candidates created earlier in this batch) and remember the rest;
//! 2. once the stream is drained, link the remembered edges that now resolve
//!    and drop the ones that never will.
//!
//! A hint at or above [`DRAFT_ID_FLOOR`] is only taken as an existing node id
//! in the second pass, after it failed to match any candidate's draft id.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::caller::Caller;
use crate::error::{Error, Result};

use super::collaborator::{CandidateNode, DRAFT_ID_FLOOR, KnowledgeCollaborator};
use super::entity::EdgeKind;
use super::event::KnowledgeEvent;
use super::repository::KnowledgePointRepository;
use super::service::KnowledgePointService;

/// A candidate that became a knowledge point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestedPoint {
    pub draft_id: Option<i64>,
    pub knowledge_point_id: i64,
    pub name: String,
}

/// A candidate that could not be persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedCandidate {
    /// Zero-based position in the candidate stream
    pub position: usize,
    pub draft_id: Option<i64>,
    pub name: Option<String>,
    pub reason: String,
}

/// An edge hint that was not linked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedEdge {
    pub knowledge_point_id: i64,
    pub hint: i64,
    pub kind: EdgeKind,
    pub reason: String,
}

/// Outcome of one ingestion batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionSummary {
    pub batch_id: Uuid,
    pub course_id: i64,
    pub succeeded: Vec<IngestedPoint>,
    pub failed: Vec<FailedCandidate>,
    pub dropped_edges: Vec<DroppedEdge>,
}

impl IngestionSummary {
    fn new(course_id: i64) -> Self {
        Self {
            batch_id: Uuid::new_v4(),
            course_id,
            succeeded: Vec::new(),
            failed: Vec::new(),
            dropped_edges: Vec::new(),
        }
    }

    /// Whether every candidate and every edge hint made it into the graph
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.dropped_edges.is_empty()
    }

    /// Real ids in stream order
    pub fn created_ids(&self) -> Vec<i64> {
        self.succeeded.iter().map(|p| p.knowledge_point_id).collect()
    }
}

/// Edges left over from the first pass
struct PendingLinks {
    knowledge_point_id: i64,
    prerequisites: Vec<i64>,
    related: Vec<i64>,
}

/// Draft-id bookkeeping for one batch
struct HintResolver {
    existing: HashSet<i64>,
    drafts: HashMap<i64, i64>,
}

impl HintResolver {
    /// First-pass resolution: `Some(id)` when the hint can be linked now
    fn resolve_now(&self, hint: i64) -> Option<i64> {
        if let Some(id) = self.drafts.get(&hint) {
            return Some(*id);
        }
        (hint < DRAFT_ID_FLOOR && self.existing.contains(&hint)).then_some(hint)
    }

    /// Second-pass resolution, after every draft id is known
    fn resolve_late(&self, hint: i64) -> Option<i64> {
        self.drafts
            .get(&hint)
            .copied()
            .or_else(|| self.existing.contains(&hint).then_some(hint))
    }

    /// Split hints into (linkable now, deferred), skipping repeats and the candidate's own draft id
    fn partition(&self, hints: &[i64], own_draft: Option<i64>) -> (Vec<i64>, Vec<i64>) {
        let mut now = Vec::new();
        let mut later = Vec::new();
        for hint in hints {
            if Some(*hint) == own_draft {
                continue;
            }
            match self.resolve_now(*hint) {
                Some(id) if !now.contains(&id) => now.push(id),
                Some(_) => {}
                None if !later.contains(hint) => later.push(*hint),
                None => {}
            }
        }
        (now, later)
    }
}

/// Persists collaborator output into the graph
pub struct GraphIngestionAdapter<R: KnowledgePointRepository> {
    service: Arc<KnowledgePointService<R>>,
    collaborator: Arc<dyn KnowledgeCollaborator>,
}

impl<R: KnowledgePointRepository> GraphIngestionAdapter<R> {
    pub fn new(
        service: Arc<KnowledgePointService<R>>,
        collaborator: Arc<dyn KnowledgeCollaborator>,
    ) -> Self {
        Self {
            service,
            collaborator,
        }
    }

    /// Extract knowledge points from course text and persist them
    ///
    /// Fails only when the collaborator cannot be reached at all. Per-node
    /// failures are reported in the summary.
    pub async fn ingest_course(
        &self,
        caller: &Caller,
        course_id: i64,
        course_text: &str,
    ) -> Result<IngestionSummary> {
        let existing_points = self.service.list_by_course(course_id).await?;
        let mut resolver = HintResolver {
            existing: self
                .service
                .list_all()
                .await?
                .into_iter()
                .map(|p| p.id)
                .collect(),
            drafts: HashMap::new(),
        };

        let mut candidates = self
            .collaborator
            .extract_knowledge_points(course_text, course_id, &existing_points)
            .await
            .map_err(Error::into_collaborator)?;

        let mut summary = IngestionSummary::new(course_id);
        info!(
            batch_id = %summary.batch_id,
            course_id,
            caller = %caller,
            existing = existing_points.len(),
            "Starting knowledge point ingestion"
        );

        let mut pending = Vec::new();
        let mut position = 0;
        while let Some(item) = candidates.next().await {
            let current = position;
            position += 1;

            let candidate = match item {
                Ok(candidate) => candidate,
                Err(e) => {
                    warn!(batch_id = %summary.batch_id, position = current, error = %e, "Unusable candidate");
                    summary.failed.push(FailedCandidate {
                        position: current,
                        draft_id: None,
                        name: None,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            if let Some(links) = self
                .persist_candidate(caller, course_id, current, &candidate, &mut resolver, &mut summary)
                .await
            {
                pending.push(links);
            }
        }

        for links in pending {
            self.link_deferred(caller, links, &resolver, &mut summary).await;
        }

        info!(
            batch_id = %summary.batch_id,
            succeeded = summary.succeeded.len(),
            failed = summary.failed.len(),
            dropped_edges = summary.dropped_edges.len(),
            "Knowledge point ingestion finished"
        );
        self.service.record_event(KnowledgeEvent::ingestion_completed(
            caller,
            summary.batch_id.to_string(),
            course_id,
            summary.succeeded.len(),
            summary.failed.len(),
        ));
        Ok(summary)
    }

    /// First pass for one candidate; returns the edges to link later, if any
    async fn persist_candidate(
        &self,
        caller: &Caller,
        course_id: i64,
        position: usize,
        candidate: &CandidateNode,
        resolver: &mut HintResolver,
        summary: &mut IngestionSummary,
    ) -> Option<PendingLinks> {
        let (prerequisites, deferred_prerequisites) =
            resolver.partition(&candidate.prerequisite_hints, candidate.draft_id);
        let (related, deferred_related) =
            resolver.partition(&candidate.related_hints, candidate.draft_id);

        let new_point = candidate.to_new_point(course_id, prerequisites, related);
        match self.service.create_knowledge_point(caller, new_point).await {
            Ok(point) => {
                info!(
                    batch_id = %summary.batch_id,
                    position,
                    draft_id = ?candidate.draft_id,
                    knowledge_point_id = point.id,
                    "Ingested knowledge point"
                );
                if let Some(draft_id) = candidate.draft_id {
                    resolver.drafts.insert(draft_id, point.id);
                }
                resolver.existing.insert(point.id);
                summary.succeeded.push(IngestedPoint {
                    draft_id: candidate.draft_id,
                    knowledge_point_id: point.id,
                    name: point.name,
                });

                if deferred_prerequisites.is_empty() && deferred_related.is_empty() {
                    None
                } else {
                    Some(PendingLinks {
                        knowledge_point_id: point.id,
                        prerequisites: deferred_prerequisites,
                        related: deferred_related,
                    })
                }
            }
            Err(e) => {
                warn!(
                    batch_id = %summary.batch_id,
                    position,
                    name = %candidate.name,
                    error = %e,
                    "Failed to persist candidate"
                );
                summary.failed.push(FailedCandidate {
                    position,
                    draft_id: candidate.draft_id,
                    name: Some(candidate.name.clone()),
                    reason: e.to_string(),
                });
                None
            }
        }
    }

    /// Second pass for one node
    async fn link_deferred(
        &self,
        caller: &Caller,
        links: PendingLinks,
        resolver: &HintResolver,
        summary: &mut IngestionSummary,
    ) {
        let id = links.knowledge_point_id;
        let mut resolved: Vec<(EdgeKind, i64)> = Vec::new();

        for (kind, hints) in [
            (EdgeKind::Prerequisite, &links.prerequisites),
            (EdgeKind::Related, &links.related),
        ] {
            for hint in hints {
                match resolver.resolve_late(*hint) {
                    Some(target) if target != id => resolved.push((kind, target)),
                    Some(_) => summary.dropped_edges.push(DroppedEdge {
                        knowledge_point_id: id,
                        hint: *hint,
                        kind,
                        reason: "resolves to the node itself".into(),
                    }),
                    None => summary.dropped_edges.push(DroppedEdge {
                        knowledge_point_id: id,
                        hint: *hint,
                        kind,
                        reason: "no candidate or knowledge point with this id".into(),
                    }),
                }
            }
        }

        if resolved.is_empty() {
            return;
        }

        let outcome = self
            .service
            .add_edges(caller, id, &resolved)
            .await
            .map(|_| ());

        match outcome {
            Ok(()) => debug!(knowledge_point_id = id, linked = resolved.len(), "Linked deferred edges"),
            Err(e) => {
                warn!(knowledge_point_id = id, error = %e, "Failed to link deferred edges");
                for (kind, target) in resolved {
                    summary.dropped_edges.push(DroppedEdge {
                        knowledge_point_id: id,
                        hint: target,
                        kind,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    /// Study suggestions for a student from per-knowledge-point scores
    pub async fn recommend_learning_content(
        &self,
        caller: &Caller,
        student_id: i64,
        performance: &HashMap<i64, f64>,
        course_id: i64,
    ) -> Result<Vec<String>> {
        info!(student_id, course_id, caller = %caller, scores = performance.len(), "Requesting recommendations");
        self.collaborator
            .recommend(student_id, performance, course_id)
            .await
            .map_err(Error::into_collaborator)
    }
}
