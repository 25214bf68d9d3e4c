//! LLM collaborator boundary
//!
//! The collaborator is a black box that proposes knowledge points for a
//! course and turns a student's scores into study suggestions. Candidates are
//! delivered as a lazy, single-pass stream so a long extraction can be
//! persisted as it arrives.

use std::collections::HashMap;
use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;
use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::entity::{DifficultyLevel, KnowledgePoint, NewKnowledgePoint};

/// Draft ids handed out by the collaborator start here
pub const DRAFT_ID_FLOOR: i64 = 10001;

/// Stream of candidates; an `Err` item is one unusable candidate, not the end of the batch
pub type CandidateStream = Pin<Box<dyn Stream<Item = Result<CandidateNode>> + Send>>;

/// A knowledge point proposed by the collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateNode {
    /// Provisional id other candidates may use to reference this one
    pub draft_id: Option<i64>,
    pub name: String,
    pub brief_description: String,
    pub detailed_content: String,
    pub difficulty: DifficultyLevel,
    /// Prerequisite references: draft ids of other candidates or existing node ids
    pub prerequisite_hints: Vec<i64>,
    /// Related references: draft ids of other candidates or existing node ids
    pub related_hints: Vec<i64>,
}

impl CandidateNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            draft_id: None,
            name: name.into(),
            brief_description: String::new(),
            detailed_content: String::new(),
            difficulty: DifficultyLevel::default(),
            prerequisite_hints: Vec::new(),
            related_hints: Vec::new(),
        }
    }

    pub fn with_draft_id(mut self, draft_id: i64) -> Self {
        self.draft_id = Some(draft_id);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.brief_description = description.into();
        self
    }

    pub fn with_prerequisite_hints(mut self, hints: Vec<i64>) -> Self {
        self.prerequisite_hints = hints;
        self
    }

    pub fn with_related_hints(mut self, hints: Vec<i64>) -> Self {
        self.related_hints = hints;
        self
    }

    /// Build a create payload with already-resolved edges
    pub fn to_new_point(
        &self,
        course_id: i64,
        prerequisite_ids: Vec<i64>,
        related_ids: Vec<i64>,
    ) -> NewKnowledgePoint {
        NewKnowledgePoint {
            draft_id: self.draft_id,
            name: self.name.clone(),
            brief_description: self.brief_description.clone(),
            detailed_content: self.detailed_content.clone(),
            course_id,
            difficulty: self.difficulty,
            prerequisite_ids,
            related_ids,
        }
    }
}

/// Content-generation collaborator
#[async_trait]
pub trait KnowledgeCollaborator: Send + Sync {
    /// Propose knowledge points for a course
    ///
    /// `existing` lists the course's current points so candidates can
    /// reference them by id.
    async fn extract_knowledge_points(
        &self,
        course_text: &str,
        course_id: i64,
        existing: &[KnowledgePoint],
    ) -> Result<CandidateStream>;

    /// Suggest study content from per-knowledge-point scores (0-100)
    async fn recommend(
        &self,
        student_id: i64,
        performance: &HashMap<i64, f64>,
        course_id: i64,
    ) -> Result<Vec<String>>;
}
