//! Knowledge point types
//!
//! A knowledge point is a node in a course's knowledge graph. Its outgoing
//! edges live on the node itself as two ordered id lists: prerequisites
//! ("depends on") and related points ("see also").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted knowledge point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgePoint {
    /// Store-assigned identifier
    pub id: i64,
    pub name: String,
    pub brief_description: String,
    pub detailed_content: String,
    /// Owning course
    pub course_id: i64,
    /// Course name, filled in on read for display
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_name: Option<String>,
    pub difficulty: DifficultyLevel,
    /// Points this one depends on, in insertion order
    pub prerequisite_ids: Vec<i64>,
    /// Points worth seeing alongside this one, in insertion order
    pub related_ids: Vec<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl KnowledgePoint {
    /// Edge list of the given kind
    pub fn edges(&self, kind: EdgeKind) -> &[i64] {
        match kind {
            EdgeKind::Prerequisite => &self.prerequisite_ids,
            EdgeKind::Related => &self.related_ids,
        }
    }

    /// Whether any edge of either kind points at `id`
    pub fn references(&self, id: i64) -> bool {
        self.prerequisite_ids.contains(&id) || self.related_ids.contains(&id)
    }
}

/// Payload for creating a knowledge point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewKnowledgePoint {
    /// Provisional id chosen by the caller (e.g. an LLM draft id). The store
    /// always assigns its own id; this one only matters for self-reference
    /// checks and draft-id mapping during ingestion.
    #[serde(default)]
    pub draft_id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub brief_description: String,
    #[serde(default)]
    pub detailed_content: String,
    pub course_id: i64,
    #[serde(default)]
    pub difficulty: DifficultyLevel,
    #[serde(default)]
    pub prerequisite_ids: Vec<i64>,
    #[serde(default)]
    pub related_ids: Vec<i64>,
}

impl NewKnowledgePoint {
    /// Create a new knowledge point payload with no edges
    pub fn new(name: impl Into<String>, course_id: i64) -> Self {
        Self {
            draft_id: None,
            name: name.into(),
            brief_description: String::new(),
            detailed_content: String::new(),
            course_id,
            difficulty: DifficultyLevel::default(),
            prerequisite_ids: Vec::new(),
            related_ids: Vec::new(),
        }
    }

    /// Set the short description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.brief_description = description.into();
        self
    }

    /// Set the detailed content
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.detailed_content = content.into();
        self
    }

    /// Set the difficulty level
    pub fn with_difficulty(mut self, difficulty: DifficultyLevel) -> Self {
        self.difficulty = difficulty;
        self
    }

    /// Set the prerequisite edges
    pub fn with_prerequisites(mut self, ids: Vec<i64>) -> Self {
        self.prerequisite_ids = ids;
        self
    }

    /// Set the related edges
    pub fn with_related(mut self, ids: Vec<i64>) -> Self {
        self.related_ids = ids;
        self
    }

    /// Set a provisional id
    pub fn with_draft_id(mut self, draft_id: i64) -> Self {
        self.draft_id = Some(draft_id);
        self
    }
}

/// Difficulty of a knowledge point, ordered from easiest to hardest
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DifficultyLevel {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

impl DifficultyLevel {
    /// Get the stored representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Beginner => "BEGINNER",
            Self::Intermediate => "INTERMEDIATE",
            Self::Advanced => "ADVANCED",
        }
    }

    /// Human-readable description of the level
    pub fn description(&self) -> &'static str {
        match self {
            Self::Beginner => "Foundational material with no assumed background",
            Self::Intermediate => "Builds on foundational points within the course",
            Self::Advanced => "Combines several earlier points or goes beyond the core syllabus",
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "BEGINNER" | "BASIC" | "EASY" => Some(Self::Beginner),
            "INTERMEDIATE" | "MEDIUM" => Some(Self::Intermediate),
            "ADVANCED" | "HARD" => Some(Self::Advanced),
            _ => None,
        }
    }

    /// Get all levels, easiest first
    pub fn all() -> &'static [DifficultyLevel] {
        &[Self::Beginner, Self::Intermediate, Self::Advanced]
    }
}

impl std::fmt::Display for DifficultyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of edge between two knowledge points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Source depends on target
    Prerequisite,
    /// Source and target are worth studying together
    Related,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prerequisite => "prerequisite",
            Self::Related => "related",
        }
    }

    /// Both kinds, in sweep order
    pub fn all() -> &'static [EdgeKind] {
        &[Self::Prerequisite, Self::Related]
    }
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
