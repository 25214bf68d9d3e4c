//! Error types for kpgraph

use thiserror::Error;

/// Result type alias using kpgraph's Error
pub type Result<T> = std::result::Result<T, Error>;

/// kpgraph error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Entity errors (E001-E099)
    #[error("Knowledge point {0} not found. Run `kpgraph kp list` to see existing knowledge points.")]
    KnowledgePointNotFound(i64),

    #[error("Course {0} not found. Run `kpgraph course list` to see all courses.")]
    CourseNotFound(i64),

    // Request errors (E100-E199)
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    // Storage errors (E400-E499)
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Storage error: {0}")]
    StorageError(String),

    // Collaborator errors (E500-E599)
    #[error("LLM collaborator error: {0}")]
    CollaboratorError(String),

    #[error("Network error: {0}. Check your internet connection.")]
    NetworkError(#[from] reqwest::Error),

    #[error("LLM API error: {0}. Check that KPGRAPH_API_KEY is set.")]
    LLMError(String),

    #[error("Rate limited. Waiting {0} seconds before retry.")]
    RateLimited(u64),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Generic errors
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::KnowledgePointNotFound(_) => "E001",
            Self::CourseNotFound(_) => "E002",
            Self::ValidationFailed(_) => "E100",
            Self::Conflict(_) => "E101",
            Self::DatabaseError(_) => "E400",
            Self::StorageError(_) => "E401",
            Self::CollaboratorError(_) => "E500",
            Self::NetworkError(_) => "E501",
            Self::LLMError(_) => "E502",
            Self::RateLimited(_) => "E503",
            Self::ConfigError(_) => "E600",
            Self::Other(_) | Self::Io(_) => "E9999",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::KnowledgePointNotFound(_) => Some("kpgraph kp list".to_string()),
            Self::CourseNotFound(_) => Some("kpgraph course list".to_string()),
            Self::NetworkError(_) => Some("Check internet connection".to_string()),
            Self::LLMError(_) | Self::CollaboratorError(_) => Some("kpgraph doctor".to_string()),
            Self::ConfigError(_) => Some("kpgraph config list".to_string()),
            _ => None,
        }
    }

    /// Whether this error belongs to the storage family (transport or transaction failure)
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::DatabaseError(_) | Self::StorageError(_))
    }

    /// Whether this error means a referenced id does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::KnowledgePointNotFound(_) | Self::CourseNotFound(_))
    }

    /// Collapse any LLM transport failure into a collaborator error
    pub fn into_collaborator(self) -> Self {
        match self {
            Self::CollaboratorError(_) => self,
            other => Self::CollaboratorError(other.to_string()),
        }
    }
}
