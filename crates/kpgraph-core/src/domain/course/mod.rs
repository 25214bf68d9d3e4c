//! Courses own knowledge points

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A course
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Repository trait for course persistence
#[async_trait]
pub trait CourseRepository: Send + Sync {
    /// Create a course; the store assigns the id
    async fn create(&self, name: &str, description: Option<&str>) -> Result<Course>;

    /// Get a course by id
    async fn get(&self, id: i64) -> Result<Option<Course>>;

    /// List all courses, oldest first
    async fn list(&self) -> Result<Vec<Course>>;
}
