//! SQLite implementation of the CourseRepository

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{FromRow, SqlitePool};
use tracing::info;

use crate::domain::course::{Course, CourseRepository};
use crate::error::{Error, Result};
use crate::infrastructure::knowledge::parse_timestamp;

#[derive(Clone)]
pub struct SqliteCourseRepository {
    pool: SqlitePool,
}

impl SqliteCourseRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CourseRepository for SqliteCourseRepository {
    async fn create(&self, name: &str, description: Option<&str>) -> Result<Course> {
        if name.trim().is_empty() {
            return Err(Error::ValidationFailed("course name must not be blank".into()));
        }

        let row: CourseRow = sqlx::query_as(
            r#"
            INSERT INTO courses (name, description, created_at)
            VALUES (?, ?, ?)
            RETURNING id, name, description, created_at
            "#,
        )
        .bind(name.trim())
        .bind(description)
        .bind(Utc::now().to_rfc3339())
        .fetch_one(&self.pool)
        .await?;

        info!(course_id = row.id, name = %row.name, "Course created");
        Ok(row.into_course())
    }

    async fn get(&self, id: i64) -> Result<Option<Course>> {
        let row: Option<CourseRow> =
            sqlx::query_as("SELECT id, name, description, created_at FROM courses WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(CourseRow::into_course))
    }

    async fn list(&self) -> Result<Vec<Course>> {
        let rows: Vec<CourseRow> =
            sqlx::query_as("SELECT id, name, description, created_at FROM courses ORDER BY id")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(CourseRow::into_course).collect())
    }
}

#[derive(Debug, FromRow)]
struct CourseRow {
    id: i64,
    name: String,
    description: Option<String>,
    created_at: String,
}

impl CourseRow {
    fn into_course(self) -> Course {
        Course {
            id: self.id,
            name: self.name,
            description: self.description,
            created_at: parse_timestamp(&self.created_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;

    #[tokio::test]
    async fn test_create_get_list() {
        let db = Database::in_memory().await.unwrap();
        let repo = SqliteCourseRepository::new(db.pool().clone());

        let course = repo.create("Linear Algebra", Some("Vectors and matrices")).await.unwrap();
        repo.create("Calculus", None).await.unwrap();

        let found = repo.get(course.id).await.unwrap().unwrap();
        assert_eq!(found.name, "Linear Algebra");
        assert_eq!(found.description.as_deref(), Some("Vectors and matrices"));

        let all = repo.list().await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(repo.get(99).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_blank_name_rejected() {
        let db = Database::in_memory().await.unwrap();
        let repo = SqliteCourseRepository::new(db.pool().clone());

        assert!(matches!(
            repo.create("  ", None).await,
            Err(Error::ValidationFailed(_))
        ));
    }
}
