//! SQLite implementation of the KnowledgePointRepository
//!
//! Edge lists are stored as encoded text in two columns of `knowledge_points`.
//! The removal sweeps narrow candidates with a textual `LIKE` match and then
//! let the codec decide real membership, so a cell such as `[12]` is never
//! mistaken for containing `1`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool, Transaction};
use tracing::{debug, info, warn};

use crate::domain::knowledge::{
    DifficultyLevel, EdgeKind, EdgeListCodec, KnowledgePoint, KnowledgePointRepository,
    NewKnowledgePoint,
};
use crate::error::{Error, Result};

const SELECT_POINT: &str = r#"
    SELECT kp.id, kp.name, kp.brief_description, kp.detailed_content, kp.course_id,
           c.name AS course_name, kp.difficulty_level,
           kp.prerequisite_knowledge_point_ids, kp.related_knowledge_point_ids,
           kp.created_at, kp.updated_at
    FROM knowledge_points kp
    LEFT JOIN courses c ON c.id = kp.course_id
"#;

/// SQLite implementation of the knowledge point repository
#[derive(Clone)]
pub struct SqliteKnowledgePointRepository {
    pool: SqlitePool,
    codec: EdgeListCodec,
}

impl SqliteKnowledgePointRepository {
    /// Create a repository using the default (strict JSON) codec
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_codec(pool, EdgeListCodec::default())
    }

    /// Create a repository with an explicit codec
    pub fn with_codec(pool: SqlitePool, codec: EdgeListCodec) -> Self {
        Self { pool, codec }
    }

    fn column(kind: EdgeKind) -> &'static str {
        match kind {
            EdgeKind::Prerequisite => "prerequisite_knowledge_point_ids",
            EdgeKind::Related => "related_knowledge_point_ids",
        }
    }

    async fn remove_from_column(
        &self,
        tx: &mut Transaction<'static, Sqlite>,
        kind: EdgeKind,
        id: i64,
    ) -> Result<Vec<i64>> {
        let column = Self::column(kind);

        let candidates: Vec<(i64, Option<String>)> = sqlx::query_as(&format!(
            "SELECT id, {column} FROM knowledge_points WHERE {column} LIKE '%' || ? || '%' ORDER BY id"
        ))
        .bind(id.to_string())
        .fetch_all(&mut **tx)
        .await?;

        let now = Utc::now().to_rfc3339();
        let mut touched = Vec::new();

        for (row_id, raw) in candidates {
            let ids = match self.codec.try_decode(raw.as_deref()) {
                Ok(ids) => ids,
                Err(e) => {
                    warn!(
                        knowledge_point_id = row_id,
                        column,
                        referenced_id = id,
                        error = %e,
                        "Skipping undecodable edge cell during sweep"
                    );
                    continue;
                }
            };
            if !ids.contains(&id) {
                continue;
            }

            let kept: Vec<i64> = ids.into_iter().filter(|edge| *edge != id).collect();
            sqlx::query(&format!(
                "UPDATE knowledge_points SET {column} = ?, updated_at = ? WHERE id = ?"
            ))
            .bind(self.codec.encode(&kept))
            .bind(&now)
            .bind(row_id)
            .execute(&mut **tx)
            .await?;

            touched.push(row_id);
        }

        debug!(
            knowledge_point_id = id,
            edge_kind = %kind,
            rows_rewritten = touched.len(),
            "Removed references from edge lists"
        );
        Ok(touched)
    }
}

#[async_trait]
impl KnowledgePointRepository for SqliteKnowledgePointRepository {
    type Tx = Transaction<'static, Sqlite>;

    // ========== Transactions ==========

    async fn begin(&self) -> Result<Self::Tx> {
        Ok(self.pool.begin().await?)
    }

    async fn commit(&self, tx: Self::Tx) -> Result<()> {
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&self, tx: Self::Tx) -> Result<()> {
        tx.rollback().await?;
        Ok(())
    }

    // ========== Writes ==========

    async fn insert(&self, tx: &mut Self::Tx, point: &NewKnowledgePoint) -> Result<KnowledgePoint> {
        let now = Utc::now().to_rfc3339();

        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO knowledge_points (
                name, brief_description, detailed_content, course_id, difficulty_level,
                prerequisite_knowledge_point_ids, related_knowledge_point_ids,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&point.name)
        .bind(&point.brief_description)
        .bind(&point.detailed_content)
        .bind(point.course_id)
        .bind(point.difficulty.as_str())
        .bind(self.codec.encode(&point.prerequisite_ids))
        .bind(self.codec.encode(&point.related_ids))
        .bind(&now)
        .bind(&now)
        .fetch_one(&mut **tx)
        .await?;

        debug!(knowledge_point_id = id, name = %point.name, "Knowledge point inserted");

        self.find_by_id_in(tx, id)
            .await?
            .ok_or(Error::KnowledgePointNotFound(id))
    }

    async fn update(&self, tx: &mut Self::Tx, point: &KnowledgePoint) -> Result<KnowledgePoint> {
        let result = sqlx::query(
            r#"
            UPDATE knowledge_points SET
                name = ?,
                brief_description = ?,
                detailed_content = ?,
                course_id = ?,
                difficulty_level = ?,
                prerequisite_knowledge_point_ids = ?,
                related_knowledge_point_ids = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&point.name)
        .bind(&point.brief_description)
        .bind(&point.detailed_content)
        .bind(point.course_id)
        .bind(point.difficulty.as_str())
        .bind(self.codec.encode(&point.prerequisite_ids))
        .bind(self.codec.encode(&point.related_ids))
        .bind(Utc::now().to_rfc3339())
        .bind(point.id)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::Conflict(format!(
                "knowledge point {} no longer exists",
                point.id
            )));
        }

        debug!(knowledge_point_id = point.id, "Knowledge point updated");

        self.find_by_id_in(tx, point.id)
            .await?
            .ok_or_else(|| Error::Conflict(format!("knowledge point {} vanished", point.id)))
    }

    async fn delete(&self, tx: &mut Self::Tx, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM knowledge_points WHERE id = ?")
            .bind(id)
            .execute(&mut **tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::KnowledgePointNotFound(id));
        }

        info!(knowledge_point_id = id, "Knowledge point row deleted");
        Ok(())
    }

    async fn remove_from_prerequisite_fields(&self, tx: &mut Self::Tx, id: i64) -> Result<Vec<i64>> {
        self.remove_from_column(tx, EdgeKind::Prerequisite, id).await
    }

    async fn remove_from_related_fields(&self, tx: &mut Self::Tx, id: i64) -> Result<Vec<i64>> {
        self.remove_from_column(tx, EdgeKind::Related, id).await
    }

    // ========== Reads ==========

    async fn find_by_id(&self, id: i64) -> Result<Option<KnowledgePoint>> {
        let row: Option<PointRow> = sqlx::query_as(&format!("{SELECT_POINT} WHERE kp.id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| r.into_point(&self.codec)).transpose()
    }

    async fn find_by_id_in(&self, tx: &mut Self::Tx, id: i64) -> Result<Option<KnowledgePoint>> {
        let row: Option<PointRow> = sqlx::query_as(&format!("{SELECT_POINT} WHERE kp.id = ?"))
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?;

        row.map(|r| r.into_point(&self.codec)).transpose()
    }

    async fn find_by_course_id(&self, course_id: i64) -> Result<Vec<KnowledgePoint>> {
        let rows: Vec<PointRow> =
            sqlx::query_as(&format!("{SELECT_POINT} WHERE kp.course_id = ? ORDER BY kp.id"))
                .bind(course_id)
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(|r| r.into_point(&self.codec)).collect()
    }

    async fn find_all(&self) -> Result<Vec<KnowledgePoint>> {
        let rows: Vec<PointRow> = sqlx::query_as(&format!("{SELECT_POINT} ORDER BY kp.id"))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(|r| r.into_point(&self.codec)).collect()
    }

    async fn find_missing_ids(&self, tx: &mut Self::Tx, ids: &[i64]) -> Result<Vec<i64>> {
        let mut unique: Vec<i64> = Vec::with_capacity(ids.len());
        for id in ids {
            if !unique.contains(id) {
                unique.push(*id);
            }
        }
        if unique.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = QueryBuilder::<Sqlite>::new("SELECT id FROM knowledge_points WHERE id IN (");
        let mut separated = query.separated(", ");
        for id in &unique {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let present: Vec<i64> = query.build_query_scalar().fetch_all(&mut **tx).await?;

        Ok(unique.into_iter().filter(|id| !present.contains(id)).collect())
    }
}

// ========== Row Types ==========

#[derive(Debug, FromRow)]
struct PointRow {
    id: i64,
    name: String,
    brief_description: String,
    detailed_content: String,
    course_id: i64,
    course_name: Option<String>,
    difficulty_level: String,
    prerequisite_knowledge_point_ids: Option<String>,
    related_knowledge_point_ids: Option<String>,
    created_at: String,
    updated_at: String,
}

impl PointRow {
    fn into_point(self, codec: &EdgeListCodec) -> Result<KnowledgePoint> {
        let difficulty = DifficultyLevel::parse(&self.difficulty_level).ok_or_else(|| {
            Error::StorageError(format!(
                "Invalid difficulty level for knowledge point {}: {}",
                self.id, self.difficulty_level
            ))
        })?;

        Ok(KnowledgePoint {
            id: self.id,
            name: self.name,
            brief_description: self.brief_description,
            detailed_content: self.detailed_content,
            course_id: self.course_id,
            course_name: self.course_name,
            difficulty,
            prerequisite_ids: codec.decode(self.prerequisite_knowledge_point_ids.as_deref()),
            related_ids: codec.decode(self.related_knowledge_point_ids.as_deref()),
            created_at: parse_timestamp(&self.created_at),
            updated_at: parse_timestamp(&self.updated_at),
        })
    }
}

/// Accepts RFC 3339 and SQLite's `CURRENT_TIMESTAMP` format
pub(crate) fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|dt| dt.and_utc()))
        .unwrap_or_else(|_| Utc::now())
}
