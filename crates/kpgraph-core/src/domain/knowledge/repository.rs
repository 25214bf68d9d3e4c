//! Repository trait for knowledge point persistence
//!
//! The repository does literal row I/O. Edge-list consistency across rows is
//! the graph service's job; the two `remove_from_*` sweeps are the only
//! multi-row writes and they only ever run inside the service's transaction.

use async_trait::async_trait;

use crate::error::Result;

use super::entity::{KnowledgePoint, NewKnowledgePoint};

/// Repository trait for knowledge point persistence
///
/// Methods that take a `&mut Self::Tx` run inside a transaction the caller
/// opened with [`begin`](Self::begin). Dropping a transaction without
/// committing it rolls it back.
#[async_trait]
pub trait KnowledgePointRepository: Send + Sync {
    /// Scoped transaction handle
    type Tx: Send;

    // ========== Transactions ==========

    /// Open a transaction
    async fn begin(&self) -> Result<Self::Tx>;

    /// Commit a transaction
    async fn commit(&self, tx: Self::Tx) -> Result<()>;

    /// Roll a transaction back explicitly
    async fn rollback(&self, tx: Self::Tx) -> Result<()>;

    // ========== Writes ==========

    /// Insert a new row; the store assigns the id
    async fn insert(&self, tx: &mut Self::Tx, point: &NewKnowledgePoint) -> Result<KnowledgePoint>;

    /// Replace every column of an existing row
    ///
    /// Fails with `Conflict` when the row no longer exists.
    async fn update(&self, tx: &mut Self::Tx, point: &KnowledgePoint) -> Result<KnowledgePoint>;

    /// Delete a row; fails with `KnowledgePointNotFound` when absent
    async fn delete(&self, tx: &mut Self::Tx, id: i64) -> Result<()>;

    /// Drop `id` from every row's prerequisite list, returning the ids of the rows rewritten
    async fn remove_from_prerequisite_fields(&self, tx: &mut Self::Tx, id: i64) -> Result<Vec<i64>>;

    /// Drop `id` from every row's related list, returning the ids of the rows rewritten
    async fn remove_from_related_fields(&self, tx: &mut Self::Tx, id: i64) -> Result<Vec<i64>>;

    // ========== Reads ==========

    /// Look up a row by id; absence is not an error
    async fn find_by_id(&self, id: i64) -> Result<Option<KnowledgePoint>>;

    /// Look up a row by id inside a transaction
    async fn find_by_id_in(&self, tx: &mut Self::Tx, id: i64) -> Result<Option<KnowledgePoint>>;

    /// All rows of a course, oldest first
    async fn find_by_course_id(&self, course_id: i64) -> Result<Vec<KnowledgePoint>>;

    /// All rows, oldest first
    async fn find_all(&self) -> Result<Vec<KnowledgePoint>>;

    /// Which of `ids` do not exist as rows, in input order without repeats
    async fn find_missing_ids(&self, tx: &mut Self::Tx, ids: &[i64]) -> Result<Vec<i64>>;
}
