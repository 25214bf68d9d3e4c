//! Read-through cache boundary for knowledge points

use super::entity::KnowledgePoint;

/// Cache of decoded knowledge points keyed by id
///
/// The graph service is the only writer. It invalidates every row a mutation
/// rewrites, including rows touched by the deletion sweep.
pub trait KnowledgePointCache: Send + Sync {
    /// Get a live entry
    fn get(&self, id: i64) -> Option<KnowledgePoint>;

    /// Store an entry
    fn put(&self, point: KnowledgePoint);

    /// Drop one entry
    fn invalidate(&self, id: i64);

    /// Drop every entry
    fn clear(&self);

    /// Drop several entries
    fn invalidate_many(&self, ids: &[i64]) {
        for id in ids {
            self.invalidate(*id);
        }
    }
}
