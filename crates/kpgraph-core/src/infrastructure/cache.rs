//! In-memory knowledge point cache with a fixed time-to-live

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::domain::knowledge::{KnowledgePoint, KnowledgePointCache};

/// Process-local TTL cache
pub struct InMemoryKnowledgePointCache {
    entries: RwLock<HashMap<i64, (Instant, KnowledgePoint)>>,
    ttl: Duration,
}

impl InMemoryKnowledgePointCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Number of stored entries, including expired ones not yet evicted
    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryKnowledgePointCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(600))
    }
}

impl KnowledgePointCache for InMemoryKnowledgePointCache {
    fn get(&self, id: i64) -> Option<KnowledgePoint> {
        let expired = {
            let entries = self.entries.read().ok()?;
            match entries.get(&id) {
                Some((stored_at, point)) if stored_at.elapsed() < self.ttl => {
                    return Some(point.clone());
                }
                Some(_) => true,
                None => false,
            }
        };

        if expired {
            debug!(knowledge_point_id = id, "Cache entry expired");
            self.invalidate(id);
        }
        None
    }

    fn put(&self, point: KnowledgePoint) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(point.id, (Instant::now(), point));
        }
    }

    fn invalidate(&self, id: i64) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(&id);
        }
    }

    fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }
}
