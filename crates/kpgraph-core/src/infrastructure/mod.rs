//! Infrastructure layer
//!
//! Contains implementations for external systems: SQLite, the LLM API,
//! caching and audit sinks.

pub mod audit;
pub mod cache;
pub mod course;
pub mod knowledge;

use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;

use crate::config::Config;
use crate::domain::knowledge::{EdgeListCodec, KnowledgePointService};

use self::cache::InMemoryKnowledgePointCache;
use self::knowledge::SqliteKnowledgePointRepository;

/// Wire a graph service over SQLite as the configuration describes
pub fn knowledge_point_service(
    pool: SqlitePool,
    config: &Config,
) -> KnowledgePointService<SqliteKnowledgePointRepository> {
    let codec = EdgeListCodec::new(config.graph.edge_list_format());
    let repository = Arc::new(SqliteKnowledgePointRepository::with_codec(pool, codec));

    let service = KnowledgePointService::new(repository)
        .with_write_gate(config.graph.serialize_edge_writes);

    if config.cache.enabled {
        let ttl = Duration::from_secs(config.cache.ttl_secs);
        service.with_cache(Arc::new(InMemoryKnowledgePointCache::new(ttl)))
    } else {
        service
    }
}
