//! Knowledge point graph service
//!
//! The only component that mutates edge lists across nodes. Creates and
//! updates validate their edges inside the same transaction as the write;
//! deletes run the cascading sweep:
//!
//! ```text
//! gate -> begin -> exists? -> scrub prerequisites -> scrub related -> delete -> commit
//! ```
//!
//! Any failure after the existence check rolls the whole transaction back and
//! surfaces as a single `StorageError`.

use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard as StdMutexGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use crate::domain::caller::Caller;
use crate::error::{Error, Result};
use crate::infrastructure::audit::TracingAuditSink;

use super::cache::KnowledgePointCache;
use super::entity::{EdgeKind, KnowledgePoint, NewKnowledgePoint};
use super::event::{AuditSink, KnowledgeEvent};
use super::graph::{IntegrityReport, KnowledgeGraph};
use super::repository::KnowledgePointRepository;

/// What a cascading delete rewrote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionReport {
    pub knowledge_point_id: i64,
    /// Nodes that listed the deleted point as a prerequisite
    pub prerequisite_refs_removed: Vec<i64>,
    /// Nodes that listed the deleted point as related
    pub related_refs_removed: Vec<i64>,
}

impl DeletionReport {
    /// Every node rewritten by the sweep, without repeats
    pub fn touched(&self) -> Vec<i64> {
        let mut touched = self.prerequisite_refs_removed.clone();
        for id in &self.related_refs_removed {
            if !touched.contains(id) {
                touched.push(*id);
            }
        }
        touched
    }
}

/// Knowledge point graph service
pub struct KnowledgePointService<R: KnowledgePointRepository> {
    repository: Arc<R>,
    cache: Option<Arc<dyn KnowledgePointCache>>,
    audit: Arc<dyn AuditSink>,
    /// Serializes edge-list mutations
    write_gate: Option<Mutex<()>>,
    /// Bumped on every invalidation; a cache fill only lands if it is unchanged
    cache_epoch: StdMutex<u64>,
}

impl<R: KnowledgePointRepository> KnowledgePointService<R> {
    /// Create a service with a tracing audit sink and the write gate enabled
    pub fn new(repository: Arc<R>) -> Self {
        Self {
            repository,
            cache: None,
            audit: Arc::new(TracingAuditSink),
            write_gate: Some(Mutex::new(())),
            cache_epoch: StdMutex::new(0),
        }
    }

    /// Use a read-through cache
    pub fn with_cache(mut self, cache: Arc<dyn KnowledgePointCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Send audit events somewhere else
    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Enable or disable the edge write gate
    pub fn with_write_gate(mut self, enabled: bool) -> Self {
        self.write_gate = enabled.then(|| Mutex::new(()));
        self
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    /// Forward an event to the audit sink
    pub fn record_event(&self, event: KnowledgeEvent) {
        self.audit.record(event);
    }

    async fn lock_edges(&self) -> Option<MutexGuard<'_, ()>> {
        match &self.write_gate {
            Some(gate) => Some(gate.lock().await),
            None => None,
        }
    }

    fn epoch(&self) -> StdMutexGuard<'_, u64> {
        self.cache_epoch
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn invalidate(&self, ids: &[i64]) {
        if let Some(cache) = &self.cache {
            let mut epoch = self.epoch();
            *epoch += 1;
            cache.invalidate_many(ids);
        }
    }

    /// Store a row read from the pool unless an invalidation ran since `started`
    fn fill_cache(&self, cache: &dyn KnowledgePointCache, started: u64, point: &KnowledgePoint) {
        let epoch = self.epoch();
        if *epoch == started {
            cache.put(point.clone());
        } else {
            debug!(knowledge_point_id = point.id, "Skipping cache fill after concurrent write");
        }
    }

    // ========== Writes ==========

    /// Create a knowledge point
    ///
    /// Rejects a blank name, a self-reference through `draft_id` and any edge
    /// to a node that does not exist. Nothing is written on rejection.
    pub async fn create_knowledge_point(
        &self,
        caller: &Caller,
        point: NewKnowledgePoint,
    ) -> Result<KnowledgePoint> {
        validate_name(&point.name)?;
        if let Some(draft_id) = point.draft_id {
            reject_self_reference(draft_id, &point.prerequisite_ids, &point.related_ids)?;
        }

        let _gate = self.lock_edges().await;
        let mut tx = self.repository.begin().await?;

        let missing = self
            .repository
            .find_missing_ids(&mut tx, &edge_targets(&point.prerequisite_ids, &point.related_ids))
            .await?;
        if !missing.is_empty() {
            self.repository.rollback(tx).await?;
            return Err(unknown_edges(&missing));
        }

        let stored = self.repository.insert(&mut tx, &point).await?;
        self.repository.commit(tx).await?;

        info!(
            knowledge_point_id = stored.id,
            course_id = stored.course_id,
            caller = %caller,
            "Knowledge point created"
        );
        self.audit.record(KnowledgeEvent::created(
            caller,
            stored.id,
            stored.course_id,
            &stored.name,
        ));
        Ok(stored)
    }

    /// Replace a knowledge point's fields and edges
    ///
    /// Only the edited node is written; no other node's edge lists change.
    pub async fn update_knowledge_point(
        &self,
        caller: &Caller,
        point: KnowledgePoint,
    ) -> Result<KnowledgePoint> {
        validate_name(&point.name)?;
        reject_self_reference(point.id, &point.prerequisite_ids, &point.related_ids)?;

        let _gate = self.lock_edges().await;
        let mut tx = self.repository.begin().await?;

        if self.repository.find_by_id_in(&mut tx, point.id).await?.is_none() {
            self.repository.rollback(tx).await?;
            return Err(Error::KnowledgePointNotFound(point.id));
        }

        let missing = self
            .repository
            .find_missing_ids(&mut tx, &edge_targets(&point.prerequisite_ids, &point.related_ids))
            .await?;
        if !missing.is_empty() {
            self.repository.rollback(tx).await?;
            return Err(unknown_edges(&missing));
        }

        let stored = self.repository.update(&mut tx, &point).await?;
        self.repository.commit(tx).await?;
        self.invalidate(&[stored.id]);

        info!(knowledge_point_id = stored.id, caller = %caller, "Knowledge point updated");
        self.audit.record(KnowledgeEvent::updated(caller, stored.id));
        Ok(stored)
    }

    /// Append edges to a stored knowledge point
    ///
    /// The row is read inside the write transaction, so edits committed by
    /// other callers are kept. Targets already present are skipped.
    pub async fn add_edges(
        &self,
        caller: &Caller,
        id: i64,
        edges: &[(EdgeKind, i64)],
    ) -> Result<KnowledgePoint> {
        let _gate = self.lock_edges().await;
        let mut tx = self.repository.begin().await?;

        let Some(mut point) = self.repository.find_by_id_in(&mut tx, id).await? else {
            self.repository.rollback(tx).await?;
            return Err(Error::KnowledgePointNotFound(id));
        };

        for (kind, target) in edges {
            let list = match kind {
                EdgeKind::Prerequisite => &mut point.prerequisite_ids,
                EdgeKind::Related => &mut point.related_ids,
            };
            if !list.contains(target) {
                list.push(*target);
            }
        }

        if let Err(e) = reject_self_reference(id, &point.prerequisite_ids, &point.related_ids) {
            self.repository.rollback(tx).await?;
            return Err(e);
        }
        let missing = self
            .repository
            .find_missing_ids(&mut tx, &edge_targets(&point.prerequisite_ids, &point.related_ids))
            .await?;
        if !missing.is_empty() {
            self.repository.rollback(tx).await?;
            return Err(unknown_edges(&missing));
        }

        let stored = self.repository.update(&mut tx, &point).await?;
        self.repository.commit(tx).await?;
        self.invalidate(&[stored.id]);

        debug!(knowledge_point_id = id, added = edges.len(), caller = %caller, "Edges appended");
        self.audit.record(KnowledgeEvent::updated(caller, stored.id));
        Ok(stored)
    }

    /// Delete a knowledge point and scrub every reference to it
    pub async fn delete_knowledge_point(&self, caller: &Caller, id: i64) -> Result<DeletionReport> {
        info!(knowledge_point_id = id, caller = %caller, "Deleting knowledge point");

        let _gate = self.lock_edges().await;
        let mut tx = self
            .repository
            .begin()
            .await
            .map_err(|e| cascade_failed(id, e))?;

        match self.repository.find_by_id_in(&mut tx, id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                self.repository.rollback(tx).await?;
                return Err(Error::KnowledgePointNotFound(id));
            }
            Err(e) => return Err(cascade_failed(id, e)),
        }

        let swept = self.sweep_and_delete(&mut tx, id).await;
        let report = match swept {
            Ok(report) => report,
            Err(e) => {
                error!(knowledge_point_id = id, error = %e, "Cascading delete failed, rolling back");
                if let Err(rollback_err) = self.repository.rollback(tx).await {
                    warn!(knowledge_point_id = id, error = %rollback_err, "Explicit rollback failed");
                }
                return Err(cascade_failed(id, e));
            }
        };

        self.repository
            .commit(tx)
            .await
            .map_err(|e| cascade_failed(id, e))?;

        let mut stale = report.touched();
        stale.push(id);
        self.invalidate(&stale);

        info!(
            knowledge_point_id = id,
            prerequisite_refs_removed = report.prerequisite_refs_removed.len(),
            related_refs_removed = report.related_refs_removed.len(),
            "Knowledge point deleted"
        );
        self.audit.record(KnowledgeEvent::deleted(
            caller,
            id,
            report.prerequisite_refs_removed.clone(),
            report.related_refs_removed.clone(),
        ));
        Ok(report)
    }

    async fn sweep_and_delete(&self, tx: &mut R::Tx, id: i64) -> Result<DeletionReport> {
        let prerequisite_refs_removed = self
            .repository
            .remove_from_prerequisite_fields(tx, id)
            .await?;
        let related_refs_removed = self.repository.remove_from_related_fields(tx, id).await?;
        self.repository.delete(tx, id).await?;

        Ok(DeletionReport {
            knowledge_point_id: id,
            prerequisite_refs_removed,
            related_refs_removed,
        })
    }

    // ========== Reads ==========

    /// Get a knowledge point, through the cache when one is configured
    pub async fn get_knowledge_point(&self, id: i64) -> Result<Option<KnowledgePoint>> {
        if let Some(cache) = &self.cache
            && let Some(point) = cache.get(id)
        {
            debug!(knowledge_point_id = id, "Cache hit");
            return Ok(Some(point));
        }

        let started = *self.epoch();
        let point = self.repository.find_by_id(id).await?;
        if let (Some(cache), Some(point)) = (&self.cache, &point) {
            self.fill_cache(cache.as_ref(), started, point);
        }
        Ok(point)
    }

    /// All knowledge points of a course
    pub async fn list_by_course(&self, course_id: i64) -> Result<Vec<KnowledgePoint>> {
        self.repository.find_by_course_id(course_id).await
    }

    /// Every knowledge point
    pub async fn list_all(&self) -> Result<Vec<KnowledgePoint>> {
        self.repository.find_all().await
    }

    /// A course's nodes and their outgoing edges
    pub async fn course_graph(&self, course_id: i64) -> Result<KnowledgeGraph> {
        let nodes = self.repository.find_by_course_id(course_id).await?;
        Ok(KnowledgeGraph::from_points(course_id, nodes))
    }

    /// Scan stored edge lists for dangling targets and self-references
    pub async fn check_integrity(&self, course_id: Option<i64>) -> Result<IntegrityReport> {
        let all = self.repository.find_all().await?;
        let existing: HashSet<i64> = all.iter().map(|p| p.id).collect();

        let report = IntegrityReport::scan(
            all.iter()
                .filter(|p| course_id.is_none_or(|course| p.course_id == course)),
            &existing,
        );

        if report.is_clean() {
            debug!(nodes_checked = report.nodes_checked, "Graph integrity check passed");
        } else {
            warn!(
                dangling = report.dangling.len(),
                self_references = report.self_references.len(),
                "Graph integrity check found broken references"
            );
        }
        Ok(report)
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::ValidationFailed(
            "knowledge point name must not be blank".into(),
        ));
    }
    Ok(())
}

fn reject_self_reference(id: i64, prerequisites: &[i64], related: &[i64]) -> Result<()> {
    if prerequisites.contains(&id) || related.contains(&id) {
        return Err(Error::ValidationFailed(format!(
            "knowledge point {} cannot reference itself",
            id
        )));
    }
    Ok(())
}

fn edge_targets(prerequisites: &[i64], related: &[i64]) -> Vec<i64> {
    prerequisites.iter().chain(related).copied().collect()
}

fn unknown_edges(missing: &[i64]) -> Error {
    Error::ValidationFailed(format!("unknown knowledge point ids referenced: {:?}", missing))
}

fn cascade_failed(id: i64, cause: Error) -> Error {
    Error::StorageError(format!(
        "cascading delete of knowledge point {} rolled back: {}",
        id, cause
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::caller::Role;
    use crate::infrastructure::audit::ChannelAuditSink;
    use crate::infrastructure::cache::InMemoryKnowledgePointCache;
    use crate::infrastructure::knowledge::SqliteKnowledgePointRepository;
    use crate::storage::Database;

    async fn setup() -> (Database, KnowledgePointService<SqliteKnowledgePointRepository>) {
        let db = Database::in_memory().await.unwrap();
        sqlx::query("INSERT INTO courses (name) VALUES ('Geometry')")
            .execute(db.pool())
            .await
            .unwrap();
        let repo = Arc::new(SqliteKnowledgePointRepository::new(db.pool().clone()));
        (db, KnowledgePointService::new(repo))
    }

    fn teacher() -> Caller {
        Caller::new(11, Role::Teacher)
    }

    #[test]
    fn test_deletion_report_touched_is_unique() {
        let report = DeletionReport {
            knowledge_point_id: 1,
            prerequisite_refs_removed: vec![2, 3],
            related_refs_removed: vec![3, 4],
        };
        assert_eq!(report.touched(), vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn test_blank_name_rejected() {
        let (_db, service) = setup().await;
        let err = service
            .create_knowledge_point(&teacher(), NewKnowledgePoint::new("   ", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn test_update_rejects_unknown_edges_and_keeps_row() {
        let (_db, service) = setup().await;
        let point = service
            .create_knowledge_point(&teacher(), NewKnowledgePoint::new("Angles", 1))
            .await
            .unwrap();

        let mut edited = point.clone();
        edited.related_ids = vec![404];
        let err = service
            .update_knowledge_point(&teacher(), edited)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ValidationFailed(_)));

        let stored = service.get_knowledge_point(point.id).await.unwrap().unwrap();
        assert!(stored.related_ids.is_empty());
    }

    #[tokio::test]
    async fn test_update_missing_point_is_not_found() {
        let (_db, service) = setup().await;
        let point = service
            .create_knowledge_point(&teacher(), NewKnowledgePoint::new("Arcs", 1))
            .await
            .unwrap();
        service.delete_knowledge_point(&teacher(), point.id).await.unwrap();

        let err = service
            .update_knowledge_point(&teacher(), point)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::KnowledgePointNotFound(_)));
    }

    #[tokio::test]
    async fn test_cache_is_invalidated_for_swept_nodes() {
        let (db, _) = setup().await;
        let cache = Arc::new(InMemoryKnowledgePointCache::default());
        let repo = Arc::new(SqliteKnowledgePointRepository::new(db.pool().clone()));
        let service = KnowledgePointService::new(repo).with_cache(cache.clone());

        let a = service
            .create_knowledge_point(&teacher(), NewKnowledgePoint::new("Points", 1))
            .await
            .unwrap();
        let b = service
            .create_knowledge_point(
                &teacher(),
                NewKnowledgePoint::new("Lines", 1).with_prerequisites(vec![a.id]),
            )
            .await
            .unwrap();

        // warm the cache with the pre-delete version
        let cached = service.get_knowledge_point(b.id).await.unwrap().unwrap();
        assert_eq!(cached.prerequisite_ids, vec![a.id]);
        assert!(cache.get(b.id).is_some());

        service.delete_knowledge_point(&teacher(), a.id).await.unwrap();

        assert!(cache.get(b.id).is_none());
        let fresh = service.get_knowledge_point(b.id).await.unwrap().unwrap();
        assert!(fresh.prerequisite_ids.is_empty());
        assert!(service.get_knowledge_point(a.id).await.unwrap().is_none());
    }

    /// Holds `find_by_id` for one id after the row was read
    struct PausingRepository {
        inner: SqliteKnowledgePointRepository,
        pause_on: std::sync::atomic::AtomicI64,
        reached: tokio::sync::Notify,
        resume: tokio::sync::Notify,
    }

    #[async_trait::async_trait]
    impl KnowledgePointRepository for PausingRepository {
        type Tx = <SqliteKnowledgePointRepository as KnowledgePointRepository>::Tx;

        async fn begin(&self) -> Result<Self::Tx> {
            self.inner.begin().await
        }
        async fn commit(&self, tx: Self::Tx) -> Result<()> {
            self.inner.commit(tx).await
        }
        async fn rollback(&self, tx: Self::Tx) -> Result<()> {
            self.inner.rollback(tx).await
        }
        async fn insert(&self, tx: &mut Self::Tx, point: &NewKnowledgePoint) -> Result<KnowledgePoint> {
            self.inner.insert(tx, point).await
        }
        async fn update(&self, tx: &mut Self::Tx, point: &KnowledgePoint) -> Result<KnowledgePoint> {
            self.inner.update(tx, point).await
        }
        async fn delete(&self, tx: &mut Self::Tx, id: i64) -> Result<()> {
            self.inner.delete(tx, id).await
        }
        async fn remove_from_prerequisite_fields(&self, tx: &mut Self::Tx, id: i64) -> Result<Vec<i64>> {
            self.inner.remove_from_prerequisite_fields(tx, id).await
        }
        async fn remove_from_related_fields(&self, tx: &mut Self::Tx, id: i64) -> Result<Vec<i64>> {
            self.inner.remove_from_related_fields(tx, id).await
        }
        async fn find_by_id(&self, id: i64) -> Result<Option<KnowledgePoint>> {
            let point = self.inner.find_by_id(id).await?;
            if self.pause_on.load(std::sync::atomic::Ordering::SeqCst) == id {
                self.reached.notify_one();
                self.resume.notified().await;
            }
            Ok(point)
        }
        async fn find_by_id_in(&self, tx: &mut Self::Tx, id: i64) -> Result<Option<KnowledgePoint>> {
            self.inner.find_by_id_in(tx, id).await
        }
        async fn find_by_course_id(&self, course_id: i64) -> Result<Vec<KnowledgePoint>> {
            self.inner.find_by_course_id(course_id).await
        }
        async fn find_all(&self) -> Result<Vec<KnowledgePoint>> {
            self.inner.find_all().await
        }
        async fn find_missing_ids(&self, tx: &mut Self::Tx, ids: &[i64]) -> Result<Vec<i64>> {
            self.inner.find_missing_ids(tx, ids).await
        }
    }

    #[tokio::test]
    async fn test_cache_fill_racing_a_delete_is_discarded() {
        let (db, _) = setup().await;
        let repo = Arc::new(PausingRepository {
            inner: SqliteKnowledgePointRepository::new(db.pool().clone()),
            pause_on: std::sync::atomic::AtomicI64::new(0),
            reached: tokio::sync::Notify::new(),
            resume: tokio::sync::Notify::new(),
        });
        let cache = Arc::new(InMemoryKnowledgePointCache::default());
        let service = Arc::new(KnowledgePointService::new(repo.clone()).with_cache(cache.clone()));

        let a = service
            .create_knowledge_point(&teacher(), NewKnowledgePoint::new("Angles", 1))
            .await
            .unwrap();
        let b = service
            .create_knowledge_point(
                &teacher(),
                NewKnowledgePoint::new("Polygons", 1).with_prerequisites(vec![a.id]),
            )
            .await
            .unwrap();

        repo.pause_on.store(b.id, std::sync::atomic::Ordering::SeqCst);
        let reader = {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.get_knowledge_point(b.id).await })
        };

        // reader holds the pre-delete row while the cascade commits
        repo.reached.notified().await;
        service.delete_knowledge_point(&teacher(), a.id).await.unwrap();
        repo.pause_on.store(0, std::sync::atomic::Ordering::SeqCst);
        repo.resume.notify_one();

        let early = reader.await.unwrap().unwrap().unwrap();
        assert_eq!(early.prerequisite_ids, vec![a.id]);

        assert!(cache.get(b.id).is_none());
        let served = service.get_knowledge_point(b.id).await.unwrap().unwrap();
        assert!(served.prerequisite_ids.is_empty());
    }

    #[tokio::test]
    async fn test_add_edges_keeps_edits_made_since_the_last_read() {
        let (db, _) = setup().await;
        let cache = Arc::new(InMemoryKnowledgePointCache::default());
        let repo = Arc::new(SqliteKnowledgePointRepository::new(db.pool().clone()));
        let service = KnowledgePointService::new(repo).with_cache(cache.clone());

        let a = service
            .create_knowledge_point(&teacher(), NewKnowledgePoint::new("Polygons", 1))
            .await
            .unwrap();
        let b = service
            .create_knowledge_point(&teacher(), NewKnowledgePoint::new("Area", 1))
            .await
            .unwrap();
        // cached copy of B goes stale once another writer edits the row
        service.get_knowledge_point(b.id).await.unwrap();
        sqlx::query("UPDATE knowledge_points SET brief_description = 'Edited elsewhere' WHERE id = ?")
            .bind(b.id)
            .execute(db.pool())
            .await
            .unwrap();

        let linked = service
            .add_edges(
                &teacher(),
                b.id,
                &[(EdgeKind::Prerequisite, a.id), (EdgeKind::Prerequisite, a.id)],
            )
            .await
            .unwrap();
        assert_eq!(linked.prerequisite_ids, vec![a.id]);
        assert_eq!(linked.brief_description, "Edited elsewhere");

        let served = service.get_knowledge_point(b.id).await.unwrap().unwrap();
        assert_eq!(served.brief_description, "Edited elsewhere");
        assert_eq!(served.prerequisite_ids, vec![a.id]);
    }

    #[tokio::test]
    async fn test_add_edges_validates_targets() {
        let (_db, service) = setup().await;
        let point = service
            .create_knowledge_point(&teacher(), NewKnowledgePoint::new("Volume", 1))
            .await
            .unwrap();

        let err = service
            .add_edges(&teacher(), point.id, &[(EdgeKind::Related, point.id)])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ValidationFailed(_)));

        let err = service
            .add_edges(&teacher(), point.id, &[(EdgeKind::Prerequisite, 808)])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ValidationFailed(_)));

        let err = service
            .add_edges(&teacher(), 909, &[(EdgeKind::Related, point.id)])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::KnowledgePointNotFound(909)));

        let stored = service.get_knowledge_point(point.id).await.unwrap().unwrap();
        assert!(stored.prerequisite_ids.is_empty());
        assert!(stored.related_ids.is_empty());
    }

    #[tokio::test]
    async fn test_audit_events_for_mutations() {
        let (db, _) = setup().await;
        let (sink, mut events) = ChannelAuditSink::new();
        let repo = Arc::new(SqliteKnowledgePointRepository::new(db.pool().clone()));
        let service = KnowledgePointService::new(repo).with_audit_sink(Arc::new(sink));

        let point = service
            .create_knowledge_point(&teacher(), NewKnowledgePoint::new("Triangles", 1))
            .await
            .unwrap();
        service.delete_knowledge_point(&teacher(), point.id).await.unwrap();

        let created = events.try_recv().unwrap();
        assert_eq!(created.event_type_name(), "knowledge_point_created");
        assert_eq!(created.caller(), &teacher());
        let deleted = events.try_recv().unwrap();
        assert_eq!(deleted.event_type_name(), "knowledge_point_deleted");
        assert_eq!(deleted.knowledge_point_id(), Some(point.id));
    }

    #[tokio::test]
    async fn test_course_graph_and_integrity() {
        let (db, service) = setup().await;
        let a = service
            .create_knowledge_point(&teacher(), NewKnowledgePoint::new("Circles", 1))
            .await
            .unwrap();
        let b = service
            .create_knowledge_point(
                &teacher(),
                NewKnowledgePoint::new("Tangents", 1).with_prerequisites(vec![a.id]),
            )
            .await
            .unwrap();

        let graph = service.course_graph(1).await.unwrap();
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.learning_order(), Some(vec![a.id, b.id]));
        assert!(service.check_integrity(Some(1)).await.unwrap().is_clean());

        // a row written behind the service's back
        sqlx::query("UPDATE knowledge_points SET related_knowledge_point_ids = '[999]' WHERE id = ?")
            .bind(a.id)
            .execute(db.pool())
            .await
            .unwrap();
        let report = service.check_integrity(None).await.unwrap();
        assert_eq!(report.dangling.len(), 1);
        assert_eq!(report.dangling[0].target, 999);
    }
}
