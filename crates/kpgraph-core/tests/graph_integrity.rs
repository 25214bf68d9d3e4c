//! End-to-end graph integrity tests against a real SQLite store

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use kpgraph_core::Error;
use kpgraph_core::domain::caller::{Caller, Role};
use kpgraph_core::domain::knowledge::{
    CandidateNode, CandidateStream, GraphIngestionAdapter, KnowledgeCollaborator, KnowledgePoint,
    KnowledgePointService, NewKnowledgePoint,
};
use kpgraph_core::infrastructure::knowledge::SqliteKnowledgePointRepository;
use kpgraph_core::storage::{Database, DatabaseConfig};

type Service = KnowledgePointService<SqliteKnowledgePointRepository>;

async fn setup() -> (Database, Arc<Service>, i64) {
    let db = Database::in_memory().await.unwrap();
    let course_id: i64 =
        sqlx::query_scalar("INSERT INTO courses (name) VALUES ('Linear Algebra') RETURNING id")
            .fetch_one(db.pool())
            .await
            .unwrap();
    let repo = Arc::new(SqliteKnowledgePointRepository::new(db.pool().clone()));
    (db, Arc::new(KnowledgePointService::new(repo)), course_id)
}

fn teacher() -> Caller {
    Caller::new(3, Role::Teacher)
}

async fn point(service: &Service, id: i64) -> KnowledgePoint {
    service.get_knowledge_point(id).await.unwrap().unwrap()
}

/// A; B needs A; C relates to A; D needs A and B and relates to C
async fn seed_abcd(service: &Service, course_id: i64) -> [i64; 4] {
    let caller = teacher();
    let a = service
        .create_knowledge_point(&caller, NewKnowledgePoint::new("Vectors", course_id))
        .await
        .unwrap()
        .id;
    let b = service
        .create_knowledge_point(
            &caller,
            NewKnowledgePoint::new("Matrices", course_id).with_prerequisites(vec![a]),
        )
        .await
        .unwrap()
        .id;
    let c = service
        .create_knowledge_point(
            &caller,
            NewKnowledgePoint::new("Inner products", course_id).with_related(vec![a]),
        )
        .await
        .unwrap()
        .id;
    let d = service
        .create_knowledge_point(
            &caller,
            NewKnowledgePoint::new("Eigenvalues", course_id)
                .with_prerequisites(vec![a, b])
                .with_related(vec![c]),
        )
        .await
        .unwrap()
        .id;
    [a, b, c, d]
}

#[tokio::test]
async fn cascade_delete_scrubs_every_reference() {
    let (_db, service, course_id) = setup().await;
    let [a, b, c, d] = seed_abcd(&service, course_id).await;

    let report = service.delete_knowledge_point(&teacher(), a).await.unwrap();
    assert_eq!(report.knowledge_point_id, a);
    assert_eq!(report.prerequisite_refs_removed, vec![b, d]);
    assert_eq!(report.related_refs_removed, vec![c]);
    assert_eq!(report.touched(), vec![b, d, c]);

    assert!(service.get_knowledge_point(a).await.unwrap().is_none());

    let b_after = point(&service, b).await;
    assert!(b_after.prerequisite_ids.is_empty());

    let c_after = point(&service, c).await;
    assert!(c_after.related_ids.is_empty());

    // D keeps its surviving edges, including the untouched related edge to C
    let d_after = point(&service, d).await;
    assert_eq!(d_after.prerequisite_ids, vec![b]);
    assert_eq!(d_after.related_ids, vec![c]);

    let report = service.check_integrity(Some(course_id)).await.unwrap();
    assert!(report.is_clean());
    assert_eq!(report.nodes_checked, 3);
}

#[tokio::test]
async fn failed_delete_rolls_back_the_sweep() {
    let (db, service, course_id) = setup().await;
    let [a, b, c, d] = seed_abcd(&service, course_id).await;

    sqlx::raw_sql(
        "CREATE TRIGGER refuse_delete BEFORE DELETE ON knowledge_points \
         BEGIN SELECT RAISE(ABORT, 'boom'); END",
    )
    .execute(db.pool())
    .await
    .unwrap();

    let err = service.delete_knowledge_point(&teacher(), a).await.unwrap_err();
    assert!(err.is_storage(), "unexpected error: {err}");
    assert!(err.to_string().contains("rolled back"));

    assert!(service.get_knowledge_point(a).await.unwrap().is_some());
    assert_eq!(point(&service, b).await.prerequisite_ids, vec![a]);
    assert_eq!(point(&service, c).await.related_ids, vec![a]);
    let d_after = point(&service, d).await;
    assert_eq!(d_after.prerequisite_ids, vec![a, b]);
    assert_eq!(d_after.related_ids, vec![c]);

    sqlx::raw_sql("DROP TRIGGER refuse_delete")
        .execute(db.pool())
        .await
        .unwrap();
    service.delete_knowledge_point(&teacher(), a).await.unwrap();
    assert!(service.check_integrity(None).await.unwrap().is_clean());
}

#[tokio::test]
async fn deleting_unknown_id_changes_nothing() {
    let (_db, service, course_id) = setup().await;
    let ids = seed_abcd(&service, course_id).await;
    let before = service.list_by_course(course_id).await.unwrap();

    let err = service.delete_knowledge_point(&teacher(), 999).await.unwrap_err();
    assert!(matches!(err, Error::KnowledgePointNotFound(999)));

    let after = service.list_by_course(course_id).await.unwrap();
    assert_eq!(after.len(), ids.len());
    for (old, new) in before.iter().zip(&after) {
        assert_eq!(old.prerequisite_ids, new.prerequisite_ids);
        assert_eq!(old.related_ids, new.related_ids);
        assert_eq!(old.updated_at, new.updated_at);
    }
}

#[tokio::test]
async fn self_references_are_rejected() {
    let (_db, service, course_id) = setup().await;
    let caller = teacher();

    let err = service
        .create_knowledge_point(
            &caller,
            NewKnowledgePoint::new("Loops", course_id)
                .with_draft_id(10001)
                .with_prerequisites(vec![10001]),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ValidationFailed(_)));
    assert!(service.list_by_course(course_id).await.unwrap().is_empty());

    let mut loops = service
        .create_knowledge_point(&caller, NewKnowledgePoint::new("Loops", course_id))
        .await
        .unwrap();
    loops.related_ids = vec![loops.id];
    let err = service
        .update_knowledge_point(&caller, loops.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ValidationFailed(_)));
    assert!(point(&service, loops.id).await.related_ids.is_empty());
}

#[tokio::test]
async fn dangling_edges_are_rejected_without_writing() {
    let (_db, service, course_id) = setup().await;
    let caller = teacher();
    let base = service
        .create_knowledge_point(&caller, NewKnowledgePoint::new("Sets", course_id))
        .await
        .unwrap();

    let err = service
        .create_knowledge_point(
            &caller,
            NewKnowledgePoint::new("Functions", course_id)
                .with_prerequisites(vec![base.id])
                .with_related(vec![4242]),
        )
        .await
        .unwrap_err();
    match err {
        Error::ValidationFailed(message) => assert!(message.contains("4242")),
        other => panic!("expected validation failure, got {other:?}"),
    }

    let points = service.list_by_course(course_id).await.unwrap();
    assert_eq!(points.len(), 1);
    assert_eq!(points[0].id, base.id);
}

#[tokio::test]
async fn gated_writes_stay_consistent_under_concurrency() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::new(DatabaseConfig::with_path(dir.path().join("graph.db")))
        .await
        .unwrap();
    let course_id: i64 = sqlx::query_scalar("INSERT INTO courses (name) VALUES ('Logic') RETURNING id")
        .fetch_one(db.pool())
        .await
        .unwrap();
    let repo = Arc::new(SqliteKnowledgePointRepository::new(db.pool().clone()));
    let service = Arc::new(KnowledgePointService::new(repo));
    let caller = teacher();

    let root_id = service
        .create_knowledge_point(&caller, NewKnowledgePoint::new("Propositions", course_id))
        .await
        .unwrap()
        .id;

    let mut handles = Vec::new();
    for i in 0..8 {
        let service = Arc::clone(&service);
        let caller = caller.clone();
        handles.push(tokio::spawn(async move {
            service
                .create_knowledge_point(
                    &caller,
                    NewKnowledgePoint::new(format!("Rule {i}"), course_id)
                        .with_prerequisites(vec![root_id]),
                )
                .await
        }));
    }
    let deleter = {
        let service = Arc::clone(&service);
        let caller = caller.clone();
        tokio::spawn(async move { service.delete_knowledge_point(&caller, root_id).await })
    };

    for handle in handles {
        // A create that lost the race is rejected, never stored dangling
        if let Err(e) = handle.await.unwrap() {
            assert!(matches!(e, Error::ValidationFailed(_)), "unexpected error: {e}");
        }
    }
    deleter.await.unwrap().unwrap();

    let report = service.check_integrity(Some(course_id)).await.unwrap();
    assert!(report.is_clean(), "dangling edges: {:?}", report.dangling);
    db.close().await;
}

/// Collaborator that replays a fixed candidate list
struct ScriptedCollaborator {
    candidates: Vec<CandidateNode>,
}

#[async_trait]
impl KnowledgeCollaborator for ScriptedCollaborator {
    async fn extract_knowledge_points(
        &self,
        _course_text: &str,
        _course_id: i64,
        _existing: &[KnowledgePoint],
    ) -> kpgraph_core::Result<CandidateStream> {
        let items: Vec<kpgraph_core::Result<CandidateNode>> =
            self.candidates.iter().cloned().map(Ok).collect();
        Ok(Box::pin(futures_util::stream::iter(items)))
    }

    async fn recommend(
        &self,
        _student_id: i64,
        performance: &HashMap<i64, f64>,
        _course_id: i64,
    ) -> kpgraph_core::Result<Vec<String>> {
        Ok(vec![format!("Review {} topics", performance.len())])
    }
}

fn adapter(service: Arc<Service>, candidates: Vec<CandidateNode>) -> GraphIngestionAdapter<SqliteKnowledgePointRepository> {
    GraphIngestionAdapter::new(service, Arc::new(ScriptedCollaborator { candidates }))
}

#[tokio::test]
async fn ingestion_keeps_going_past_a_bad_candidate() {
    let (_db, service, course_id) = setup().await;
    let candidates = vec![
        CandidateNode::new("Variables").with_draft_id(10001),
        CandidateNode::new("   ").with_draft_id(10002),
        CandidateNode::new("Expressions")
            .with_draft_id(10003)
            .with_prerequisite_hints(vec![10001]),
    ];

    let summary = adapter(Arc::clone(&service), candidates)
        .ingest_course(&teacher(), course_id, "intro to programming")
        .await
        .unwrap();

    assert_eq!(summary.succeeded.len(), 2);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].position, 1);
    assert_eq!(summary.failed[0].draft_id, Some(10002));
    assert!(!summary.is_complete());

    let names: Vec<_> = summary.succeeded.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["Variables", "Expressions"]);

    let variables = summary.succeeded[0].knowledge_point_id;
    let expressions = point(&service, summary.succeeded[1].knowledge_point_id).await;
    assert_eq!(expressions.prerequisite_ids, vec![variables]);
}

#[tokio::test]
async fn ingestion_links_forward_references_and_drops_unknown_hints() {
    let (_db, service, course_id) = setup().await;
    let candidates = vec![
        CandidateNode::new("Recursion")
            .with_draft_id(10001)
            .with_prerequisite_hints(vec![10002, 10099])
            .with_related_hints(vec![10001]),
        CandidateNode::new("Functions").with_draft_id(10002),
    ];

    let summary = adapter(Arc::clone(&service), candidates)
        .ingest_course(&teacher(), course_id, "functional programming")
        .await
        .unwrap();

    assert!(summary.failed.is_empty());
    assert!(!summary.is_complete());
    let recursion = summary.succeeded[0].knowledge_point_id;
    let functions = summary.succeeded[1].knowledge_point_id;

    let stored = point(&service, recursion).await;
    assert_eq!(stored.prerequisite_ids, vec![functions]);
    assert!(stored.related_ids.is_empty());

    assert_eq!(summary.dropped_edges.len(), 1);
    assert_eq!(summary.dropped_edges[0].hint, 10099);
    assert!(service.check_integrity(Some(course_id)).await.unwrap().is_clean());
}

#[tokio::test]
async fn recommendations_come_from_the_collaborator() {
    let (_db, service, _course_id) = setup().await;
    let scores = HashMap::from([(1, 40.0), (2, 95.0)]);

    let advice = adapter(service, Vec::new())
        .recommend_learning_content(&Caller::new(9, Role::Student), 9, &scores, 1)
        .await
        .unwrap();
    assert_eq!(advice, vec!["Review 2 topics".to_string()]);
}
