//! End-to-end tests for the ingestion pipeline.
//!
//! These run the real orchestrator against an isolated `InMemoryStore`
//! with the hash embedder (or a stub provider where a failure mode is
//! needed) and check job accounting, versioning, and snapshot safety.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use knowledge_harness::config::SourceConfig;
use knowledge_harness::connector_fs::JsonFileConnector;
use knowledge_harness::ingest::{IngestError, IngestionPipeline};
use knowledge_harness::traits::{Connector, ConnectorRegistry};
use knowledge_harness_core::embedding::{EmbeddingError, EmbeddingProvider, HashEmbedder};
use knowledge_harness_core::mappers::{MapperRegistry, MappingContext, MappingError, SourceBatch};
use knowledge_harness_core::models::{
    IngestionJob, JobStatus, KnowledgeEntity, KnowledgeMetadata, KnowledgeRelationship,
    KnowledgeType, RelationshipType,
};
use knowledge_harness_core::search::{search_store, RankingTable, SearchError, SearchRequest};
use knowledge_harness_core::snapshot::{Direction, KnowledgeSnapshot};
use knowledge_harness_core::store::memory::InMemoryStore;
use knowledge_harness_core::store::SnapshotStore;

const DIMS: usize = 32;

// ─── Fixtures ───────────────────────────────────────────────────────

fn airdropops() -> Value {
    json!({
        "id": "airdropops",
        "title": "AirdropOps",
        "objective": "Automate airdrop farming across wallets.",
        "status": "production",
        "tech_stack": ["Rust", "PostgreSQL"],
        "metrics": { "wallets": 1200 },
        "business_impact": { "roi": "3x" }
    })
}

fn galyarderos() -> Value {
    json!({
        "id": "galyarderos",
        "title": "GalyarderOS",
        "objective": "A personal operating system for productivity.",
        "status": "beta",
        "tech_stack": ["TypeScript", "PostgreSQL"]
    })
}

fn event_sourcing() -> Value {
    json!({
        "id": "event-sourcing",
        "name": "Event sourcing",
        "description": "Persist state changes as an append-only log.",
        "examples": ["Wallet ledger"],
        "applies_to": ["airdropops"],
        "technologies": ["PostgreSQL"]
    })
}

fn insight(id: &str, body: &str) -> Value {
    json!({ "id": id, "title": format!("Insight {}", id), "body": body })
}

fn projects() -> SourceBatch {
    SourceBatch::new(
        KnowledgeType::ProjectCaseStudy,
        "json:projects",
        vec![airdropops(), galyarderos()],
    )
}

fn principles() -> SourceBatch {
    SourceBatch::new(
        KnowledgeType::ArchitecturalPrinciple,
        "json:principles",
        vec![event_sourcing()],
    )
}

fn pipeline(store: Arc<dyn SnapshotStore>) -> IngestionPipeline {
    IngestionPipeline::new(store, Arc::new(HashEmbedder::new(DIMS)))
}

async fn current(store: &dyn SnapshotStore) -> Arc<KnowledgeSnapshot> {
    store.load().await.unwrap().expect("snapshot present")
}

// ─── Stub providers and stores ──────────────────────────────────────

/// Sleeps before every call, then embeds like the hash embedder.
struct SlowEmbedder {
    delay: Duration,
    inner: HashEmbedder,
}

#[async_trait]
impl EmbeddingProvider for SlowEmbedder {
    fn model_name(&self) -> &str {
        "slow"
    }
    fn dims(&self) -> usize {
        DIMS
    }
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        tokio::time::sleep(self.delay).await;
        self.inner.embed_many(texts).await
    }
}

/// Fails for any text containing "poison".
struct PoisonEmbedder;

#[async_trait]
impl EmbeddingProvider for PoisonEmbedder {
    fn model_name(&self) -> &str {
        "poison"
    }
    fn dims(&self) -> usize {
        DIMS
    }
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.iter().any(|t| t.contains("poison")) {
            return Err(EmbeddingError::failed("poison", "provider rejected input"));
        }
        HashEmbedder::new(DIMS).embed_many(texts).await
    }
}

/// Returns vectors one element short of what it advertises.
struct ShortEmbedder;

#[async_trait]
impl EmbeddingProvider for ShortEmbedder {
    fn model_name(&self) -> &str {
        "short"
    }
    fn dims(&self) -> usize {
        DIMS
    }
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|_| vec![0.5; DIMS - 1]).collect())
    }
}

/// Delegates to an in-memory store but can be told to refuse `replace`.
struct FlakyStore {
    inner: InMemoryStore,
    fail_replace: AtomicBool,
}

#[async_trait]
impl SnapshotStore for FlakyStore {
    async fn load(&self) -> Result<Option<Arc<KnowledgeSnapshot>>> {
        self.inner.load().await
    }
    async fn replace(&self, snapshot: KnowledgeSnapshot) -> Result<()> {
        if self.fail_replace.load(Ordering::SeqCst) {
            anyhow::bail!("disk full");
        }
        self.inner.replace(snapshot).await
    }
    async fn save_job(&self, job: &IngestionJob) -> Result<()> {
        self.inner.save_job(job).await
    }
    async fn get_job(&self, id: &str) -> Result<Option<IngestionJob>> {
        self.inner.get_job(id).await
    }
    async fn list_jobs(&self, limit: usize) -> Result<Vec<IngestionJob>> {
        self.inner.list_jobs(limit).await
    }
}

/// Maps insights but adds an edge to an entity that never exists.
fn map_with_dangling_edge(
    raw: &Value,
    ctx: &MappingContext,
) -> Result<KnowledgeEntity, MappingError> {
    let mut entity = knowledge_harness_core::mappers::map_insight(raw, ctx)?;
    entity.relationships.push(KnowledgeRelationship {
        target_id: "insight_ghost".to_string(),
        relationship_type: RelationshipType::References,
        strength: 0.5,
        context: None,
        bidirectional: false,
        created_at: ctx.now,
        validated: false,
    });
    Ok(entity)
}

struct StaticConnector {
    name: &'static str,
    records: Option<Vec<Value>>,
}

#[async_trait]
impl Connector for StaticConnector {
    fn name(&self) -> &str {
        self.name
    }
    fn description(&self) -> &str {
        "static test records"
    }
    fn kind(&self) -> KnowledgeType {
        KnowledgeType::Insight
    }
    async fn scan(&self) -> Result<SourceBatch> {
        match &self.records {
            Some(records) => Ok(SourceBatch::new(self.kind(), self.source_label(), records.clone())),
            None => anyhow::bail!("source offline"),
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_first_run_creates_snapshot() {
    let store = Arc::new(InMemoryStore::new());
    let job = pipeline(store.clone())
        .run(vec![projects(), principles()])
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.entities_processed, 3);
    assert_eq!(job.entities_created, 3);
    assert!(job.errors.is_empty());
    assert_eq!(job.metadata["snapshot_version"], 1);

    let snapshot = current(store.as_ref()).await;
    assert_eq!(snapshot.metadata.version, 1);
    assert_eq!(snapshot.metadata.job_id, job.id);
    assert_eq!(snapshot.metadata.total_entities, 3);
    assert_eq!(
        snapshot.metadata.entities_by_type[&KnowledgeType::ProjectCaseStudy],
        2
    );
    for entity in &snapshot.entities {
        let emb = entity.embeddings.as_ref().expect("embedded");
        assert_eq!(emb.content.len(), DIMS);
        assert_eq!(emb.model, "hash-expansion");
    }

    let stored = store.get_job(&job.id).await.unwrap().unwrap();
    assert_eq!(stored, job);
}

#[tokio::test]
async fn test_reingest_is_idempotent() {
    let store = Arc::new(InMemoryStore::new());
    let pipeline = pipeline(store.clone());

    pipeline.run(vec![projects(), principles()]).await.unwrap();
    let first = current(store.as_ref()).await;

    let job = pipeline.run(vec![projects(), principles()]).await.unwrap();
    let second = current(store.as_ref()).await;

    assert_eq!(job.entities_created, 0);
    assert_eq!(job.entities_updated, 0);
    assert_eq!(job.entities_unchanged, 3);
    assert_eq!(second.metadata.version, 2);

    for (a, b) in first.entities.iter().zip(second.entities.iter()) {
        assert_eq!(a.id, b.id);
        assert_eq!(a.checksum, b.checksum);
        assert_eq!(a.version, 1);
        assert_eq!(b.version, 1);
        assert_eq!(a.created_at, b.created_at);
        assert_eq!(a.updated_at, b.updated_at);
        assert_eq!(
            a.embeddings.as_ref().unwrap().content,
            b.embeddings.as_ref().unwrap().content
        );
    }
}

#[tokio::test]
async fn test_changed_record_bumps_version() {
    let store = Arc::new(InMemoryStore::new());
    let pipeline = pipeline(store.clone());
    pipeline.run(vec![projects()]).await.unwrap();
    let before = current(store.as_ref()).await;

    let mut changed = airdropops();
    changed["objective"] = json!("Automate airdrop farming and track ROI per wallet.");
    let batch = SourceBatch::new(
        KnowledgeType::ProjectCaseStudy,
        "json:projects",
        vec![changed, galyarderos()],
    );
    let job = pipeline.run(vec![batch]).await.unwrap();
    assert_eq!(job.entities_updated, 1);
    assert_eq!(job.entities_unchanged, 1);

    let after = current(store.as_ref()).await;
    let old = before.get("project_airdropops").unwrap();
    let new = after.get("project_airdropops").unwrap();
    assert_eq!(new.version, 2);
    assert_ne!(new.checksum, old.checksum);
    assert_eq!(new.created_at, old.created_at);
    assert!(new.updated_at >= old.updated_at);
    assert_eq!(after.get("project_galyarderos").unwrap().version, 1);
}

#[tokio::test]
async fn test_malformed_record_is_isolated() {
    let store = Arc::new(InMemoryStore::new());
    let mut records: Vec<Value> = (0..9)
        .map(|i| insight(&format!("note-{}", i), "Measure before optimizing."))
        .collect();
    records.insert(4, json!({ "id": "broken", "title": "No body here" }));

    let job = pipeline(store.clone())
        .run(vec![SourceBatch::new(KnowledgeType::Insight, "json:notes", records)])
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.entities_processed, 10);
    assert_eq!(job.entities_created, 9);
    assert_eq!(job.errors.len(), 1);
    assert!(job.errors[0].starts_with("json:notes: "));
    assert!(job.errors[0].contains("broken"));
    assert_eq!(current(store.as_ref()).await.entities.len(), 9);
}

#[tokio::test]
async fn test_duplicate_id_in_run_is_record_error() {
    let store = Arc::new(InMemoryStore::new());
    let batch = SourceBatch::new(
        KnowledgeType::Insight,
        "json:notes",
        vec![insight("same", "first"), insight("same", "second")],
    );
    let job = pipeline(store.clone()).run(vec![batch]).await.unwrap();

    assert_eq!(job.entities_created, 1);
    assert_eq!(job.errors.len(), 1);
    assert!(job.errors[0].contains("duplicate entity id 'insight_same'"));
    let snapshot = current(store.as_ref()).await;
    assert!(snapshot.get("insight_same").unwrap().content.contains("first"));
}

#[tokio::test]
async fn test_no_data_fails_and_keeps_prior_snapshot() {
    let store = Arc::new(InMemoryStore::new());
    let pipeline = pipeline(store.clone());
    pipeline.run(vec![projects()]).await.unwrap();

    let job = pipeline.run(vec![]).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.errors, vec!["no source data available"]);
    assert!(job.completed_at.is_some());

    let empty = SourceBatch::new(KnowledgeType::Insight, "json:notes", vec![]);
    let job = pipeline.run(vec![empty]).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);

    let snapshot = current(store.as_ref()).await;
    assert_eq!(snapshot.metadata.version, 1);
    assert_eq!(snapshot.entities.len(), 2);
}

#[tokio::test]
async fn test_all_records_malformed_fails_job() {
    let store = Arc::new(InMemoryStore::new());
    let batch = SourceBatch::new(
        KnowledgeType::Testimonial,
        "json:testimonials",
        vec![json!({ "id": "x" }), json!("not an object")],
    );
    let job = pipeline(store.clone()).run(vec![batch]).await.unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.errors.len(), 3);
    assert!(store.load().await.unwrap().is_none());
}

#[tokio::test]
async fn test_embedding_failure_drops_entity() {
    let store = Arc::new(InMemoryStore::new());
    let batch = SourceBatch::new(
        KnowledgeType::Insight,
        "json:notes",
        vec![
            insight("good", "Cache at the edge."),
            insight("bad", "This one is poison."),
        ],
    );
    let job = IngestionPipeline::new(store.clone(), Arc::new(PoisonEmbedder))
        .run(vec![batch])
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.entities_dropped, 1);
    assert_eq!(job.entities_created, 1);
    assert_eq!(job.errors.len(), 1);
    assert!(job.errors[0].starts_with("insight_bad: embedding failed"));

    let snapshot = current(store.as_ref()).await;
    assert!(snapshot.get("insight_good").is_some());
    assert!(snapshot.get("insight_bad").is_none());
}

#[tokio::test]
async fn test_embedding_timeout_counts_as_failure() {
    let store = Arc::new(InMemoryStore::new());
    let embedder = SlowEmbedder {
        delay: Duration::from_millis(200),
        inner: HashEmbedder::new(DIMS),
    };
    let job = IngestionPipeline::new(store.clone(), Arc::new(embedder))
        .with_embed_timeout(Duration::from_millis(10))
        .run(vec![principles()])
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.entities_dropped, 1);
    assert!(job.errors[0].contains("timed out"));
    assert!(store.load().await.unwrap().is_none());
}

#[tokio::test]
async fn test_persistence_failure_keeps_prior_snapshot() {
    let store = Arc::new(FlakyStore {
        inner: InMemoryStore::new(),
        fail_replace: AtomicBool::new(false),
    });
    let pipeline = pipeline(store.clone());
    pipeline.run(vec![projects()]).await.unwrap();

    store.fail_replace.store(true, Ordering::SeqCst);
    let job = pipeline.run(vec![projects(), principles()]).await.unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.errors.last().unwrap().contains("disk full"));
    let snapshot = current(store.as_ref()).await;
    assert_eq!(snapshot.metadata.version, 1);
    assert_eq!(snapshot.entities.len(), 2);
}

#[tokio::test]
async fn test_dangling_edge_fails_validation() {
    let store = Arc::new(InMemoryStore::new());
    let mut mappers = MapperRegistry::with_builtins();
    mappers.register(KnowledgeType::Insight, map_with_dangling_edge);

    let batch = SourceBatch::new(KnowledgeType::Insight, "json:notes", vec![insight("a", "body")]);
    let job = pipeline(store.clone())
        .with_mappers(mappers)
        .run(vec![batch])
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.errors[0].contains("snapshot validation failed"));
    assert!(job.errors[0].contains("insight_ghost"));
    assert!(store.load().await.unwrap().is_none());
}

#[tokio::test]
async fn test_relationships_resolve_from_both_sides() {
    let store = Arc::new(InMemoryStore::new());
    pipeline(store.clone())
        .run(vec![projects(), principles()])
        .await
        .unwrap();
    let snapshot = current(store.as_ref()).await;

    let project = snapshot.get("project_airdropops").unwrap();
    let edge = project
        .relationships
        .iter()
        .find(|r| r.target_id == "principle_event-sourcing" && r.relationship_type == RelationshipType::AppliesTo)
        .expect("applies_to edge on the earlier entity");
    assert_eq!(edge.strength, 0.7);
    assert!(edge.bidirectional);
    assert!(!edge.validated);

    let principle = snapshot.get("principle_event-sourcing").unwrap();
    assert!(principle
        .relationships
        .iter()
        .all(|r| r.target_id != "project_airdropops"));

    let related = snapshot.related_to("principle_event-sourcing");
    assert!(related.iter().any(|r| r.id == "project_airdropops"
        && r.relationship_type == RelationshipType::AppliesTo
        && r.direction == Direction::Incoming));
    assert_eq!(snapshot.validate(), Ok(()));
}

#[tokio::test]
async fn test_absent_records_are_removed() {
    let store = Arc::new(InMemoryStore::new());
    let pipeline = pipeline(store.clone());
    pipeline.run(vec![projects(), principles()]).await.unwrap();

    let job = pipeline.run(vec![projects()]).await.unwrap();
    assert_eq!(job.metadata["entities_removed"], 1);

    let snapshot = current(store.as_ref()).await;
    assert!(snapshot.get("principle_event-sourcing").is_none());
    assert_eq!(snapshot.validate(), Ok(()));
}

#[tokio::test]
async fn test_concurrent_run_is_refused() {
    let store = Arc::new(InMemoryStore::new());
    let embedder = SlowEmbedder {
        delay: Duration::from_millis(150),
        inner: HashEmbedder::new(DIMS),
    };
    let pipeline = Arc::new(IngestionPipeline::new(store.clone(), Arc::new(embedder)));

    let background = {
        let pipeline = pipeline.clone();
        tokio::spawn(async move { pipeline.run(vec![projects()]).await })
    };

    let mut running = None;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        running = pipeline.running_job();
        if running.is_some() {
            break;
        }
    }
    let running = running.expect("first run started");

    match pipeline.run(vec![principles()]).await {
        Err(IngestError::AlreadyRunning { job_id }) => assert_eq!(job_id, running),
        other => panic!("expected AlreadyRunning, got {:?}", other.map(|j| j.status)),
    }

    let first = background.await.unwrap().unwrap();
    assert_eq!(first.status, JobStatus::Completed);
    assert_eq!(first.id, running);
    assert!(pipeline.running_job().is_none());

    let next = pipeline.run(vec![principles()]).await.unwrap();
    assert_eq!(next.status, JobStatus::Completed);
}

#[tokio::test]
async fn test_readers_never_observe_partial_snapshot() {
    let store = Arc::new(InMemoryStore::new());
    let pipeline = Arc::new(pipeline(store.clone()));
    pipeline.run(vec![projects()]).await.unwrap();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move {
                for _ in 0..200 {
                    let snapshot = store.load().await.unwrap().unwrap();
                    assert_eq!(snapshot.metadata.total_entities, snapshot.entities.len());
                    match snapshot.metadata.version {
                        1 => assert_eq!(snapshot.entities.len(), 2),
                        2 => assert_eq!(snapshot.entities.len(), 3),
                        v => panic!("unexpected version {}", v),
                    }
                    assert_eq!(snapshot.validate(), Ok(()));
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    pipeline.run(vec![projects(), principles()]).await.unwrap();
    for reader in readers {
        reader.await.unwrap();
    }
}

#[tokio::test]
async fn test_connector_scan_failure_is_recorded() {
    let store = Arc::new(InMemoryStore::new());
    let mut connectors = ConnectorRegistry::new();
    connectors.register(Box::new(StaticConnector {
        name: "live",
        records: Some(vec![insight("a", "Ship small changes.")]),
    }));
    connectors.register(Box::new(StaticConnector {
        name: "offline",
        records: None,
    }));

    let job = pipeline(store.clone())
        .run_connectors(&connectors)
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.source, "custom:live,custom:offline");
    assert_eq!(job.entities_created, 1);
    assert_eq!(job.errors, vec!["custom:offline: scan failed: source offline"]);
    let snapshot = current(store.as_ref()).await;
    assert_eq!(snapshot.entities[0].metadata.source, "custom:live");
}

#[tokio::test]
async fn test_search_over_ingested_snapshot() {
    let store = Arc::new(InMemoryStore::new());
    let ranking = RankingTable::builtin();
    let request = SearchRequest {
        query: "airdropops".to_string(),
        ..Default::default()
    };

    let err = search_store(store.as_ref(), &request, &ranking, 8).await.unwrap_err();
    assert!(matches!(err, SearchError::Unavailable));

    pipeline(store.clone())
        .run(vec![projects(), principles()])
        .await
        .unwrap();

    let results = search_store(store.as_ref(), &request, &ranking, 8).await.unwrap();
    assert_eq!(results[0].entity.id, "project_airdropops");
    assert!(results[0].entity.embeddings.is_none());
    assert!(!results[0].related.is_empty());

    let none = SearchRequest {
        query: "zzzz qqqq".to_string(),
        ..Default::default()
    };
    assert!(search_store(store.as_ref(), &none, &ranking, 8).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_snapshot_entities_built_directly_still_validate() {
    let now = Utc::now();
    let entity = KnowledgeEntity::new(
        KnowledgeType::Insight,
        "solo",
        "Solo".to_string(),
        "content".to_string(),
        "summary".to_string(),
        KnowledgeMetadata::new("test", "technical"),
        now,
    );
    let snapshot = KnowledgeSnapshot::build(vec![entity], 1, "job", now);
    let store = InMemoryStore::with_snapshot(snapshot);
    let job = pipeline(Arc::new(store))
        .run(vec![projects()])
        .await
        .unwrap();
    assert_eq!(job.metadata["snapshot_version"], 2);
    assert_eq!(job.metadata["entities_removed"], 1);
}

#[tokio::test]
async fn test_wrong_dimension_vectors_drop_entity() {
    let store = Arc::new(InMemoryStore::new());
    let job = IngestionPipeline::new(store.clone(), Arc::new(ShortEmbedder))
        .run(vec![principles()])
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.entities_dropped, 1);
    assert!(job.errors[0].contains("dimension mismatch"));
    assert!(store.load().await.unwrap().is_none());
}

fn write_note(dir: &std::path::Path, id: &str) {
    let record = json!({ "id": id, "title": format!("Note {}", id), "body": "Keep builds reproducible." });
    std::fs::write(dir.join(format!("{}.json", id)), record.to_string()).unwrap();
}

fn notes_registry(dir: &std::path::Path, extra: Option<StaticConnector>) -> ConnectorRegistry {
    let mut connectors = ConnectorRegistry::new();
    connectors.register(Box::new(JsonFileConnector::new(
        "notes".to_string(),
        SourceConfig {
            kind: KnowledgeType::Insight,
            path: dir.to_path_buf(),
            include_globs: vec!["**/*.json".to_string()],
            exclude_globs: Vec::new(),
        },
    )));
    if let Some(extra) = extra {
        connectors.register(Box::new(extra));
    }
    connectors
}

#[tokio::test]
async fn test_unreadable_file_keeps_rest_of_source() {
    let tmp = tempfile::TempDir::new().unwrap();
    let dir = tmp.path().join("notes");
    std::fs::create_dir_all(&dir).unwrap();
    for i in 0..5 {
        write_note(&dir, &format!("n{}", i));
    }

    let store = Arc::new(InMemoryStore::new());
    let pipeline = pipeline(store.clone());
    let job = pipeline.run_connectors(&notes_registry(&dir, None)).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.entities_created, 5);

    // One new broken file next to the good ones, plus a second healthy source.
    std::fs::write(dir.join("n9.json"), "{ broken").unwrap();
    let other = StaticConnector {
        name: "other",
        records: Some(vec![insight("o1", "Profile before tuning.")]),
    };
    let job = pipeline
        .run_connectors(&notes_registry(&dir, Some(other)))
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.errors.len(), 1);
    assert!(job.errors[0].starts_with("json:notes: "));
    assert!(job.errors[0].contains("n9.json"));
    assert_eq!(job.entities_unchanged, 5);
    assert_eq!(job.entities_created, 1);
    assert_eq!(job.metadata["entities_removed"], 0);

    let snapshot = current(store.as_ref()).await;
    assert_eq!(snapshot.entities.len(), 6);
    for i in 0..5 {
        assert!(snapshot.get(&format!("insight_n{}", i)).is_some());
    }

    // A file that used to be good turns bad: its entity is kept.
    std::fs::write(dir.join("n0.json"), "not json").unwrap();
    let job = pipeline.run_connectors(&notes_registry(&dir, None)).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.errors.len(), 2);
    assert_eq!(job.metadata["entities_carried_forward"], 1);
    let snapshot = current(store.as_ref()).await;
    let kept = snapshot.get("insight_n0").expect("entity from unreadable file kept");
    assert!(kept.embeddings.is_some());
    assert!(snapshot.get("insight_o1").is_none());
    assert_eq!(snapshot.validate(), Ok(()));
}

#[tokio::test]
async fn test_failed_scan_carries_source_forward() {
    let store = Arc::new(InMemoryStore::new());
    let pipeline = pipeline(store.clone());

    let mut first = ConnectorRegistry::new();
    first.register(Box::new(StaticConnector {
        name: "notes",
        records: Some(vec![
            insight("a", "Ship small changes."),
            insight("b", "Ship small changes often."),
        ]),
    }));
    first.register(Box::new(StaticConnector {
        name: "other",
        records: Some(vec![insight("c", "Write the test first.")]),
    }));
    pipeline.run_connectors(&first).await.unwrap();

    let mut second = ConnectorRegistry::new();
    second.register(Box::new(StaticConnector {
        name: "notes",
        records: None,
    }));
    second.register(Box::new(StaticConnector {
        name: "other",
        records: Some(vec![insight("c", "Write the test first.")]),
    }));
    let job = pipeline.run_connectors(&second).await.unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.errors, vec!["custom:notes: scan failed: source offline"]);
    assert_eq!(job.metadata["entities_carried_forward"], 2);
    assert_eq!(job.metadata["entities_removed"], 0);

    let snapshot = current(store.as_ref()).await;
    assert_eq!(snapshot.metadata.version, 2);
    assert!(snapshot.get("insight_a").is_some());
    assert!(snapshot.get("insight_b").is_some());
    assert_eq!(snapshot.validate(), Ok(()));
}
