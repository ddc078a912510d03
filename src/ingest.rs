//! Ingestion pipeline orchestration.
//!
//! One run turns every source batch into a new knowledge snapshot:
//!
//! ```text
//! batches ─▶ map ─▶ embed ─▶ version ─▶ detect ─▶ validate ─▶ replace
//! ```
//!
//! Failures are isolated at the smallest unit that can fail: a bad record
//! is skipped, an entity whose embedding fails is dropped, and only
//! job-level problems (no data, nothing survives, validation, persistence)
//! fail the job. A failed job never touches the current snapshot.
//!
//! Only one run may be in progress per pipeline. A second caller gets
//! [`IngestError::AlreadyRunning`] instead of queueing.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

use knowledge_harness_core::embedding::{EmbeddingError, EmbeddingProvider};
use knowledge_harness_core::mappers::{MapperRegistry, MappingContext, SourceBatch};
use knowledge_harness_core::models::{EntityEmbeddings, IngestionJob, JobStatus, KnowledgeEntity};
use knowledge_harness_core::relationships;
use knowledge_harness_core::snapshot::KnowledgeSnapshot;
use knowledge_harness_core::store::SnapshotStore;

use crate::config::Config;
use crate::embedding::create_provider;
use crate::progress::{IngestProgressEvent, NoProgress, ProgressMode, ProgressReporter};
use crate::sqlite_store::SqliteStore;
use crate::traits::ConnectorRegistry;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("ingestion job {job_id} is already running")]
    AlreadyRunning { job_id: String },

    #[error("snapshot store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

pub struct IngestionPipeline {
    store: Arc<dyn SnapshotStore>,
    mappers: MapperRegistry,
    embedder: Arc<dyn EmbeddingProvider>,
    embed_timeout: Duration,
    progress: Box<dyn ProgressReporter>,
    active: Mutex<Option<String>>,
}

/// Clears the active-run slot when dropped, including on panic.
struct RunGuard<'a> {
    slot: &'a Mutex<Option<String>>,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        *slot = None;
    }
}

impl IngestionPipeline {
    pub fn new(store: Arc<dyn SnapshotStore>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            store,
            mappers: MapperRegistry::with_builtins(),
            embedder,
            embed_timeout: Duration::from_secs(30),
            progress: Box::new(NoProgress),
            active: Mutex::new(None),
        }
    }

    pub fn with_mappers(mut self, mappers: MapperRegistry) -> Self {
        self.mappers = mappers;
        self
    }

    pub fn with_embed_timeout(mut self, timeout: Duration) -> Self {
        self.embed_timeout = timeout;
        self
    }

    pub fn with_progress(mut self, progress: Box<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn store(&self) -> &Arc<dyn SnapshotStore> {
        &self.store
    }

    /// Id of the job currently running, if any.
    pub fn running_job(&self) -> Option<String> {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn acquire(&self, job_id: &str) -> Result<RunGuard<'_>, IngestError> {
        let mut slot = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(running) = slot.as_ref() {
            return Err(IngestError::AlreadyRunning {
                job_id: running.clone(),
            });
        }
        *slot = Some(job_id.to_string());
        Ok(RunGuard { slot: &self.active })
    }

    /// Ingest pre-collected batches.
    ///
    /// Returns the terminal job. Job-level failures come back as `Ok` with
    /// `status == failed`; `Err` means the run was refused or the job record
    /// itself could not be written.
    pub async fn run(&self, batches: Vec<SourceBatch>) -> Result<IngestionJob, IngestError> {
        let now = Utc::now();
        let mut job = IngestionJob::new(batch_label(&batches), now);
        let _guard = self.acquire(&job.id)?;
        self.begin(&mut job).await?;
        self.process(job, batches, BTreeSet::new(), now).await
    }

    /// Scan every registered connector, then ingest what they returned.
    ///
    /// A connector whose scan fails contributes an error and no records;
    /// the entities it produced in earlier runs are carried forward.
    pub async fn run_connectors(
        &self,
        connectors: &ConnectorRegistry,
    ) -> Result<IngestionJob, IngestError> {
        let now = Utc::now();
        let label = if connectors.is_empty() {
            "none".to_string()
        } else {
            connectors
                .connectors()
                .iter()
                .map(|c| c.source_label())
                .collect::<Vec<_>>()
                .join(",")
        };
        let mut job = IngestionJob::new(label, now);
        let _guard = self.acquire(&job.id)?;
        self.begin(&mut job).await?;

        let mut batches = Vec::with_capacity(connectors.len());
        let mut failed_sources = BTreeSet::new();
        for connector in connectors.connectors() {
            let source = connector.source_label();
            self.progress.report(IngestProgressEvent::Scanning {
                source: source.clone(),
            });
            match connector.scan().await {
                Ok(batch) => batches.push(batch),
                Err(e) => {
                    tracing::warn!(source = %source, error = %format!("{:#}", e), "source scan failed");
                    job.errors.push(format!("{}: scan failed: {:#}", source, e));
                    failed_sources.insert(source);
                }
            }
        }

        self.process(job, batches, failed_sources, now).await
    }

    async fn begin(&self, job: &mut IngestionJob) -> Result<(), IngestError> {
        self.store.save_job(job).await?;
        job.start();
        self.store.save_job(job).await?;
        tracing::info!(job_id = %job.id, source = %job.source, "ingestion started");
        Ok(())
    }

    async fn fail(
        &self,
        mut job: IngestionJob,
        reason: String,
    ) -> Result<IngestionJob, IngestError> {
        tracing::warn!(job_id = %job.id, reason = %reason, "ingestion failed");
        job.fail(reason, Utc::now());
        self.store.save_job(&job).await?;
        Ok(job)
    }

    async fn process(
        &self,
        mut job: IngestionJob,
        batches: Vec<SourceBatch>,
        mut incomplete: BTreeSet<String>,
        now: DateTime<Utc>,
    ) -> Result<IngestionJob, IngestError> {
        let total_records: usize = batches.iter().map(|b| b.records.len()).sum();
        job.entities_processed = total_records as u64;
        let kinds: BTreeSet<&str> = batches.iter().map(|b| b.kind.as_str()).collect();
        job.metadata.insert("source_kinds".into(), json!(kinds));
        for batch in batches.iter().filter(|b| !b.is_complete()) {
            for err in &batch.errors {
                job.errors.push(format!("{}: {}", batch.source, err));
            }
            incomplete.insert(batch.source.clone());
        }

        if total_records == 0 {
            return self.fail(job, "no source data available".to_string()).await;
        }

        // Map
        let mut entities: Vec<KnowledgeEntity> = Vec::with_capacity(total_records);
        let mut seen: HashSet<String> = HashSet::with_capacity(total_records);
        for batch in &batches {
            self.progress.report(IngestProgressEvent::Mapping {
                source: batch.source.clone(),
                records: batch.records.len() as u64,
            });
            let ctx = MappingContext::new(batch.source.clone(), now);
            for raw in &batch.records {
                match self.mappers.map(batch.kind, raw, &ctx) {
                    Ok(entity) => {
                        if seen.insert(entity.id.clone()) {
                            entities.push(entity);
                        } else {
                            let msg = format!("{}: duplicate entity id '{}'", batch.source, entity.id);
                            tracing::warn!("{}", msg);
                            job.errors.push(msg);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(source = %batch.source, error = %e, "record skipped");
                        job.errors.push(format!("{}: {}", batch.source, e));
                    }
                }
            }
        }

        // Embed
        let total = entities.len() as u64;
        let mut survivors = Vec::with_capacity(entities.len());
        for (i, mut entity) in entities.into_iter().enumerate() {
            match self.embed_entity(&entity, now).await {
                Ok(embeddings) => {
                    entity.embeddings = Some(embeddings);
                    survivors.push(entity);
                }
                Err(e) => {
                    tracing::warn!(entity_id = %entity.id, error = %e, "embedding failed; entity dropped");
                    job.errors.push(format!("{}: embedding failed: {}", entity.id, e));
                    job.entities_dropped += 1;
                }
            }
            self.progress.report(IngestProgressEvent::Embedding {
                n: i as u64 + 1,
                total,
            });
        }

        if survivors.is_empty() {
            return self
                .fail(job, "no entities survived mapping and embedding".to_string())
                .await;
        }

        // Version against the current snapshot
        let prior = match self.store.load().await {
            Ok(prior) => prior,
            Err(e) => {
                return self
                    .fail(job, format!("failed to load current snapshot: {:#}", e))
                    .await
            }
        };
        apply_versions(&mut job, &mut survivors, prior.as_deref(), now);
        let (carried, removed) = carry_forward(&survivors, prior.as_deref(), &incomplete);
        if !carried.is_empty() {
            tracing::warn!(
                carried = carried.len(),
                sources = ?incomplete,
                "sources were not fully read; keeping their previous entities"
            );
        }
        if removed > 0 {
            tracing::info!(removed, "entities absent from this run were removed");
        }
        job.metadata
            .insert("entities_carried_forward".into(), json!(carried.len()));
        job.metadata.insert("entities_removed".into(), json!(removed));
        survivors.extend(carried);

        // Detect
        let detected = relationships::detect(&survivors, now);
        let edge_count = detected.len();
        let orphaned = relationships::attach(&mut survivors, detected);
        job.metadata
            .insert("relationships_detected".into(), json!(edge_count - orphaned.len()));

        // Persist
        let version = prior.as_ref().map_or(1, |p| p.metadata.version + 1);
        let snapshot = KnowledgeSnapshot::build(survivors, version, job.id.clone(), now);
        self.progress.report(IngestProgressEvent::Persisting {
            entities: snapshot.entities.len() as u64,
            relationships: snapshot.relationship_count() as u64,
        });
        if let Err(e) = snapshot.validate() {
            return self
                .fail(job, format!("snapshot validation failed: {}", e))
                .await;
        }
        if let Err(e) = self.store.replace(snapshot).await {
            return self
                .fail(job, format!("failed to persist snapshot: {:#}", e))
                .await;
        }

        job.metadata.insert("snapshot_version".into(), Value::from(version));
        job.complete(Utc::now());
        self.store.save_job(&job).await?;

        tracing::info!(
            job_id = %job.id,
            version,
            created = job.entities_created,
            updated = job.entities_updated,
            unchanged = job.entities_unchanged,
            dropped = job.entities_dropped,
            errors = job.errors.len(),
            "ingestion completed"
        );
        Ok(job)
    }

    async fn embed_entity(
        &self,
        entity: &KnowledgeEntity,
        now: DateTime<Utc>,
    ) -> Result<EntityEmbeddings, EmbeddingError> {
        let texts = [
            entity.content.clone(),
            entity.summary.clone(),
            entity.title.clone(),
        ];
        let vectors = tokio::time::timeout(self.embed_timeout, self.embedder.embed_many(&texts))
            .await
            .map_err(|_| EmbeddingError::Timeout(self.embed_timeout.as_secs()))??;

        let dims = self.embedder.dims();
        if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
            return Err(EmbeddingError::DimensionMismatch {
                expected: dims,
                actual: bad.len(),
            });
        }

        let mut vectors = vectors.into_iter();
        match (vectors.next(), vectors.next(), vectors.next()) {
            (Some(content), Some(summary), Some(title)) => Ok(EntityEmbeddings {
                content,
                summary,
                title,
                model: self.embedder.model_name().to_string(),
                model_version: self.embedder.model_version().to_string(),
                created_at: now,
            }),
            _ => Err(EmbeddingError::failed(
                self.embedder.model_name(),
                "provider returned fewer than 3 vectors",
            )),
        }
    }
}

/// Carry identity and version forward from the prior snapshot.
///
/// Unchanged entities keep `created_at`, `updated_at` and `version`; changed
/// ones keep `created_at` and get `version + 1`.
fn apply_versions(
    job: &mut IngestionJob,
    entities: &mut [KnowledgeEntity],
    prior: Option<&KnowledgeSnapshot>,
    now: DateTime<Utc>,
) {
    let previous: HashMap<&str, &KnowledgeEntity> = prior
        .map(|p| p.entities.iter().map(|e| (e.id.as_str(), e)).collect())
        .unwrap_or_default();

    for entity in entities.iter_mut() {
        match previous.get(entity.id.as_str()) {
            Some(old) if old.checksum == entity.checksum => {
                entity.created_at = old.created_at;
                entity.updated_at = old.updated_at;
                entity.version = old.version;
                job.entities_unchanged += 1;
            }
            Some(old) => {
                entity.created_at = old.created_at;
                entity.updated_at = now;
                entity.version = old.version + 1;
                job.entities_updated += 1;
            }
            None => job.entities_created += 1,
        }
    }
}

/// Split prior entities missing from this run into those kept (their source
/// was only partly read) and a count of those removed.
///
/// Kept entities lose their edges; detection reruns over the full set.
fn carry_forward(
    current: &[KnowledgeEntity],
    prior: Option<&KnowledgeSnapshot>,
    incomplete: &BTreeSet<String>,
) -> (Vec<KnowledgeEntity>, usize) {
    let Some(prior) = prior else {
        return (Vec::new(), 0);
    };
    let seen: HashSet<&str> = current.iter().map(|e| e.id.as_str()).collect();
    let mut carried = Vec::new();
    let mut removed = 0;
    for entity in prior.entities.iter().filter(|e| !seen.contains(e.id.as_str())) {
        if incomplete.contains(&entity.metadata.source) {
            let mut kept = entity.clone();
            kept.relationships.clear();
            carried.push(kept);
        } else {
            removed += 1;
        }
    }
    (carried, removed)
}

fn batch_label(batches: &[SourceBatch]) -> String {
    let labels: BTreeSet<&str> = batches.iter().map(|b| b.source.as_str()).collect();
    if labels.is_empty() {
        "none".to_string()
    } else {
        labels.into_iter().collect::<Vec<_>>().join(",")
    }
}

/// `kb ingest`: scan every configured source and publish a new snapshot.
pub async fn run_ingest(config: &Config, progress: ProgressMode) -> Result<()> {
    let store = Arc::new(SqliteStore::open(config).await?);
    let embedder = create_provider(&config.embedding)?;
    let connectors = ConnectorRegistry::from_config(config);

    let pipeline = IngestionPipeline::new(store.clone(), embedder)
        .with_embed_timeout(Duration::from_secs(config.embedding.timeout_secs))
        .with_progress(progress.reporter());

    let job = pipeline.run_connectors(&connectors).await?;

    println!("ingest {}", job.id);
    println!("  status: {}", job.status.as_str());
    println!("  records processed: {}", job.entities_processed);
    println!("  entities created: {}", job.entities_created);
    println!("  entities updated: {}", job.entities_updated);
    println!("  entities unchanged: {}", job.entities_unchanged);
    println!("  entities dropped: {}", job.entities_dropped);
    if let Some(removed) = job.metadata.get("entities_removed") {
        println!("  entities removed: {}", removed);
    }
    if let Some(carried) = job.metadata.get("entities_carried_forward") {
        println!("  entities carried forward: {}", carried);
    }
    if let Some(edges) = job.metadata.get("relationships_detected") {
        println!("  relationships: {}", edges);
    }
    if let Some(version) = job.metadata.get("snapshot_version") {
        println!("  snapshot version: {}", version);
    }
    if !job.errors.is_empty() {
        println!("  errors: {}", job.errors.len());
        for err in &job.errors {
            println!("    ! {}", err);
        }
    }

    store.close().await;

    if job.status == JobStatus::Failed {
        anyhow::bail!("ingestion job {} failed", job.id);
    }
    println!("ok");
    Ok(())
}
