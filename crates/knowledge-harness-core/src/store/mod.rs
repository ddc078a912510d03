//! Storage abstraction for the knowledge base.
//!
//! The [`SnapshotStore`] trait is the single piece of shared state between
//! the ingestion orchestrator and the search read path. It is injected as
//! an `Arc<dyn SnapshotStore>` so tests can construct isolated stores.
//!
//! Implementations must publish snapshots atomically: a reader that calls
//! [`load`](SnapshotStore::load) while [`replace`](SnapshotStore::replace)
//! is running sees either the previous snapshot or the new one in full.

pub mod memory;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::IngestionJob;
use crate::snapshot::KnowledgeSnapshot;

/// Abstract storage backend for snapshots and ingestion jobs.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`load`](SnapshotStore::load) | Current snapshot, if any |
/// | [`replace`](SnapshotStore::replace) | Atomically publish a new snapshot |
/// | [`save_job`](SnapshotStore::save_job) | Insert or update a job record |
/// | [`get_job`](SnapshotStore::get_job) | Look up a job by id |
/// | [`list_jobs`](SnapshotStore::list_jobs) | Most recent jobs first |
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// The current snapshot, or `None` before the first successful ingestion.
    async fn load(&self) -> Result<Option<Arc<KnowledgeSnapshot>>>;

    /// Replace the whole snapshot.
    ///
    /// Fails without side effects if `snapshot.metadata.version` is not
    /// greater than the current version.
    async fn replace(&self, snapshot: KnowledgeSnapshot) -> Result<()>;

    async fn save_job(&self, job: &IngestionJob) -> Result<()>;

    async fn get_job(&self, id: &str) -> Result<Option<IngestionJob>>;

    /// Up to `limit` jobs ordered by `started_at`, newest first.
    async fn list_jobs(&self, limit: usize) -> Result<Vec<IngestionJob>>;
}
