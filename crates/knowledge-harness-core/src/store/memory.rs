//! In-memory [`SnapshotStore`] implementation for tests and embedding.
//!
//! The current snapshot is an `Arc` behind `std::sync::RwLock`. Publishing
//! swaps the pointer under a short write lock; readers clone the `Arc` and
//! keep reading their version after the lock is released.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::models::IngestionJob;
use crate::snapshot::KnowledgeSnapshot;

use super::SnapshotStore;

/// In-memory store for tests and single-process deployments.
pub struct InMemoryStore {
    snapshot: RwLock<Option<Arc<KnowledgeSnapshot>>>,
    jobs: RwLock<HashMap<String, IngestionJob>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(None),
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Create a store that already holds `snapshot`.
    pub fn with_snapshot(snapshot: KnowledgeSnapshot) -> Self {
        Self {
            snapshot: RwLock::new(Some(Arc::new(snapshot))),
            jobs: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory store lock poisoned")
}

#[async_trait]
impl SnapshotStore for InMemoryStore {
    async fn load(&self) -> Result<Option<Arc<KnowledgeSnapshot>>> {
        let guard = self.snapshot.read().map_err(poisoned)?;
        Ok(guard.clone())
    }

    async fn replace(&self, snapshot: KnowledgeSnapshot) -> Result<()> {
        let next = Arc::new(snapshot);
        let mut guard = self.snapshot.write().map_err(poisoned)?;
        if let Some(current) = guard.as_ref() {
            if next.metadata.version <= current.metadata.version {
                bail!(
                    "snapshot version {} is not newer than current version {}",
                    next.metadata.version,
                    current.metadata.version
                );
            }
        }
        *guard = Some(next);
        Ok(())
    }

    async fn save_job(&self, job: &IngestionJob) -> Result<()> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;
        jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn get_job(&self, id: &str) -> Result<Option<IngestionJob>> {
        let jobs = self.jobs.read().map_err(poisoned)?;
        Ok(jobs.get(id).cloned())
    }

    async fn list_jobs(&self, limit: usize) -> Result<Vec<IngestionJob>> {
        let jobs = self.jobs.read().map_err(poisoned)?;
        let mut list: Vec<IngestionJob> = jobs.values().cloned().collect();
        list.sort_by(|a, b| b.started_at.cmp(&a.started_at).then_with(|| a.id.cmp(&b.id)));
        list.truncate(limit);
        Ok(list)
    }
}
