//! SQLite-backed [`SnapshotStore`] implementation.
//!
//! Each snapshot is written as a new row in `snapshots`; publishing moves
//! the single `snapshot_head` pointer inside the same transaction. Readers
//! resolve head and payload in one query, so they observe either the old
//! version or the new one, never a mix.

use std::sync::{Arc, RwLock};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use knowledge_harness_core::models::IngestionJob;
use knowledge_harness_core::snapshot::KnowledgeSnapshot;
use knowledge_harness_core::store::SnapshotStore;

use crate::config::Config;
use crate::{db, migrate};

/// Number of superseded snapshot versions kept for inspection.
const SNAPSHOT_HISTORY: i64 = 5;

/// SQLite implementation of the [`SnapshotStore`] trait.
///
/// The last loaded snapshot is cached by version so repeated searches do
/// not re-parse the payload.
pub struct SqliteStore {
    pool: SqlitePool,
    cache: RwLock<Option<Arc<KnowledgeSnapshot>>>,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            cache: RwLock::new(None),
        }
    }

    /// Connect to the configured database and ensure the schema exists.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn cached(&self, version: u64) -> Option<Arc<KnowledgeSnapshot>> {
        let guard = self.cache.read().ok()?;
        guard
            .as_ref()
            .filter(|s| s.metadata.version == version)
            .cloned()
    }

    fn remember(&self, snapshot: Arc<KnowledgeSnapshot>) {
        if let Ok(mut guard) = self.cache.write() {
            *guard = Some(snapshot);
        }
    }
}

fn to_i64(value: u64, what: &str) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("{} {} does not fit in SQLite INTEGER", what, value))
}

#[async_trait]
impl SnapshotStore for SqliteStore {
    async fn load(&self) -> Result<Option<Arc<KnowledgeSnapshot>>> {
        let head: Option<i64> =
            sqlx::query_scalar("SELECT version FROM snapshot_head WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?;
        let Some(head) = head else {
            return Ok(None);
        };
        if let Some(hit) = self.cached(head as u64) {
            return Ok(Some(hit));
        }

        let row = sqlx::query(
            r#"
            SELECT s.payload
            FROM snapshot_head h
            JOIN snapshots s ON s.version = h.version
            WHERE h.id = 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let payload: String = row.get("payload");
        let snapshot: KnowledgeSnapshot =
            serde_json::from_str(&payload).context("Failed to decode stored snapshot")?;
        let snapshot = Arc::new(snapshot);
        self.remember(snapshot.clone());
        Ok(Some(snapshot))
    }

    async fn replace(&self, snapshot: KnowledgeSnapshot) -> Result<()> {
        let version = to_i64(snapshot.metadata.version, "snapshot version")?;
        let payload = serde_json::to_string(&snapshot)?;

        let mut tx = self.pool.begin().await?;

        let current: Option<i64> =
            sqlx::query_scalar("SELECT version FROM snapshot_head WHERE id = 1")
                .fetch_optional(&mut *tx)
                .await?;
        if let Some(current) = current {
            if version <= current {
                bail!(
                    "snapshot version {} is not newer than current version {}",
                    version,
                    current
                );
            }
        }

        sqlx::query(
            "INSERT INTO snapshots (version, job_id, created_at, payload) VALUES (?, ?, ?, ?)",
        )
        .bind(version)
        .bind(&snapshot.metadata.job_id)
        .bind(snapshot.metadata.last_updated.timestamp())
        .bind(&payload)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO snapshot_head (id, version) VALUES (1, ?)
            ON CONFLICT(id) DO UPDATE SET version = excluded.version
            "#,
        )
        .bind(version)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM snapshots WHERE version <= ?")
            .bind(version - 1 - SNAPSHOT_HISTORY)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        self.remember(Arc::new(snapshot));
        tracing::debug!(version, "snapshot head moved");
        Ok(())
    }

    async fn save_job(&self, job: &IngestionJob) -> Result<()> {
        let payload = serde_json::to_string(job)?;
        sqlx::query(
            r#"
            INSERT INTO ingestion_jobs (id, status, started_at, completed_at, payload)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                completed_at = excluded.completed_at,
                payload = excluded.payload
            "#,
        )
        .bind(&job.id)
        .bind(job.status.as_str())
        .bind(job.started_at.timestamp_millis())
        .bind(job.completed_at.map(|t| t.timestamp_millis()))
        .bind(&payload)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_job(&self, id: &str) -> Result<Option<IngestionJob>> {
        let payload: Option<String> =
            sqlx::query_scalar("SELECT payload FROM ingestion_jobs WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        payload
            .map(|p| serde_json::from_str(&p).context("Failed to decode stored job"))
            .transpose()
    }

    async fn list_jobs(&self, limit: usize) -> Result<Vec<IngestionJob>> {
        let rows = sqlx::query(
            "SELECT payload FROM ingestion_jobs ORDER BY started_at DESC, id ASC LIMIT ?",
        )
        .bind(to_i64(limit as u64, "limit")?)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let payload: String = row.get("payload");
                serde_json::from_str(&payload).context("Failed to decode stored job")
            })
            .collect()
    }
}
