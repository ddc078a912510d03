//! Export the current knowledge snapshot as JSON.
//!
//! Produces the `{ entities, metadata }` document, the same shape served by
//! `GET /snapshot`. Embedding vectors are included only with
//! `--with-embeddings`, since they dominate the file size.

use anyhow::{bail, Result};
use std::path::Path;

use knowledge_harness_core::snapshot::KnowledgeSnapshot;
use knowledge_harness_core::store::SnapshotStore;

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

/// A copy of `snapshot` without embedding vectors.
pub fn without_embeddings(snapshot: &KnowledgeSnapshot) -> KnowledgeSnapshot {
    let mut copy = snapshot.clone();
    for entity in &mut copy.entities {
        entity.embeddings = None;
    }
    copy
}

/// Export the snapshot as JSON.
///
/// If `output` is `Some`, writes to that file path. Otherwise writes
/// to stdout for piping.
pub async fn run_export(
    config: &Config,
    output: Option<&Path>,
    with_embeddings: bool,
) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let snapshot = store.load().await?;
    store.close().await;

    let Some(snapshot) = snapshot else {
        bail!("no knowledge snapshot is available; run `kb ingest` first");
    };

    let json = if with_embeddings {
        serde_json::to_string_pretty(snapshot.as_ref())?
    } else {
        serde_json::to_string_pretty(&without_embeddings(&snapshot))?
    };

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, &json)?;
            eprintln!(
                "Exported {} entities (snapshot v{}) to {}",
                snapshot.metadata.total_entities,
                snapshot.metadata.version,
                path.display()
            );
        }
        None => {
            println!("{}", json);
        }
    }

    Ok(())
}
