//! Knowledge base statistics.
//!
//! Used by `kb stats` to show what the current snapshot holds: entity
//! counts per type, relationship counts, and when it was last rebuilt.

use anyhow::Result;
use std::collections::BTreeMap;

use knowledge_harness_core::snapshot::KnowledgeSnapshot;
use knowledge_harness_core::store::SnapshotStore;

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

/// Relationship counts keyed by relationship type name.
pub fn relationship_counts(snapshot: &KnowledgeSnapshot) -> BTreeMap<&'static str, usize> {
    let mut counts = BTreeMap::new();
    for rel in snapshot.entities.iter().flat_map(|e| &e.relationships) {
        *counts.entry(rel.relationship_type.as_str()).or_insert(0) += 1;
    }
    counts
}

pub async fn run_stats(config: &Config) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let snapshot = store.load().await?;
    let last_job = store.list_jobs(1).await?.into_iter().next();
    store.close().await;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Knowledge Harness — Stats");
    println!("=========================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();

    let Some(snapshot) = snapshot else {
        println!("  No snapshot yet. Run `kb ingest`.");
        println!();
        return Ok(());
    };

    let meta = &snapshot.metadata;
    println!("  Snapshot:    v{} (job {})", meta.version, meta.job_id);
    println!(
        "  Updated:     {}",
        format_ts_relative(meta.last_updated.timestamp())
    );
    println!("  Entities:    {}", meta.total_entities);
    println!("  Relations:   {}", snapshot.relationship_count());

    if !meta.entities_by_type.is_empty() {
        println!();
        println!("  By type:");
        for (kind, count) in &meta.entities_by_type {
            println!("    {:<26} {:>6}", kind.as_str(), count);
        }
    }

    let rel_counts = relationship_counts(&snapshot);
    if !rel_counts.is_empty() {
        println!();
        println!("  By relationship:");
        for (kind, count) in &rel_counts {
            println!("    {:<26} {:>6}", kind, count);
        }
    }

    if let Some(job) = last_job {
        println!();
        println!(
            "  Last job:    {} {} ({} errors, started {})",
            job.id,
            job.status.as_str(),
            job.errors.len(),
            format_ts_iso(job.started_at.timestamp())
        );
    }

    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
pub fn format_ts_relative(ts: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

pub fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
