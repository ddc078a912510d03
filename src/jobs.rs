//! `kb jobs`: ingestion job history.

use anyhow::Result;

use knowledge_harness_core::models::IngestionJob;
use knowledge_harness_core::store::SnapshotStore;

use crate::config::Config;
use crate::sqlite_store::SqliteStore;
use crate::stats::format_ts_iso;

pub async fn run_jobs(config: &Config, id: Option<&str>, limit: usize) -> Result<()> {
    let store = SqliteStore::open(config).await?;

    let result = match id {
        Some(id) => match store.get_job(id).await? {
            Some(job) => {
                print_job(&job);
                Ok(())
            }
            None => Err(anyhow::anyhow!("job not found: {}", id)),
        },
        None => {
            let jobs = store.list_jobs(limit).await?;
            if jobs.is_empty() {
                println!("No ingestion jobs yet.");
            } else {
                println!(
                    "{:<38} {:<11} {:>8} {:>8} {:>7}   STARTED",
                    "JOB", "STATUS", "RECORDS", "CREATED", "ERRORS"
                );
                for job in &jobs {
                    println!(
                        "{:<38} {:<11} {:>8} {:>8} {:>7}   {}",
                        job.id,
                        job.status.as_str(),
                        job.entities_processed,
                        job.entities_created,
                        job.errors.len(),
                        format_ts_iso(job.started_at.timestamp())
                    );
                }
            }
            Ok(())
        }
    };

    store.close().await;
    result
}

fn print_job(job: &IngestionJob) {
    println!("job {}", job.id);
    println!("  source: {}", job.source);
    println!("  status: {}", job.status.as_str());
    println!("  started: {}", job.started_at.to_rfc3339());
    if let Some(done) = job.completed_at {
        println!("  completed: {}", done.to_rfc3339());
    }
    println!("  records processed: {}", job.entities_processed);
    println!("  entities created: {}", job.entities_created);
    println!("  entities updated: {}", job.entities_updated);
    println!("  entities unchanged: {}", job.entities_unchanged);
    println!("  entities dropped: {}", job.entities_dropped);
    for (key, value) in &job.metadata {
        println!("  {}: {}", key.replace('_', " "), value);
    }
    if !job.errors.is_empty() {
        println!("  errors:");
        for err in &job.errors {
            println!("    ! {}", err);
        }
    }
}

/// Parse a `--limit` value, rejecting zero.
pub fn parse_limit(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) | Err(_) => Err(format!("'{}' is not a positive integer", s)),
        Ok(n) => Ok(n),
    }
}
