//! JSON file connector.
//!
//! Reads raw records from a single JSON file or from every JSON file under
//! a directory. A file may hold one record (an object) or many (an array).
//! Directory walks honour the source's include/exclude globs and visit
//! files in path order so record order is stable between runs.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde_json::Value;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use knowledge_harness_core::mappers::SourceBatch;
use knowledge_harness_core::models::KnowledgeType;

use crate::config::SourceConfig;
use crate::traits::Connector;

pub struct JsonFileConnector {
    name: String,
    config: SourceConfig,
}

impl JsonFileConnector {
    pub fn new(name: String, config: SourceConfig) -> Self {
        Self { name, config }
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Files that would be read by [`scan`](Connector::scan), sorted.
    pub fn files(&self) -> Result<Vec<PathBuf>> {
        let root = &self.config.path;
        if !root.exists() {
            bail!("source '{}' path does not exist: {}", self.name, root.display());
        }
        if root.is_file() {
            return Ok(vec![root.clone()]);
        }

        let include_set = build_globset(&self.config.include_globs)?;
        let mut excludes = vec!["**/.git/**".to_string(), "**/node_modules/**".to_string()];
        excludes.extend(self.config.exclude_globs.clone());
        let exclude_set = build_globset(&excludes)?;

        let mut files = Vec::new();
        for entry in WalkDir::new(root) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            let rel_str = relative.to_string_lossy();
            if exclude_set.is_match(rel_str.as_ref()) || !include_set.is_match(rel_str.as_ref()) {
                continue;
            }
            files.push(path.to_path_buf());
        }
        files.sort();
        Ok(files)
    }
}

#[async_trait]
impl Connector for JsonFileConnector {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "JSON records from local files"
    }

    fn kind(&self) -> KnowledgeType {
        self.config.kind
    }

    fn connector_type(&self) -> &str {
        "json"
    }

    fn check(&self) -> Result<()> {
        if !self.config.path.exists() {
            bail!("path does not exist: {}", self.config.path.display());
        }
        Ok(())
    }

    /// A file that cannot be read or parsed is reported on the batch and
    /// skipped; the remaining files are still read.
    async fn scan(&self) -> Result<SourceBatch> {
        let mut records = Vec::new();
        let mut errors = Vec::new();
        for file in self.files()? {
            match read_records(&file).await {
                Ok(Value::Array(items)) => records.extend(items),
                Ok(other) => records.push(other),
                Err(e) => {
                    tracing::warn!(file = %file.display(), error = %format!("{:#}", e), "file skipped");
                    errors.push(format!("{:#}", e));
                }
            }
        }
        tracing::debug!(
            source = %self.source_label(),
            records = records.len(),
            skipped_files = errors.len(),
            "scanned json source"
        );
        Ok(SourceBatch::new(self.kind(), self.source_label(), records).with_errors(errors))
    }
}

async fn read_records(file: &Path) -> Result<Value> {
    let content = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse JSON in {}", file.display()))
}

pub fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
