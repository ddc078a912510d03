//! Configured source listing with health.

use anyhow::Result;
use serde::Serialize;

use crate::config::Config;
use crate::traits::ConnectorRegistry;

#[derive(Debug, Clone, Serialize)]
pub struct SourceStatus {
    pub name: String,
    pub label: String,
    pub kind: String,
    pub healthy: bool,
    pub notes: Option<String>,
}

pub fn get_sources(config: &Config) -> Vec<SourceStatus> {
    let registry = ConnectorRegistry::from_config(config);
    registry
        .connectors()
        .iter()
        .map(|c| {
            let check = c.check();
            SourceStatus {
                name: c.name().to_string(),
                label: c.source_label(),
                kind: c.kind().as_str().to_string(),
                healthy: check.is_ok(),
                notes: check.err().map(|e| format!("{:#}", e)),
            }
        })
        .collect()
}

pub fn list_sources(config: &Config) -> Result<()> {
    let sources = get_sources(config);
    if sources.is_empty() {
        println!("No sources configured. Add [sources.<name>] entries to the config.");
        return Ok(());
    }

    println!("{:<24} {:<26} {:<8} NOTES", "SOURCE", "KIND", "HEALTHY");
    for s in &sources {
        println!(
            "{:<24} {:<26} {:<8} {}",
            s.label,
            s.kind,
            s.healthy,
            s.notes.as_deref().unwrap_or("")
        );
    }
    Ok(())
}
