//! Entity retrieval by id.
//!
//! Used by the `kb get` CLI command and `GET /entities/{id}`.

use anyhow::{bail, Result};
use serde::Serialize;

use knowledge_harness_core::models::KnowledgeEntity;
use knowledge_harness_core::snapshot::{KnowledgeSnapshot, RelatedEntity};
use knowledge_harness_core::store::SnapshotStore;

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

/// An entity plus its resolved neighbours.
#[derive(Debug, Clone, Serialize)]
pub struct EntityResponse {
    pub entity: KnowledgeEntity,
    pub related: Vec<RelatedEntity>,
    pub snapshot_version: u64,
}

/// Look an entity up in a snapshot. Embedding vectors are omitted.
pub fn entity_response(snapshot: &KnowledgeSnapshot, id: &str) -> Option<EntityResponse> {
    let mut entity = snapshot.get(id)?.clone();
    entity.embeddings = None;
    Some(EntityResponse {
        related: snapshot.related_to(id),
        entity,
        snapshot_version: snapshot.metadata.version,
    })
}

pub async fn get_entity(config: &Config, id: &str) -> Result<EntityResponse> {
    let store = SqliteStore::open(config).await?;
    let snapshot = store.load().await?;
    store.close().await;

    let Some(snapshot) = snapshot else {
        bail!("no knowledge snapshot is available; run `kb ingest` first");
    };
    match entity_response(&snapshot, id) {
        Some(resp) => Ok(resp),
        None => bail!("entity not found: {}", id),
    }
}

pub async fn run_get(config: &Config, id: &str) -> Result<()> {
    let resp = get_entity(config, id).await?;
    let e = &resp.entity;
    let m = &e.metadata;

    println!("--- Entity ---");
    println!("id:           {}", e.id);
    println!("type:         {}", e.entity_type);
    println!("title:        {}", e.title);
    println!("source:       {}", m.source);
    if let Some(author) = &m.author {
        println!("author:       {}", author);
    }
    println!("category:     {}", m.category);
    if let Some(sub) = &m.subcategory {
        println!("subcategory:  {}", sub);
    }
    println!("tags:         {}", join(&m.tags));
    if !m.technology_stack.is_empty() {
        println!("technologies: {}", join(&m.technology_stack));
    }
    if !m.project_associations.is_empty() {
        println!("projects:     {}", join(&m.project_associations));
    }
    println!("relevance:    {:.2}", m.relevance_score);
    println!("confidence:   {:.2}", m.confidence_score);
    println!("access:       {}", m.access_level.as_str());
    println!("verification: {}", m.verification_status.as_str());
    println!("version:      {}", e.version);
    println!("created_at:   {}", e.created_at.to_rfc3339());
    println!("updated_at:   {}", e.updated_at.to_rfc3339());
    println!("checksum:     {}", e.checksum);
    println!();

    println!("--- Summary ---");
    println!("{}", e.summary);
    println!();

    println!("--- Content ---");
    println!("{}", e.content);
    println!();

    println!("--- Related ({}) ---", resp.related.len());
    for r in &resp.related {
        println!(
            "{} [{} {:.2}] {}",
            r.id, r.relationship_type, r.strength, r.title
        );
    }

    Ok(())
}

fn join(set: &std::collections::BTreeSet<String>) -> String {
    set.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}
