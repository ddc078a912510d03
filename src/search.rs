//! `kb search`: ranked search over the current snapshot.
//!
//! Scoring lives in the core crate; this module opens the store, applies
//! the configured ranking table and prints results.

use anyhow::Result;

use knowledge_harness_core::search::{search_store, SearchRequest, SearchResult};

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

/// Run a search against the configured database.
pub async fn search_knowledge(config: &Config, request: &SearchRequest) -> Result<Vec<SearchResult>> {
    let store = SqliteStore::open(config).await?;
    let ranking = config.ranking_table();
    let results = search_store(&store, request, &ranking, config.retrieval.top_k).await;
    store.close().await;
    Ok(results?)
}

pub async fn run_search(config: &Config, request: &SearchRequest) -> Result<()> {
    let results = search_knowledge(config, request).await?;

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        let entity = &result.entity;
        println!(
            "{}. [{:.2}] {} / {}",
            i + 1,
            result.score,
            entity.entity_type,
            entity.title
        );
        println!("    source: {}", entity.metadata.source);
        if !entity.metadata.tags.is_empty() {
            let tags: Vec<&str> = entity.metadata.tags.iter().map(String::as_str).collect();
            println!("    tags: {}", tags.join(", "));
        }
        println!("    summary: \"{}\"", entity.summary.replace('\n', " ").trim());
        if !result.related.is_empty() {
            let related: Vec<String> = result
                .related
                .iter()
                .map(|r| format!("{} ({} {:.2})", r.id, r.relationship_type, r.strength))
                .collect();
            println!("    related: {}", related.join(", "));
        }
        if let Some(explain) = &result.explain {
            println!(
                "    explain: title_phrase={} content_phrase={} title_terms={} content_terms={} source_terms={} category={} keyword={} total={} (ranking v{})",
                explain.title_phrase,
                explain.content_phrase,
                explain.title_terms,
                explain.content_terms,
                explain.source_terms,
                explain.category,
                explain.keyword,
                explain.total(),
                explain.ranking_version
            );
        }
        println!("    id: {}", entity.id);
        println!();
    }

    Ok(())
}
