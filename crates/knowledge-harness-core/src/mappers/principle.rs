//! Architectural principle mapper.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use super::{
    clamp_unit, infer_domain_tags, normalize_tag, normalized_set, parse_record, record_id_hint,
    require, summarize, ContentBuilder, MappingContext, MappingError, SUMMARY_MAX_CHARS,
};
use crate::models::{AccessLevel, KnowledgeEntity, KnowledgeMetadata, KnowledgeType};

const KIND: KnowledgeType = KnowledgeType::ArchitecturalPrinciple;

#[derive(Debug, Deserialize)]
struct PrincipleRecord {
    id: Option<String>,
    name: Option<String>,
    description: Option<String>,
    #[serde(default)]
    rationale: Option<String>,
    #[serde(default)]
    examples: Vec<String>,
    #[serde(default)]
    applies_to: Vec<String>,
    #[serde(default)]
    technologies: Vec<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    access_level: Option<AccessLevel>,
    #[serde(default)]
    last_validated: Option<DateTime<Utc>>,
}

/// Map an architectural principle record.
///
/// Principles land in the `architecture` category; the record's own
/// category (e.g. `scalability`) becomes the subcategory. `applies_to`
/// project ids become project associations.
pub fn map_principle(raw: &Value, ctx: &MappingContext) -> Result<KnowledgeEntity, MappingError> {
    let record: PrincipleRecord = parse_record(KIND, raw)?;
    let hint = record_id_hint(raw);
    let source_id = require(KIND, &hint, "id", record.id.as_deref())?;
    let name = require(KIND, source_id, "name", record.name.as_deref())?;
    let description = require(KIND, source_id, "description", record.description.as_deref())?;
    let rationale = record.rationale.as_deref().unwrap_or("").trim();

    let subcategory = record
        .category
        .as_deref()
        .map(normalize_tag)
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| "principle".to_string());

    let content = ContentBuilder::new()
        .paragraph(name)
        .paragraph(description)
        .field("Rationale", rationale)
        .field("Category", &subcategory)
        .list("Examples", &record.examples)
        .inline_list("Applies to", &record.applies_to)
        .inline_list("Technologies", &record.technologies)
        .build();

    let mut relevance: f64 = 0.6;
    if !record.examples.is_empty() {
        relevance += 0.1;
    }
    if !record.applies_to.is_empty() {
        relevance += 0.1;
    }
    if !rationale.is_empty() {
        relevance += 0.05;
    }

    let project_associations = normalized_set(&record.applies_to);
    let technology_stack = normalized_set(&record.technologies);

    let mut metadata = KnowledgeMetadata::new(ctx.source.clone(), "architecture");
    metadata.author = record.author.clone();
    metadata.subcategory = Some(subcategory.clone());
    metadata.confidence_score = 0.9;
    metadata.relevance_score = clamp_unit(relevance);
    metadata.access_level = record.access_level.unwrap_or_default();
    metadata.tags.insert(KIND.as_str().to_string());
    metadata.tags.insert(subcategory);
    metadata.tags.extend(infer_domain_tags(source_id));
    for project in &project_associations {
        metadata.tags.extend(infer_domain_tags(project));
    }
    metadata.tags.extend(technology_stack.iter().cloned());
    metadata.project_associations = project_associations;
    metadata.technology_stack = technology_stack;
    metadata.last_validated = record.last_validated;

    Ok(KnowledgeEntity::new(
        KIND,
        source_id,
        name.to_string(),
        content,
        summarize(description, SUMMARY_MAX_CHARS),
        metadata,
        ctx.now,
    ))
}
