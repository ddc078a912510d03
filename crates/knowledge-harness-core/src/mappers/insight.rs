//! Free-text insight mapper.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use super::{
    clamp_unit, infer_domain_tags, normalize_tag, normalized_set, parse_record, record_id_hint,
    require, summarize, ContentBuilder, MappingContext, MappingError, SUMMARY_MAX_CHARS,
};
use crate::models::{
    AccessLevel, KnowledgeEntity, KnowledgeMetadata, KnowledgeType, VerificationStatus,
};

const KIND: KnowledgeType = KnowledgeType::Insight;

const DEFAULT_CONFIDENCE: f64 = 0.7;

#[derive(Debug, Deserialize)]
struct InsightRecord {
    id: Option<String>,
    title: Option<String>,
    body: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    related_projects: Vec<String>,
    #[serde(default)]
    technologies: Vec<String>,
    #[serde(default)]
    evidence: Vec<String>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    access_level: Option<AccessLevel>,
    #[serde(default)]
    last_validated: Option<DateTime<Utc>>,
}

/// Map an insight record.
///
/// An explicit `confidence` outside `[0, 1]` is rejected rather than
/// clamped, since it signals a data-entry error in the source.
pub fn map_insight(raw: &Value, ctx: &MappingContext) -> Result<KnowledgeEntity, MappingError> {
    let record: InsightRecord = parse_record(KIND, raw)?;
    let hint = record_id_hint(raw);
    let source_id = require(KIND, &hint, "id", record.id.as_deref())?;
    let title = require(KIND, source_id, "title", record.title.as_deref())?;
    let body = require(KIND, source_id, "body", record.body.as_deref())?;

    let confidence = match record.confidence {
        Some(c) if (0.0..=1.0).contains(&c) => c,
        Some(c) => {
            return Err(MappingError::InvalidValue {
                kind: KIND,
                record_id: source_id.to_string(),
                field: "confidence",
                reason: format!("{} is outside [0, 1]", c),
            })
        }
        None => DEFAULT_CONFIDENCE,
    };

    let category = record
        .category
        .as_deref()
        .map(normalize_tag)
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| "technical".to_string());

    let content = ContentBuilder::new()
        .paragraph(title)
        .paragraph(body)
        .list("Evidence", &record.evidence)
        .inline_list("Related projects", &record.related_projects)
        .inline_list("Technologies", &record.technologies)
        .inline_list("Tags", &record.tags)
        .build();

    let mut relevance = 0.5 + 0.05 * record.evidence.len().min(4) as f64;
    if !record.related_projects.is_empty() {
        relevance += 0.1;
    }

    let project_associations = normalized_set(&record.related_projects);
    let technology_stack = normalized_set(&record.technologies);

    let mut metadata = KnowledgeMetadata::new(ctx.source.clone(), category);
    metadata.author = record.author.clone();
    metadata.confidence_score = confidence;
    metadata.relevance_score = clamp_unit(relevance);
    metadata.access_level = record.access_level.unwrap_or_default();
    metadata.tags.insert(KIND.as_str().to_string());
    metadata.tags.extend(normalized_set(&record.tags));
    metadata.tags.extend(infer_domain_tags(source_id));
    for project in &project_associations {
        metadata.tags.extend(infer_domain_tags(project));
    }
    metadata.tags.extend(technology_stack.iter().cloned());
    metadata.project_associations = project_associations;
    metadata.technology_stack = technology_stack;
    metadata.last_validated = record.last_validated;
    metadata.verification_status = if record.evidence.is_empty() {
        VerificationStatus::Unverified
    } else {
        VerificationStatus::Pending
    };

    Ok(KnowledgeEntity::new(
        KIND,
        source_id,
        title.to_string(),
        content,
        summarize(body, SUMMARY_MAX_CHARS),
        metadata,
        ctx.now,
    ))
}
