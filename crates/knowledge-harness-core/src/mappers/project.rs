//! Project case study mapper.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

use super::{
    clamp_unit, facts_to_map, infer_domain_tags, normalize_tag, normalized_set, parse_record,
    record_id_hint, require, summarize, ContentBuilder, MappingContext, MappingError,
    SUMMARY_MAX_CHARS,
};
use crate::models::{
    AccessLevel, KnowledgeEntity, KnowledgeMetadata, KnowledgeType, VerificationStatus,
};

const KIND: KnowledgeType = KnowledgeType::ProjectCaseStudy;

#[derive(Debug, Deserialize)]
struct ProjectRecord {
    id: Option<String>,
    title: Option<String>,
    #[serde(default)]
    objective: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    tech_stack: Vec<String>,
    #[serde(default)]
    metrics: BTreeMap<String, Value>,
    #[serde(default)]
    business_impact: BTreeMap<String, Value>,
    #[serde(default)]
    features: Vec<String>,
    #[serde(default)]
    challenges: Vec<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    access_level: Option<AccessLevel>,
    #[serde(default)]
    last_validated: Option<DateTime<Utc>>,
}

/// Relevance bonus and confidence implied by a project's delivery status.
fn status_weight(status: &str) -> (f64, f64) {
    match status {
        "production" | "live" => (0.3, 0.95),
        "beta" | "active" => (0.2, 0.85),
        "prototype" | "research" => (0.05, 0.7),
        "archived" => (0.0, 0.6),
        _ => (0.1, 0.75),
    }
}

/// Map a project case study record.
///
/// The project's own id is recorded as a project association so that
/// principles, insights, and testimonials naming the project relate to it.
pub fn map_project(raw: &Value, ctx: &MappingContext) -> Result<KnowledgeEntity, MappingError> {
    let record: ProjectRecord = parse_record(KIND, raw)?;
    let hint = record_id_hint(raw);
    let source_id = require(KIND, &hint, "id", record.id.as_deref())?;
    let title = require(KIND, source_id, "title", record.title.as_deref())?;

    let objective = record.objective.as_deref().unwrap_or("").trim();
    let description = record.description.as_deref().unwrap_or("").trim();
    if objective.is_empty() && description.is_empty() {
        return Err(MappingError::MissingField {
            kind: KIND,
            record_id: source_id.to_string(),
            field: "objective",
        });
    }

    let status = record
        .status
        .as_deref()
        .map(normalize_tag)
        .unwrap_or_else(|| "unknown".to_string());
    let metrics = facts_to_map(&record.metrics);
    let impact = facts_to_map(&record.business_impact);

    let content = ContentBuilder::new()
        .paragraph(title)
        .field("Objective", objective)
        .paragraph(description)
        .field("Status", &status)
        .inline_list("Tech stack", &record.tech_stack)
        .list("Features", &record.features)
        .facts("Metrics", &metrics)
        .facts("Business impact", &impact)
        .list("Challenges", &record.challenges)
        .build();

    let summary_source = if objective.is_empty() {
        description
    } else {
        objective
    };
    let summary = summarize(summary_source, SUMMARY_MAX_CHARS);

    let (status_bonus, confidence) = status_weight(&status);
    let mut relevance = 0.5 + status_bonus;
    if !impact.is_empty() {
        relevance += 0.15;
    }
    if !metrics.is_empty() {
        relevance += 0.05;
    }

    let technology_stack = normalized_set(&record.tech_stack);
    let project_key = normalize_tag(source_id);

    let mut metadata = KnowledgeMetadata::new(ctx.source.clone(), "project");
    metadata.author = record.author.clone();
    metadata.subcategory = Some(status.clone());
    metadata.confidence_score = clamp_unit(confidence);
    metadata.relevance_score = clamp_unit(relevance);
    metadata.access_level = record.access_level.unwrap_or_default();
    metadata.tags.insert(KIND.as_str().to_string());
    metadata.tags.extend(infer_domain_tags(source_id));
    metadata.tags.extend(technology_stack.iter().cloned());
    metadata.tags.extend(metrics.keys().map(|k| normalize_tag(k)));
    metadata.project_associations.insert(project_key);
    metadata.technology_stack = technology_stack;
    metadata.business_impact = if impact.is_empty() { None } else { Some(impact) };
    metadata.last_validated = record.last_validated;
    metadata.verification_status = match (record.last_validated, status.as_str()) {
        (Some(_), _) => VerificationStatus::Verified,
        (None, "production" | "live") => VerificationStatus::Pending,
        _ => VerificationStatus::Unverified,
    };

    Ok(KnowledgeEntity::new(
        KIND,
        source_id,
        title.to_string(),
        content,
        summary,
        metadata,
        ctx.now,
    ))
}
