//! Client testimonial mapper.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use super::{
    clamp_unit, infer_domain_tags, normalize_tag, parse_record, record_id_hint, require,
    summarize, ContentBuilder, MappingContext, MappingError, SUMMARY_MAX_CHARS,
};
use crate::models::{AccessLevel, KnowledgeEntity, KnowledgeMetadata, KnowledgeType};

const KIND: KnowledgeType = KnowledgeType::Testimonial;

#[derive(Debug, Deserialize)]
struct TestimonialRecord {
    id: Option<String>,
    client_name: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    company: Option<String>,
    quote: Option<String>,
    #[serde(default)]
    project: Option<String>,
    #[serde(default)]
    rating: Option<u8>,
    #[serde(default)]
    outcomes: Vec<String>,
    #[serde(default)]
    access_level: Option<AccessLevel>,
    #[serde(default)]
    last_validated: Option<DateTime<Utc>>,
}

/// Map a client testimonial record. Ratings must be within 1–5.
pub fn map_testimonial(
    raw: &Value,
    ctx: &MappingContext,
) -> Result<KnowledgeEntity, MappingError> {
    let record: TestimonialRecord = parse_record(KIND, raw)?;
    let hint = record_id_hint(raw);
    let source_id = require(KIND, &hint, "id", record.id.as_deref())?;
    let client = require(KIND, source_id, "client_name", record.client_name.as_deref())?;
    let quote = require(KIND, source_id, "quote", record.quote.as_deref())?;

    if let Some(rating) = record.rating {
        if !(1..=5).contains(&rating) {
            return Err(MappingError::InvalidValue {
                kind: KIND,
                record_id: source_id.to_string(),
                field: "rating",
                reason: format!("{} is outside 1-5", rating),
            });
        }
    }

    let role = record.role.as_deref().unwrap_or("").trim();
    let company = record.company.as_deref().unwrap_or("").trim();
    let attribution = match (role.is_empty(), company.is_empty()) {
        (false, false) => format!("{}, {} at {}", client, role, company),
        (false, true) => format!("{}, {}", client, role),
        (true, false) => format!("{}, {}", client, company),
        (true, true) => client.to_string(),
    };
    let title = format!("Testimonial from {}", attribution);
    let project = record
        .project
        .as_deref()
        .map(normalize_tag)
        .filter(|p| !p.is_empty());

    let content = ContentBuilder::new()
        .paragraph(&title)
        .paragraph(&format!("\"{}\"", quote))
        .field("Project", project.as_deref().unwrap_or(""))
        .field(
            "Rating",
            &record.rating.map(|r| format!("{}/5", r)).unwrap_or_default(),
        )
        .list("Outcomes", &record.outcomes)
        .build();

    let mut relevance = 0.6;
    if let Some(rating) = record.rating {
        relevance += 0.3 * f64::from(rating) / 5.0;
    }
    if !record.outcomes.is_empty() {
        relevance += 0.1;
    }

    let mut metadata = KnowledgeMetadata::new(ctx.source.clone(), "testimonial");
    metadata.author = Some(client.to_string());
    metadata.subcategory = if company.is_empty() {
        None
    } else {
        Some(normalize_tag(company))
    };
    metadata.confidence_score = 0.8;
    metadata.relevance_score = clamp_unit(relevance);
    metadata.access_level = record.access_level.unwrap_or_default();
    metadata.tags.insert(KIND.as_str().to_string());
    metadata.tags.extend(infer_domain_tags(source_id));
    if let Some(project) = &project {
        metadata.tags.extend(infer_domain_tags(project));
        metadata.project_associations.insert(project.clone());
    }
    metadata.last_validated = record.last_validated;

    Ok(KnowledgeEntity::new(
        KIND,
        source_id,
        title,
        content,
        summarize(quote, SUMMARY_MAX_CHARS),
        metadata,
        ctx.now,
    ))
}
