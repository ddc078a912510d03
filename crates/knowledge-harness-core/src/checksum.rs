//! Content checksums for idempotent re-ingestion.
//!
//! The checksum covers the entity kind, title, content, summary, and every
//! metadata field. Timestamps owned by the pipeline (`created_at`,
//! `updated_at`), embeddings, relationships, and the version number are
//! excluded, so mapping the same source record twice always yields the
//! same digest.

use sha2::{Digest, Sha256};

use crate::models::{KnowledgeMetadata, KnowledgeType};

/// Compute the SHA-256 hex checksum of an entity's normalized fields.
///
/// Every field is written with a label and a length prefix so that moving
/// text between adjacent fields changes the digest.
pub fn entity_checksum(
    entity_type: KnowledgeType,
    title: &str,
    content: &str,
    summary: &str,
    metadata: &KnowledgeMetadata,
) -> String {
    let mut hasher = Sha256::new();
    feed(&mut hasher, "type", entity_type.as_str());
    feed(&mut hasher, "title", title);
    feed(&mut hasher, "content", content);
    feed(&mut hasher, "summary", summary);

    feed(&mut hasher, "source", &metadata.source);
    feed(&mut hasher, "author", metadata.author.as_deref().unwrap_or(""));
    feed_set(&mut hasher, "tags", metadata.tags.iter());
    feed(&mut hasher, "category", &metadata.category);
    feed(
        &mut hasher,
        "subcategory",
        metadata.subcategory.as_deref().unwrap_or(""),
    );
    hasher.update(metadata.confidence_score.to_bits().to_le_bytes());
    hasher.update(metadata.relevance_score.to_bits().to_le_bytes());
    feed(&mut hasher, "access_level", metadata.access_level.as_str());
    feed_set(
        &mut hasher,
        "project_associations",
        metadata.project_associations.iter(),
    );
    feed_set(
        &mut hasher,
        "technology_stack",
        metadata.technology_stack.iter(),
    );
    match &metadata.business_impact {
        Some(impact) => {
            hasher.update((impact.len() as u64).to_le_bytes());
            for (key, value) in impact {
                feed(&mut hasher, key, value);
            }
        }
        None => hasher.update(u64::MAX.to_le_bytes()),
    }
    feed(
        &mut hasher,
        "verification_status",
        metadata.verification_status.as_str(),
    );
    let validated = metadata
        .last_validated
        .map(|ts| ts.timestamp())
        .unwrap_or(i64::MIN);
    hasher.update(validated.to_le_bytes());

    format!("{:x}", hasher.finalize())
}

fn feed(hasher: &mut Sha256, label: &str, value: &str) {
    hasher.update(label.as_bytes());
    hasher.update((value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}

fn feed_set<'a>(hasher: &mut Sha256, label: &str, values: impl ExactSizeIterator<Item = &'a String>) {
    hasher.update(label.as_bytes());
    hasher.update((values.len() as u64).to_le_bytes());
    for value in values {
        hasher.update((value.len() as u64).to_le_bytes());
        hasher.update(value.as_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn metadata() -> KnowledgeMetadata {
        let mut m = KnowledgeMetadata::new("json:projects", "project");
        m.tags.insert("web3".to_string());
        m.tags.insert("defi".to_string());
        m.technology_stack.insert("rust".to_string());
        m
    }

    #[test]
    fn test_checksum_is_deterministic() {
        let a = entity_checksum(KnowledgeType::ProjectCaseStudy, "T", "C", "S", &metadata());
        let b = entity_checksum(KnowledgeType::ProjectCaseStudy, "T", "C", "S", &metadata());
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_checksum_sensitive_to_content_and_metadata() {
        let base = entity_checksum(KnowledgeType::ProjectCaseStudy, "T", "C", "S", &metadata());
        let content = entity_checksum(KnowledgeType::ProjectCaseStudy, "T", "C2", "S", &metadata());
        assert_ne!(base, content);

        let mut m = metadata();
        m.business_impact = Some(BTreeMap::from([(
            "revenue".to_string(),
            "+20%".to_string(),
        )]));
        let impact = entity_checksum(KnowledgeType::ProjectCaseStudy, "T", "C", "S", &m);
        assert_ne!(base, impact);

        let mut m = metadata();
        m.relevance_score = 0.9;
        let relevance = entity_checksum(KnowledgeType::ProjectCaseStudy, "T", "C", "S", &m);
        assert_ne!(base, relevance);
    }

    #[test]
    fn test_checksum_field_boundaries() {
        let a = entity_checksum(KnowledgeType::Insight, "ab", "c", "S", &metadata());
        let b = entity_checksum(KnowledgeType::Insight, "a", "bc", "S", &metadata());
        assert_ne!(a, b);
    }

    #[test]
    fn test_checksum_independent_of_tag_insertion_order() {
        let mut m1 = KnowledgeMetadata::new("s", "c");
        m1.tags.insert("b".to_string());
        m1.tags.insert("a".to_string());
        let mut m2 = KnowledgeMetadata::new("s", "c");
        m2.tags.insert("a".to_string());
        m2.tags.insert("b".to_string());
        assert_eq!(
            entity_checksum(KnowledgeType::Insight, "T", "C", "S", &m1),
            entity_checksum(KnowledgeType::Insight, "T", "C", "S", &m2)
        );
    }
}
