//! Heuristic relationship detection.
//!
//! Runs once per ingestion over the complete entity set. Every unordered
//! pair `(A, B)` with `A` earlier in insertion order is compared on three
//! independent signals:
//!
//! | Signal | Edge type | Strength |
//! |--------|-----------|----------|
//! | shared `project_associations` | `applies_to` | 0.7 |
//! | shared `technology_stack` | `references` | 0.5 |
//! | two or more shared `tags` | `supports` | 0.4 |
//!
//! Edges are bidirectional and stored only on `A`. Readers resolve the
//! reverse direction with
//! [`KnowledgeSnapshot::related_to`](crate::snapshot::KnowledgeSnapshot::related_to).
//!
//! The comparison is quadratic in the number of entities. Above
//! [`PAIRWISE_SCALING_LIMIT`] pairs a warning is logged; the detector still
//! runs to completion.

use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};

use crate::models::{KnowledgeEntity, KnowledgeRelationship, RelationshipType};

/// Pair count above which detection logs a scaling warning.
pub const PAIRWISE_SCALING_LIMIT: usize = 250_000;

pub const SHARED_PROJECT_STRENGTH: f64 = 0.7;
pub const SHARED_TECHNOLOGY_STRENGTH: f64 = 0.5;
pub const SHARED_TAGS_STRENGTH: f64 = 0.4;

/// Minimum number of shared tags for a `supports` edge.
pub const MIN_SHARED_TAGS: usize = 2;

/// An edge together with the id of the entity that owns it.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedRelationship {
    pub source_id: String,
    pub relationship: KnowledgeRelationship,
}

/// Number of unordered pairs compared for `n` entities.
pub fn pair_count(n: usize) -> usize {
    n.saturating_mul(n.saturating_sub(1)) / 2
}

/// Returns `true` when `n` entities exceed [`PAIRWISE_SCALING_LIMIT`].
pub fn exceeds_scaling_limit(n: usize) -> bool {
    pair_count(n) > PAIRWISE_SCALING_LIMIT
}

/// Detect relationships between every pair of entities.
///
/// Output order is deterministic: pairs in `(i, j)` order, and within a
/// pair projects, then technologies, then tags.
pub fn detect(entities: &[KnowledgeEntity], now: DateTime<Utc>) -> Vec<DetectedRelationship> {
    let n = entities.len();
    if exceeds_scaling_limit(n) {
        tracing::warn!(
            entities = n,
            pairs = pair_count(n),
            limit = PAIRWISE_SCALING_LIMIT,
            "relationship detection is quadratic and exceeds the pairwise scaling limit"
        );
    }

    let mut detected = Vec::new();
    for (i, a) in entities.iter().enumerate() {
        for b in &entities[i + 1..] {
            let edge = |relationship_type, strength, context: String| DetectedRelationship {
                source_id: a.id.clone(),
                relationship: KnowledgeRelationship {
                    target_id: b.id.clone(),
                    relationship_type,
                    strength,
                    context: Some(context),
                    bidirectional: true,
                    created_at: now,
                    validated: false,
                },
            };

            let projects = shared(&a.metadata.project_associations, &b.metadata.project_associations);
            if !projects.is_empty() {
                detected.push(edge(
                    RelationshipType::AppliesTo,
                    SHARED_PROJECT_STRENGTH,
                    format!("shared projects: {}", projects.join(", ")),
                ));
            }

            let technologies = shared(&a.metadata.technology_stack, &b.metadata.technology_stack);
            if !technologies.is_empty() {
                detected.push(edge(
                    RelationshipType::References,
                    SHARED_TECHNOLOGY_STRENGTH,
                    format!("shared technologies: {}", technologies.join(", ")),
                ));
            }

            let tags = shared(&a.metadata.tags, &b.metadata.tags);
            if tags.len() >= MIN_SHARED_TAGS {
                detected.push(edge(
                    RelationshipType::Supports,
                    SHARED_TAGS_STRENGTH,
                    format!("shared tags: {}", tags.join(", ")),
                ));
            }
        }
    }

    tracing::debug!(entities = n, edges = detected.len(), "relationship detection finished");
    detected
}

/// Append detected edges to their owning entities, preserving detection order.
///
/// Edges whose owner is not in `entities` are returned unattached.
pub fn attach(
    entities: &mut [KnowledgeEntity],
    detected: Vec<DetectedRelationship>,
) -> Vec<DetectedRelationship> {
    let index: HashMap<String, usize> = entities
        .iter()
        .enumerate()
        .map(|(i, e)| (e.id.clone(), i))
        .collect();

    let mut orphaned = Vec::new();
    for d in detected {
        match index.get(&d.source_id) {
            Some(&i) => entities[i].relationships.push(d.relationship),
            None => orphaned.push(d),
        }
    }
    orphaned
}

fn shared<'a>(a: &'a BTreeSet<String>, b: &'a BTreeSet<String>) -> Vec<&'a str> {
    a.intersection(b).map(String::as_str).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{KnowledgeMetadata, KnowledgeType};

    fn entity(
        kind: KnowledgeType,
        id: &str,
        projects: &[&str],
        tech: &[&str],
        tags: &[&str],
    ) -> KnowledgeEntity {
        let mut metadata = KnowledgeMetadata::new("test", "project");
        metadata.project_associations = projects.iter().map(|s| s.to_string()).collect();
        metadata.technology_stack = tech.iter().map(|s| s.to_string()).collect();
        metadata.tags = tags.iter().map(|s| s.to_string()).collect();
        KnowledgeEntity::new(
            kind,
            id,
            id.to_string(),
            String::new(),
            String::new(),
            metadata,
            Utc::now(),
        )
    }

    #[test]
    fn test_shared_project_yields_applies_to_on_earlier_entity() {
        let a = entity(KnowledgeType::ProjectCaseStudy, "airdropops", &["airdropops"], &[], &[]);
        let b = entity(
            KnowledgeType::ArchitecturalPrinciple,
            "idempotent-jobs",
            &["airdropops"],
            &[],
            &[],
        );
        let edges = detect(&[a, b], Utc::now());

        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].source_id, "project_airdropops");
        let rel = &edges[0].relationship;
        assert_eq!(rel.target_id, "principle_idempotent-jobs");
        assert_eq!(rel.relationship_type, RelationshipType::AppliesTo);
        assert_eq!(rel.strength, 0.7);
        assert!(rel.bidirectional);
        assert!(!rel.validated);
        assert_eq!(rel.context.as_deref(), Some("shared projects: airdropops"));
    }

    #[test]
    fn test_signals_are_independent() {
        let a = entity(
            KnowledgeType::Insight,
            "a",
            &["p1"],
            &["rust", "sqlite"],
            &["web3", "defi", "automation"],
        );
        let b = entity(
            KnowledgeType::Insight,
            "b",
            &["p1"],
            &["sqlite"],
            &["web3", "defi"],
        );
        let edges = detect(&[a, b], Utc::now());
        let types: Vec<RelationshipType> =
            edges.iter().map(|e| e.relationship.relationship_type).collect();
        assert_eq!(
            types,
            vec![
                RelationshipType::AppliesTo,
                RelationshipType::References,
                RelationshipType::Supports
            ]
        );
        assert_eq!(
            edges[2].relationship.context.as_deref(),
            Some("shared tags: defi, web3")
        );
    }

    #[test]
    fn test_single_shared_tag_is_not_enough() {
        let a = entity(KnowledgeType::Insight, "a", &[], &[], &["web3", "ai"]);
        let b = entity(KnowledgeType::Insight, "b", &[], &[], &["web3", "data"]);
        assert!(detect(&[a, b], Utc::now()).is_empty());
    }

    #[test]
    fn test_attach_places_edges_on_owner() {
        let mut entities = vec![
            entity(KnowledgeType::Insight, "a", &["p"], &[], &[]),
            entity(KnowledgeType::Insight, "b", &["p"], &[], &[]),
            entity(KnowledgeType::Insight, "c", &["p"], &[], &[]),
        ];
        let edges = detect(&entities, Utc::now());
        assert_eq!(edges.len(), 3);

        let orphaned = attach(&mut entities, edges);
        assert!(orphaned.is_empty());
        assert_eq!(entities[0].relationships.len(), 2);
        assert_eq!(entities[1].relationships.len(), 1);
        assert!(entities[2].relationships.is_empty());
        assert_eq!(entities[1].relationships[0].target_id, "insight_c");
    }

    #[test]
    fn test_scaling_limit() {
        assert_eq!(pair_count(0), 0);
        assert_eq!(pair_count(1), 0);
        assert_eq!(pair_count(4), 6);
        assert!(!exceeds_scaling_limit(500));
        assert!(exceeds_scaling_limit(1_000));
    }

    #[test]
    fn test_detection_is_deterministic() {
        let build = || {
            vec![
                entity(KnowledgeType::Insight, "a", &["p", "q"], &["go"], &["x", "y"]),
                entity(KnowledgeType::Insight, "b", &["q", "p"], &["go"], &["y", "x"]),
            ]
        };
        let now = Utc::now();
        assert_eq!(detect(&build(), now), detect(&build(), now));
    }
}
