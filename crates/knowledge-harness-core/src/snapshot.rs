//! The persisted knowledge base: a versioned, validated set of entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

use crate::models::{KnowledgeEntity, KnowledgeType, RelationshipType};

/// Invariant violations that prevent a snapshot from being persisted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("duplicate entity id '{0}'")]
    DuplicateId(String),

    #[error("relationship from '{source_id}' targets unknown entity '{target_id}'")]
    DanglingRelationship { source_id: String, target_id: String },

    #[error("entity '{entity_id}' has {field} {value} outside [0, 1]")]
    ScoreOutOfRange {
        entity_id: String,
        field: &'static str,
        value: f64,
    },

    #[error("metadata total_entities is {declared} but snapshot holds {actual}")]
    CountMismatch { declared: usize, actual: usize },
}

/// Snapshot-level bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub total_entities: usize,
    pub entities_by_type: BTreeMap<KnowledgeType, usize>,
    pub last_updated: DateTime<Utc>,
    /// Monotonic, incremented by one per successful persist.
    pub version: u64,
    /// Ingestion job that produced this snapshot.
    pub job_id: String,
}

/// The whole knowledge base as produced by one ingestion run.
///
/// Snapshots are immutable once built. Stores publish them by atomic
/// replacement, so readers always see a single consistent version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeSnapshot {
    pub entities: Vec<KnowledgeEntity>,
    pub metadata: SnapshotMetadata,
}

/// Which side of an edge a related entity sits on, relative to the queried entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// The edge is stored on the queried entity.
    Outgoing,
    /// The edge is stored on the other entity and is bidirectional.
    Incoming,
}

/// A neighbour of an entity, resolved through either edge direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedEntity {
    pub id: String,
    pub title: String,
    pub relationship_type: RelationshipType,
    pub strength: f64,
    pub direction: Direction,
}

impl KnowledgeSnapshot {
    /// Build a snapshot from the run's entities, computing the metadata.
    pub fn build(
        entities: Vec<KnowledgeEntity>,
        version: u64,
        job_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut entities_by_type = BTreeMap::new();
        for e in &entities {
            *entities_by_type.entry(e.entity_type).or_insert(0) += 1;
        }
        Self {
            metadata: SnapshotMetadata {
                total_entities: entities.len(),
                entities_by_type,
                last_updated: now,
                version,
                job_id: job_id.into(),
            },
            entities,
        }
    }

    /// Check every invariant a persisted snapshot must hold.
    ///
    /// Returns the first violation found; dangling edges are never dropped.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.metadata.total_entities != self.entities.len() {
            return Err(ValidationError::CountMismatch {
                declared: self.metadata.total_entities,
                actual: self.entities.len(),
            });
        }

        let mut ids = HashSet::with_capacity(self.entities.len());
        for e in &self.entities {
            if !ids.insert(e.id.as_str()) {
                return Err(ValidationError::DuplicateId(e.id.clone()));
            }
        }

        for e in &self.entities {
            check_unit(&e.id, "confidence_score", e.metadata.confidence_score)?;
            check_unit(&e.id, "relevance_score", e.metadata.relevance_score)?;
            for rel in &e.relationships {
                if !ids.contains(rel.target_id.as_str()) {
                    return Err(ValidationError::DanglingRelationship {
                        source_id: e.id.clone(),
                        target_id: rel.target_id.clone(),
                    });
                }
                check_unit(&e.id, "relationship strength", rel.strength)?;
            }
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&KnowledgeEntity> {
        self.entities.iter().find(|e| e.id == id)
    }

    /// Total number of relationship edges stored in the snapshot.
    pub fn relationship_count(&self) -> usize {
        self.entities.iter().map(|e| e.relationships.len()).sum()
    }

    /// Entities related to `id`: its own edges first, then bidirectional
    /// edges stored on other entities that target it.
    pub fn related_to(&self, id: &str) -> Vec<RelatedEntity> {
        let title_of = |target: &str| {
            self.get(target)
                .map(|e| e.title.clone())
                .unwrap_or_default()
        };

        let mut related = Vec::new();
        if let Some(entity) = self.get(id) {
            for rel in &entity.relationships {
                related.push(RelatedEntity {
                    id: rel.target_id.clone(),
                    title: title_of(&rel.target_id),
                    relationship_type: rel.relationship_type,
                    strength: rel.strength,
                    direction: Direction::Outgoing,
                });
            }
        }
        for other in self.entities.iter().filter(|e| e.id != id) {
            for rel in other
                .relationships
                .iter()
                .filter(|r| r.bidirectional && r.target_id == id)
            {
                related.push(RelatedEntity {
                    id: other.id.clone(),
                    title: other.title.clone(),
                    relationship_type: rel.relationship_type,
                    strength: rel.strength,
                    direction: Direction::Incoming,
                });
            }
        }
        related
    }
}

fn check_unit(entity_id: &str, field: &'static str, value: f64) -> Result<(), ValidationError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::ScoreOutOfRange {
            entity_id: entity_id.to_string(),
            field,
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{KnowledgeMetadata, KnowledgeRelationship};

    fn entity(kind: KnowledgeType, id: &str) -> KnowledgeEntity {
        KnowledgeEntity::new(
            kind,
            id,
            format!("Title {}", id),
            "body".to_string(),
            "body".to_string(),
            KnowledgeMetadata::new("test", "project"),
            Utc::now(),
        )
    }

    fn edge(target: &str, bidirectional: bool) -> KnowledgeRelationship {
        KnowledgeRelationship {
            target_id: target.to_string(),
            relationship_type: RelationshipType::AppliesTo,
            strength: 0.7,
            context: None,
            bidirectional,
            created_at: Utc::now(),
            validated: false,
        }
    }

    #[test]
    fn test_build_counts_by_type() {
        let snap = KnowledgeSnapshot::build(
            vec![
                entity(KnowledgeType::ProjectCaseStudy, "a"),
                entity(KnowledgeType::ProjectCaseStudy, "b"),
                entity(KnowledgeType::Insight, "c"),
            ],
            3,
            "job-1",
            Utc::now(),
        );
        assert_eq!(snap.metadata.total_entities, 3);
        assert_eq!(snap.metadata.entities_by_type[&KnowledgeType::ProjectCaseStudy], 2);
        assert_eq!(snap.metadata.entities_by_type[&KnowledgeType::Insight], 1);
        assert!(snap.validate().is_ok());
    }

    #[test]
    fn test_dangling_edge_fails_validation() {
        let mut a = entity(KnowledgeType::ProjectCaseStudy, "a");
        a.relationships.push(edge("project_missing", true));
        let snap = KnowledgeSnapshot::build(vec![a], 1, "job", Utc::now());
        assert_eq!(
            snap.validate().unwrap_err(),
            ValidationError::DanglingRelationship {
                source_id: "project_a".to_string(),
                target_id: "project_missing".to_string(),
            }
        );
    }

    #[test]
    fn test_duplicate_id_fails_validation() {
        let snap = KnowledgeSnapshot::build(
            vec![
                entity(KnowledgeType::Insight, "a"),
                entity(KnowledgeType::Insight, "a"),
            ],
            1,
            "job",
            Utc::now(),
        );
        assert!(matches!(
            snap.validate(),
            Err(ValidationError::DuplicateId(id)) if id == "insight_a"
        ));
    }

    #[test]
    fn test_out_of_range_score_fails_validation() {
        let mut a = entity(KnowledgeType::Insight, "a");
        a.metadata.relevance_score = 1.2;
        let snap = KnowledgeSnapshot::build(vec![a], 1, "job", Utc::now());
        assert!(matches!(
            snap.validate(),
            Err(ValidationError::ScoreOutOfRange {
                field: "relevance_score",
                ..
            })
        ));
    }

    #[test]
    fn test_related_to_resolves_both_directions() {
        let mut a = entity(KnowledgeType::ProjectCaseStudy, "a");
        let b = entity(KnowledgeType::ArchitecturalPrinciple, "b");
        a.relationships.push(edge("principle_b", true));
        let snap = KnowledgeSnapshot::build(vec![a, b], 1, "job", Utc::now());

        let from_a = snap.related_to("project_a");
        assert_eq!(from_a.len(), 1);
        assert_eq!(from_a[0].id, "principle_b");
        assert_eq!(from_a[0].direction, Direction::Outgoing);

        let from_b = snap.related_to("principle_b");
        assert_eq!(from_b.len(), 1);
        assert_eq!(from_b[0].id, "project_a");
        assert_eq!(from_b[0].title, "Title a");
        assert_eq!(from_b[0].relationship_type, RelationshipType::AppliesTo);
        assert_eq!(from_b[0].strength, 0.7);
        assert_eq!(from_b[0].direction, Direction::Incoming);
    }

    #[test]
    fn test_one_way_edge_not_visible_from_target() {
        let mut a = entity(KnowledgeType::ProjectCaseStudy, "a");
        let b = entity(KnowledgeType::ArchitecturalPrinciple, "b");
        a.relationships.push(edge("principle_b", false));
        let snap = KnowledgeSnapshot::build(vec![a, b], 1, "job", Utc::now());
        assert!(snap.related_to("principle_b").is_empty());
    }

    #[test]
    fn test_snapshot_json_shape() {
        let snap = KnowledgeSnapshot::build(
            vec![entity(KnowledgeType::Testimonial, "t")],
            7,
            "job-7",
            Utc::now(),
        );
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["metadata"]["version"], 7);
        assert_eq!(json["metadata"]["entities_by_type"]["testimonial"], 1);
        assert_eq!(json["entities"][0]["id"], "testimonial_t");
    }
}
