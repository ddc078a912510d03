//! Core data models used throughout Knowledge Harness.
//!
//! These types represent the entities, relationship edges, and ingestion
//! jobs that flow through the mapping, embedding, detection, and retrieval
//! pipeline. All of them serialize to the JSON shapes consumed by the HTTP
//! server and the `kb export` command.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::checksum::entity_checksum;

/// Kind of knowledge an entity was derived from.
///
/// The kind is fixed when a mapper creates the entity and determines the
/// id prefix (`project_`, `principle_`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum KnowledgeType {
    ProjectCaseStudy,
    ArchitecturalPrinciple,
    Insight,
    Testimonial,
}

impl KnowledgeType {
    /// Every kind with a built-in mapper, in registration order.
    pub const ALL: [KnowledgeType; 4] = [
        KnowledgeType::ProjectCaseStudy,
        KnowledgeType::ArchitecturalPrinciple,
        KnowledgeType::Insight,
        KnowledgeType::Testimonial,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            KnowledgeType::ProjectCaseStudy => "project_case_study",
            KnowledgeType::ArchitecturalPrinciple => "architectural_principle",
            KnowledgeType::Insight => "insight",
            KnowledgeType::Testimonial => "testimonial",
        }
    }

    /// Prefix used when deriving entity ids from source record ids.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            KnowledgeType::ProjectCaseStudy => "project",
            KnowledgeType::ArchitecturalPrinciple => "principle",
            KnowledgeType::Insight => "insight",
            KnowledgeType::Testimonial => "testimonial",
        }
    }

    /// Derive the stable entity id for a source record of this kind.
    ///
    /// ```rust
    /// use knowledge_harness_core::models::KnowledgeType;
    ///
    /// assert_eq!(KnowledgeType::ProjectCaseStudy.entity_id("airdropops"), "project_airdropops");
    /// ```
    pub fn entity_id(&self, source_id: &str) -> String {
        format!("{}_{}", self.id_prefix(), source_id.trim())
    }
}

impl fmt::Display for KnowledgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KnowledgeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "project_case_study" | "project" => Ok(KnowledgeType::ProjectCaseStudy),
            "architectural_principle" | "principle" => Ok(KnowledgeType::ArchitecturalPrinciple),
            "insight" => Ok(KnowledgeType::Insight),
            "testimonial" => Ok(KnowledgeType::Testimonial),
            other => Err(format!(
                "unknown knowledge type '{}'. Use project_case_study, architectural_principle, insight, or testimonial.",
                other
            )),
        }
    }
}

/// Visibility classification carried as data (never enforced here).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    #[default]
    Public,
    Internal,
    Confidential,
}

impl AccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::Public => "public",
            AccessLevel::Internal => "internal",
            AccessLevel::Confidential => "confidential",
        }
    }
}

impl FromStr for AccessLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "public" => Ok(AccessLevel::Public),
            "internal" => Ok(AccessLevel::Internal),
            "confidential" => Ok(AccessLevel::Confidential),
            other => Err(format!(
                "unknown access level '{}'. Use public, internal, or confidential.",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    #[default]
    Unverified,
    Pending,
    Verified,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Unverified => "unverified",
            VerificationStatus::Pending => "pending",
            VerificationStatus::Verified => "verified",
        }
    }
}

/// Structured metadata attached to every entity.
///
/// Set-valued fields use `BTreeSet` so that serialization, checksums, and
/// relationship contexts are order-independent of the source record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeMetadata {
    /// Origin identifier (the source connector label, e.g. `"json:projects"`).
    pub source: String,
    pub author: Option<String>,
    pub tags: BTreeSet<String>,
    pub category: String,
    pub subcategory: Option<String>,
    /// Confidence in the accuracy of the entity, in `[0, 1]`.
    pub confidence_score: f64,
    /// Heuristic relevance computed by the mapper, in `[0, 1]`.
    pub relevance_score: f64,
    pub access_level: AccessLevel,
    pub project_associations: BTreeSet<String>,
    pub technology_stack: BTreeSet<String>,
    pub business_impact: Option<BTreeMap<String, String>>,
    pub verification_status: VerificationStatus,
    pub last_validated: Option<DateTime<Utc>>,
}

impl KnowledgeMetadata {
    /// Empty metadata for the given source and category; mappers fill the rest.
    pub fn new(source: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            author: None,
            tags: BTreeSet::new(),
            category: category.into(),
            subcategory: None,
            confidence_score: 1.0,
            relevance_score: 0.5,
            access_level: AccessLevel::Public,
            project_associations: BTreeSet::new(),
            technology_stack: BTreeSet::new(),
            business_impact: None,
            verification_status: VerificationStatus::Unverified,
            last_validated: None,
        }
    }
}

/// Type of a directed relationship edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    Implements,
    Extends,
    Contradicts,
    Supports,
    References,
    Supersedes,
    AppliesTo,
    DerivedFrom,
    Validates,
}

impl RelationshipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::Implements => "implements",
            RelationshipType::Extends => "extends",
            RelationshipType::Contradicts => "contradicts",
            RelationshipType::Supports => "supports",
            RelationshipType::References => "references",
            RelationshipType::Supersedes => "supersedes",
            RelationshipType::AppliesTo => "applies_to",
            RelationshipType::DerivedFrom => "derived_from",
            RelationshipType::Validates => "validates",
        }
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directed, weighted edge from the owning entity to `target_id`.
///
/// When `bidirectional` is set the edge is equally valid from the target's
/// side; no mirrored edge is stored on the target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeRelationship {
    pub target_id: String,
    pub relationship_type: RelationshipType,
    /// Edge weight in `[0, 1]`.
    pub strength: f64,
    pub context: Option<String>,
    pub bidirectional: bool,
    pub created_at: DateTime<Utc>,
    /// Heuristically detected edges start unvalidated.
    pub validated: bool,
}

/// The three per-entity embedding vectors plus provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityEmbeddings {
    pub content: Vec<f32>,
    pub summary: Vec<f32>,
    pub title: Vec<f32>,
    pub model: String,
    pub model_version: String,
    pub created_at: DateTime<Utc>,
}

/// A normalized unit of knowledge derived from one source record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntity {
    pub id: String,
    #[serde(rename = "type")]
    pub entity_type: KnowledgeType,
    pub title: String,
    pub content: String,
    pub summary: String,
    pub metadata: KnowledgeMetadata,
    #[serde(default)]
    pub relationships: Vec<KnowledgeRelationship>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embeddings: Option<EntityEmbeddings>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u32,
    pub checksum: String,
}

impl KnowledgeEntity {
    /// Create a fresh entity at version 1 with its checksum computed.
    pub fn new(
        entity_type: KnowledgeType,
        source_id: &str,
        title: String,
        content: String,
        summary: String,
        metadata: KnowledgeMetadata,
        now: DateTime<Utc>,
    ) -> Self {
        let checksum = entity_checksum(entity_type, &title, &content, &summary, &metadata);
        Self {
            id: entity_type.entity_id(source_id),
            entity_type,
            title,
            content,
            summary,
            metadata,
            relationships: Vec::new(),
            embeddings: None,
            created_at: now,
            updated_at: now,
            version: 1,
            checksum,
        }
    }

    /// Recompute the checksum from the current content and metadata.
    pub fn compute_checksum(&self) -> String {
        entity_checksum(
            self.entity_type,
            &self.title,
            &self.content,
            &self.summary,
            &self.metadata,
        )
    }
}

/// Lifecycle state of an [`IngestionJob`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status '{}'", other)),
        }
    }
}

/// One batch run of the ingestion pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionJob {
    pub id: String,
    pub source: String,
    pub status: JobStatus,
    /// Raw records attempted across all batches.
    pub entities_processed: u64,
    /// Entities whose id did not exist in the prior snapshot.
    pub entities_created: u64,
    /// Existing entities whose checksum changed.
    pub entities_updated: u64,
    #[serde(default)]
    pub entities_unchanged: u64,
    /// Entities dropped because embedding failed.
    #[serde(default)]
    pub entities_dropped: u64,
    pub errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl IngestionJob {
    /// Create a `pending` job with a fresh UUID.
    pub fn new(source: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source: source.into(),
            status: JobStatus::Pending,
            entities_processed: 0,
            entities_created: 0,
            entities_updated: 0,
            entities_unchanged: 0,
            entities_dropped: 0,
            errors: Vec::new(),
            started_at: now,
            completed_at: None,
            metadata: serde_json::Map::new(),
        }
    }

    pub fn start(&mut self) {
        self.status = JobStatus::Processing;
    }

    pub fn complete(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Completed;
        self.completed_at = Some(now);
    }

    /// Mark the job failed, appending the reason to the error list.
    pub fn fail(&mut self, reason: impl Into<String>, now: DateTime<Utc>) {
        self.errors.push(reason.into());
        self.status = JobStatus::Failed;
        self.completed_at = Some(now);
    }

    /// The progress view consumed by UI collaborators.
    pub fn status_view(&self) -> JobStatusView {
        JobStatusView {
            id: self.id.clone(),
            status: self.status,
            entities_processed: self.entities_processed,
            entities_created: self.entities_created,
            errors: self.errors.clone(),
        }
    }
}

/// Compact job status shape: `{ id, status, entities_processed, entities_created, errors }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusView {
    pub id: String,
    pub status: JobStatus,
    pub entities_processed: u64,
    pub entities_created: u64,
    pub errors: Vec<String>,
}
