//! Source mappers: raw source records → normalized [`KnowledgeEntity`]s.
//!
//! One mapper exists per [`KnowledgeType`]. Mappers are plain functions
//! registered in a [`MapperRegistry`] keyed by kind, so the ingestion
//! pipeline dispatches on the batch's kind without branching on it.
//!
//! # Mapper contract
//!
//! | Concern | Rule |
//! |---------|------|
//! | id | `"{prefix}_{record.id}"`, deterministic |
//! | content | every search-relevant field of the record is rendered |
//! | tags | kind tag + domain tags inferred from identifiers + structured fields |
//! | relevance | kind-specific heuristic, clamped to `[0, 1]` |
//! | failure | per record: a [`MappingError`], never a batch abort |

mod insight;
mod principle;
mod project;
mod testimonial;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use thiserror::Error;

use crate::models::{KnowledgeEntity, KnowledgeType};

pub use insight::map_insight;
pub use principle::map_principle;
pub use project::map_project;
pub use testimonial::map_testimonial;

/// Maximum length of a derived summary, in characters.
pub const SUMMARY_MAX_CHARS: usize = 200;

/// Identifier substrings that imply domain tags.
const DOMAIN_TAG_RULES: &[(&str, &[&str])] = &[
    ("airdrop", &["web3", "defi", "automation"]),
    ("defi", &["web3", "defi"]),
    ("web3", &["web3"]),
    ("chain", &["web3", "blockchain"]),
    ("nft", &["web3", "nft"]),
    ("galyarder", &["productivity", "personal-os"]),
    ("agent", &["ai", "agents"]),
    ("llm", &["ai", "llm"]),
    ("analytics", &["analytics", "data"]),
    ("dashboard", &["analytics", "visualization"]),
    ("pay", &["fintech", "payments"]),
    ("commerce", &["ecommerce"]),
    ("automat", &["automation"]),
];

/// A per-record mapping failure.
///
/// The orchestrator records the error string in the job and skips the
/// record; the rest of the batch continues.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MappingError {
    #[error("malformed {kind} record '{record_id}': {reason}")]
    Malformed {
        kind: KnowledgeType,
        record_id: String,
        reason: String,
    },

    #[error("{kind} record '{record_id}' is missing required field '{field}'")]
    MissingField {
        kind: KnowledgeType,
        record_id: String,
        field: &'static str,
    },

    #[error("{kind} record '{record_id}' has invalid {field}: {reason}")]
    InvalidValue {
        kind: KnowledgeType,
        record_id: String,
        field: &'static str,
        reason: String,
    },

    #[error("no mapper registered for kind '{0}'")]
    UnsupportedKind(KnowledgeType),
}

/// Per-run context handed to every mapper call.
#[derive(Debug, Clone)]
pub struct MappingContext {
    /// Label of the source the record came from (stored in `metadata.source`).
    pub source: String,
    /// Timestamp used for `created_at` / `updated_at` of fresh entities.
    pub now: DateTime<Utc>,
}

impl MappingContext {
    pub fn new(source: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            source: source.into(),
            now,
        }
    }
}

/// All raw records of one kind pulled from one source.
///
/// `errors` lists parts of the source that could not be read (for example
/// one unparseable file in a directory). A batch with errors is incomplete:
/// entities it previously produced are not treated as removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceBatch {
    pub kind: KnowledgeType,
    pub source: String,
    pub records: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl SourceBatch {
    pub fn new(kind: KnowledgeType, source: impl Into<String>, records: Vec<Value>) -> Self {
        Self {
            kind,
            source: source.into(),
            records,
            errors: Vec::new(),
        }
    }

    pub fn with_errors(mut self, errors: Vec<String>) -> Self {
        self.errors = errors;
        self
    }

    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Signature shared by all mappers.
pub type MapperFn = fn(&Value, &MappingContext) -> Result<KnowledgeEntity, MappingError>;

/// Registry of mappers keyed by [`KnowledgeType`].
///
/// # Example
///
/// ```rust
/// use knowledge_harness_core::mappers::{MapperRegistry, MappingContext};
/// use knowledge_harness_core::models::KnowledgeType;
///
/// let registry = MapperRegistry::with_builtins();
/// let ctx = MappingContext::new("test", chrono::Utc::now());
/// let raw = serde_json::json!({ "id": "caching", "title": "Cache early", "body": "Measure first." });
/// let entity = registry.map(KnowledgeType::Insight, &raw, &ctx).unwrap();
/// assert_eq!(entity.id, "insight_caching");
/// ```
pub struct MapperRegistry {
    mappers: HashMap<KnowledgeType, MapperFn>,
}

impl MapperRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            mappers: HashMap::new(),
        }
    }

    /// Create a registry pre-loaded with the four built-in mappers.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(KnowledgeType::ProjectCaseStudy, map_project);
        registry.register(KnowledgeType::ArchitecturalPrinciple, map_principle);
        registry.register(KnowledgeType::Insight, map_insight);
        registry.register(KnowledgeType::Testimonial, map_testimonial);
        registry
    }

    /// Register (or replace) the mapper for a kind.
    pub fn register(&mut self, kind: KnowledgeType, mapper: MapperFn) {
        self.mappers.insert(kind, mapper);
    }

    pub fn get(&self, kind: KnowledgeType) -> Option<MapperFn> {
        self.mappers.get(&kind).copied()
    }

    /// Registered kinds in a stable order.
    pub fn kinds(&self) -> Vec<KnowledgeType> {
        let mut kinds: Vec<KnowledgeType> = self.mappers.keys().copied().collect();
        kinds.sort();
        kinds
    }

    /// Map one raw record through the mapper registered for `kind`.
    pub fn map(
        &self,
        kind: KnowledgeType,
        raw: &Value,
        ctx: &MappingContext,
    ) -> Result<KnowledgeEntity, MappingError> {
        let mapper = self.get(kind).ok_or(MappingError::UnsupportedKind(kind))?;
        mapper(raw, ctx)
    }

    pub fn len(&self) -> usize {
        self.mappers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappers.is_empty()
    }
}

impl Default for MapperRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ============ Shared helpers ============

/// Deserialize a raw record into its typed shape.
pub(crate) fn parse_record<T: DeserializeOwned>(
    kind: KnowledgeType,
    raw: &Value,
) -> Result<T, MappingError> {
    if !raw.is_object() {
        return Err(MappingError::Malformed {
            kind,
            record_id: record_id_hint(raw),
            reason: "record must be a JSON object".to_string(),
        });
    }
    serde_json::from_value(raw.clone()).map_err(|e| MappingError::Malformed {
        kind,
        record_id: record_id_hint(raw),
        reason: e.to_string(),
    })
}

/// Best-effort id for error messages on records that failed to parse.
pub(crate) fn record_id_hint(raw: &Value) -> String {
    match raw.get("id") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => "<unknown>".to_string(),
    }
}

/// Return the trimmed value of a required text field.
pub(crate) fn require<'a>(
    kind: KnowledgeType,
    record_id: &str,
    field: &'static str,
    value: Option<&'a str>,
) -> Result<&'a str, MappingError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(MappingError::MissingField {
            kind,
            record_id: record_id.to_string(),
            field,
        }),
    }
}

/// Lowercase, trim, and hyphenate a tag or set member.
pub fn normalize_tag(value: &str) -> String {
    value
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

/// Normalize a list of strings into a set, skipping blanks.
pub(crate) fn normalized_set<'a>(values: impl IntoIterator<Item = &'a String>) -> BTreeSet<String> {
    values
        .into_iter()
        .map(|v| normalize_tag(v))
        .filter(|v| !v.is_empty())
        .collect()
}

/// Domain tags implied by recognizable substrings of an identifier.
///
/// ```rust
/// use knowledge_harness_core::mappers::infer_domain_tags;
///
/// let tags = infer_domain_tags("airdropops");
/// assert!(tags.contains("web3") && tags.contains("defi") && tags.contains("automation"));
/// ```
pub fn infer_domain_tags(identifier: &str) -> BTreeSet<String> {
    let lower = identifier.to_lowercase();
    DOMAIN_TAG_RULES
        .iter()
        .filter(|(needle, _)| lower.contains(needle))
        .flat_map(|(_, tags)| tags.iter().map(|t| t.to_string()))
        .collect()
}

/// Render a JSON scalar as display text.
pub(crate) fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Render a JSON object of facts as an ordered string map.
pub(crate) fn facts_to_map(facts: &BTreeMap<String, Value>) -> BTreeMap<String, String> {
    facts
        .iter()
        .map(|(k, v)| (k.trim().to_string(), value_to_text(v)))
        .filter(|(k, v)| !k.is_empty() && !v.trim().is_empty())
        .collect()
}

/// Derive a short summary: the first sentence when it fits, otherwise a
/// word-boundary truncation of at most `max_chars` characters plus `...`.
pub fn summarize(text: &str, max_chars: usize) -> String {
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");

    if let Some(end) = text.find(". ") {
        let first = &text[..=end];
        if first.chars().count() <= max_chars {
            return first.to_string();
        }
    }
    if text.chars().count() <= max_chars {
        return text;
    }

    let truncated: String = text.chars().take(max_chars).collect();
    let cut = match truncated.rfind(' ') {
        Some(idx) if idx > 0 => &truncated[..idx],
        _ => truncated.as_str(),
    };
    format!("{}...", cut.trim_end_matches([',', ';', ':', '.']))
}

pub(crate) fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Incrementally renders the `content` body of an entity.
#[derive(Default)]
pub(crate) struct ContentBuilder {
    parts: Vec<String>,
}

impl ContentBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn paragraph(&mut self, text: &str) -> &mut Self {
        if !text.trim().is_empty() {
            self.parts.push(text.trim().to_string());
        }
        self
    }

    pub(crate) fn field(&mut self, label: &str, value: &str) -> &mut Self {
        if !value.trim().is_empty() {
            self.parts.push(format!("{}: {}", label, value.trim()));
        }
        self
    }

    pub(crate) fn inline_list(&mut self, label: &str, items: &[String]) -> &mut Self {
        let items: Vec<&str> = items
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();
        if !items.is_empty() {
            self.parts.push(format!("{}: {}", label, items.join(", ")));
        }
        self
    }

    pub(crate) fn list(&mut self, label: &str, items: &[String]) -> &mut Self {
        let lines: Vec<String> = items
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| format!("- {}", s))
            .collect();
        if !lines.is_empty() {
            self.parts.push(format!("{}:\n{}", label, lines.join("\n")));
        }
        self
    }

    pub(crate) fn facts(&mut self, label: &str, facts: &BTreeMap<String, String>) -> &mut Self {
        if !facts.is_empty() {
            let lines: Vec<String> = facts
                .iter()
                .map(|(k, v)| format!("- {}: {}", k, v))
                .collect();
            self.parts.push(format!("{}:\n{}", label, lines.join("\n")));
        }
        self
    }

    pub(crate) fn build(&self) -> String {
        self.parts.join("\n\n")
    }
}
