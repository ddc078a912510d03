//! Heuristic multi-signal search over a knowledge snapshot.
//!
//! The engine is pure and synchronous: it scores a slice of entities and
//! never touches storage. [`search_store`] is the thin async wrapper that
//! loads the current snapshot from a [`SnapshotStore`] first.
//!
//! # Scoring
//!
//! All points are integers so ties are exact.
//!
//! | Signal | Points |
//! |--------|--------|
//! | whole query is a substring of `title` | 100 |
//! | whole query is a substring of `content` | 80 |
//! | per term (> 2 chars) found in `title` | 50 |
//! | per term found in `content` | 30 |
//! | per term found in `metadata.source` | 20 |
//! | category rule matched (once per rule) | 40 |
//! | keyword boost matched (once per entry) | 60 |
//!
//! Matching is case-insensitive. Entities scoring 0 are dropped, the rest
//! are stable-sorted by raw score (ties keep insertion order), truncated to
//! `top_k`, and normalized as `min(raw / 100, 1)`.
//!
//! The category rules and keyword boosts live in a versioned
//! [`RankingTable`] so they can be replaced from configuration without
//! touching the scoring loop.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

use crate::mappers::normalize_tag;
use crate::models::{AccessLevel, KnowledgeEntity, KnowledgeType};
use crate::snapshot::{KnowledgeSnapshot, RelatedEntity};
use crate::store::SnapshotStore;

pub const DEFAULT_TOP_K: usize = 8;

pub const TITLE_PHRASE_POINTS: u32 = 100;
pub const CONTENT_PHRASE_POINTS: u32 = 80;
pub const TITLE_TERM_POINTS: u32 = 50;
pub const CONTENT_TERM_POINTS: u32 = 30;
pub const SOURCE_TERM_POINTS: u32 = 20;
pub const CATEGORY_POINTS: u32 = 40;
pub const KEYWORD_POINTS: u32 = 60;

/// Terms must be longer than this many characters to score.
const MIN_TERM_CHARS: usize = 2;

/// Errors from the search read path.
///
/// Zero results is a normal outcome and is never reported as an error.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("no knowledge snapshot is available; run ingestion first")]
    Unavailable,

    #[error("snapshot store error: {0}")]
    Store(String),
}

/// A keyword that boosts a fixed set of entity ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordBoost {
    pub keyword: String,
    pub entity_ids: BTreeSet<String>,
}

/// Query keywords that boost entities of one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryBoost {
    pub keywords: Vec<String>,
    pub category: String,
}

/// Versioned boost tables consulted by the scoring loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingTable {
    pub version: u32,
    #[serde(default)]
    pub keyword_boosts: Vec<KeywordBoost>,
    #[serde(default)]
    pub category_boosts: Vec<CategoryBoost>,
}

impl RankingTable {
    /// Built-in table, version 1.
    pub fn builtin() -> Self {
        let ids = |list: &[&str]| list.iter().map(|s| s.to_string()).collect();
        let words = |list: &[&str]| list.iter().map(|s| s.to_string()).collect();
        Self {
            version: 1,
            keyword_boosts: vec![
                KeywordBoost {
                    keyword: "airdrop".to_string(),
                    entity_ids: ids(&["project_airdropops"]),
                },
                KeywordBoost {
                    keyword: "web3".to_string(),
                    entity_ids: ids(&["project_airdropops"]),
                },
                KeywordBoost {
                    keyword: "galyarder".to_string(),
                    entity_ids: ids(&["project_galyarderos"]),
                },
                KeywordBoost {
                    keyword: "productivity".to_string(),
                    entity_ids: ids(&["project_galyarderos"]),
                },
            ],
            category_boosts: vec![
                CategoryBoost {
                    keywords: words(&["project"]),
                    category: "project".to_string(),
                },
                CategoryBoost {
                    keywords: words(&["architecture", "technical", "principle"]),
                    category: "architecture".to_string(),
                },
                CategoryBoost {
                    keywords: words(&["technical"]),
                    category: "technical".to_string(),
                },
            ],
        }
    }

    /// A table with no boosts; only text signals score.
    pub fn empty(version: u32) -> Self {
        Self {
            version,
            keyword_boosts: Vec::new(),
            category_boosts: Vec::new(),
        }
    }
}

impl Default for RankingTable {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Points awarded per signal for one entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub title_phrase: u32,
    pub content_phrase: u32,
    pub title_terms: u32,
    pub content_terms: u32,
    pub source_terms: u32,
    pub category: u32,
    pub keyword: u32,
    pub ranking_version: u32,
}

impl ScoreBreakdown {
    pub fn total(&self) -> u32 {
        self.title_phrase
            + self.content_phrase
            + self.title_terms
            + self.content_terms
            + self.source_terms
            + self.category
            + self.keyword
    }
}

/// A scored entity, borrowed from the slice that was searched.
#[derive(Debug, Clone)]
pub struct ScoredEntity<'a> {
    pub entity: &'a KnowledgeEntity,
    pub raw_score: u32,
    /// `min(raw_score / 100, 1)`.
    pub score: f64,
    pub breakdown: ScoreBreakdown,
}

/// Score a single entity. Returns an all-zero breakdown for blank queries.
pub fn score_entity(query: &str, entity: &KnowledgeEntity, ranking: &RankingTable) -> ScoreBreakdown {
    let query = query.trim().to_lowercase();
    let mut b = ScoreBreakdown {
        ranking_version: ranking.version,
        ..ScoreBreakdown::default()
    };
    if query.is_empty() {
        return b;
    }

    let title = entity.title.to_lowercase();
    let content = entity.content.to_lowercase();
    let source = entity.metadata.source.to_lowercase();

    if title.contains(&query) {
        b.title_phrase = TITLE_PHRASE_POINTS;
    }
    if content.contains(&query) {
        b.content_phrase = CONTENT_PHRASE_POINTS;
    }

    for term in query
        .split_whitespace()
        .filter(|t| t.chars().count() > MIN_TERM_CHARS)
    {
        if title.contains(term) {
            b.title_terms += TITLE_TERM_POINTS;
        }
        if content.contains(term) {
            b.content_terms += CONTENT_TERM_POINTS;
        }
        if source.contains(term) {
            b.source_terms += SOURCE_TERM_POINTS;
        }
    }

    for rule in &ranking.category_boosts {
        let keyword_hit = rule
            .keywords
            .iter()
            .any(|k| !k.is_empty() && query.contains(&k.to_lowercase()));
        if keyword_hit && entity.metadata.category.eq_ignore_ascii_case(&rule.category) {
            b.category += CATEGORY_POINTS;
        }
    }

    for boost in &ranking.keyword_boosts {
        if !boost.keyword.is_empty()
            && query.contains(&boost.keyword.to_lowercase())
            && boost.entity_ids.contains(&entity.id)
        {
            b.keyword += KEYWORD_POINTS;
        }
    }

    b
}

/// Rank `entities` against `query`.
///
/// # Example
///
/// ```rust
/// use knowledge_harness_core::models::{KnowledgeEntity, KnowledgeMetadata, KnowledgeType};
/// use knowledge_harness_core::search::{search, RankingTable};
///
/// let now = chrono::Utc::now();
/// let make = |id: &str, title: &str, content: &str| {
///     KnowledgeEntity::new(
///         KnowledgeType::ProjectCaseStudy, id, title.into(), content.into(),
///         String::new(), KnowledgeMetadata::new("json", "project"), now,
///     )
/// };
/// let entities = vec![
///     make("airdropops", "AirdropOps", "Web3 automation ROI"),
///     make("galyarderos", "GalyarderOS", "productivity automation"),
/// ];
/// let results = search("airdropops", &entities, 8, &RankingTable::empty(1));
/// assert_eq!(results.len(), 1);
/// assert_eq!(results[0].entity.title, "AirdropOps");
/// assert!(results[0].raw_score >= 150);
/// ```
pub fn search<'a>(
    query: &str,
    entities: &'a [KnowledgeEntity],
    top_k: usize,
    ranking: &RankingTable,
) -> Vec<ScoredEntity<'a>> {
    if query.trim().is_empty() {
        return Vec::new();
    }
    rank(query, entities.iter(), top_k, ranking)
}

fn rank<'a>(
    query: &str,
    entities: impl Iterator<Item = &'a KnowledgeEntity>,
    top_k: usize,
    ranking: &RankingTable,
) -> Vec<ScoredEntity<'a>> {
    let mut scored: Vec<ScoredEntity<'a>> = entities
        .filter_map(|entity| {
            let breakdown = score_entity(query, entity, ranking);
            let raw_score = breakdown.total();
            (raw_score > 0).then(|| ScoredEntity {
                entity,
                raw_score,
                score: (f64::from(raw_score) / 100.0).min(1.0),
                breakdown,
            })
        })
        .collect();

    // sort_by is stable: equal scores keep insertion order.
    scored.sort_by(|a, b| b.raw_score.cmp(&a.raw_score));
    scored.truncate(top_k);
    scored
}

/// Optional filters applied before scoring.
///
/// Each filter matches if the entity has any of the listed values; every
/// non-empty filter must match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    #[serde(default)]
    pub types: Vec<KnowledgeType>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub access_levels: Vec<AccessLevel>,
    #[serde(default)]
    pub project_associations: Vec<String>,
}

impl SearchFilters {
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
            && self.tags.is_empty()
            && self.access_levels.is_empty()
            && self.project_associations.is_empty()
    }

    pub fn matches(&self, entity: &KnowledgeEntity) -> bool {
        let any_of = |wanted: &[String], have: &BTreeSet<String>| {
            wanted.is_empty()
                || wanted.iter().any(|w| have.contains(&normalize_tag(w)))
        };

        (self.types.is_empty() || self.types.contains(&entity.entity_type))
            && (self.access_levels.is_empty()
                || self.access_levels.contains(&entity.metadata.access_level))
            && any_of(&self.tags, &entity.metadata.tags)
            && any_of(&self.project_associations, &entity.metadata.project_associations)
    }
}

/// A search request as accepted by the CLI and the HTTP server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub filters: SearchFilters,
    /// Result cap; `None` means the configured default.
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub explain: bool,
}

/// One ranked result with its neighbours.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// The matched entity, without embedding vectors.
    pub entity: KnowledgeEntity,
    pub score: f64,
    pub related: Vec<RelatedEntity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explain: Option<ScoreBreakdown>,
}

/// Filter, rank, and expand results against a snapshot.
///
/// `default_top_k` is used when the request carries no limit.
pub fn search_snapshot(
    snapshot: &KnowledgeSnapshot,
    request: &SearchRequest,
    ranking: &RankingTable,
    default_top_k: usize,
) -> Vec<SearchResult> {
    if request.query.trim().is_empty() {
        return Vec::new();
    }
    let top_k = request.limit.unwrap_or(default_top_k);

    let candidates = snapshot
        .entities
        .iter()
        .filter(|e| request.filters.matches(e));

    rank(&request.query, candidates, top_k, ranking)
        .into_iter()
        .map(|scored| {
            let mut entity = scored.entity.clone();
            entity.embeddings = None;
            SearchResult {
                related: snapshot.related_to(&entity.id),
                entity,
                score: scored.score,
                explain: request.explain.then_some(scored.breakdown),
            }
        })
        .collect()
}

/// Load the current snapshot from `store` and search it.
///
/// Returns [`SearchError::Unavailable`] when nothing has been ingested yet.
pub async fn search_store<S: SnapshotStore + ?Sized>(
    store: &S,
    request: &SearchRequest,
    ranking: &RankingTable,
    default_top_k: usize,
) -> Result<Vec<SearchResult>, SearchError> {
    let snapshot = store
        .load()
        .await
        .map_err(|e| SearchError::Store(format!("{:#}", e)))?
        .ok_or(SearchError::Unavailable)?;
    Ok(search_snapshot(&snapshot, request, ranking, default_top_k))
}
