//! TOML configuration.
//!
//! ```toml
//! [db]
//! path = "./data/kb.sqlite"
//!
//! [embedding]
//! provider = "hash"        # or "openai"
//! dims = 1536
//!
//! [retrieval]
//! top_k = 8
//!
//! [server]
//! bind = "127.0.0.1:7341"
//!
//! [sources.projects]
//! kind = "project_case_study"
//! path = "./content/projects.json"
//! ```

use anyhow::{Context, Result};
use knowledge_harness_core::embedding::DEFAULT_DIMS;
use knowledge_harness_core::models::KnowledgeType;
use knowledge_harness_core::search::{RankingTable, DEFAULT_TOP_K};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Replaces the built-in ranking table when present.
    #[serde(default)]
    pub ranking: Option<RankingTable>,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sources: BTreeMap<String, SourceConfig>,
}

impl Config {
    /// A config with defaults everywhere and the database at `db_path`.
    pub fn minimal(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig {
                path: db_path.into(),
            },
            embedding: EmbeddingConfig::default(),
            retrieval: RetrievalConfig::default(),
            ranking: None,
            server: ServerConfig::default(),
            sources: BTreeMap::new(),
        }
    }

    pub fn ranking_table(&self) -> RankingTable {
        self.ranking.clone().unwrap_or_default()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Per-entity embedding timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: default_dims(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "hash".to_string()
}
fn default_dims() -> usize {
    DEFAULT_DIMS
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

/// One `[sources.<name>]` entry: a JSON file or a directory of JSON files
/// holding records of a single kind.
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub kind: KnowledgeType,
    pub path: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.json".to_string()]
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Relative source paths resolve against the config file's directory.
    if let Some(base) = path.parent() {
        for source in config.sources.values_mut() {
            if source.path.is_relative() {
                source.path = base.join(&source.path);
            }
        }
    }

    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }
    if config.embedding.timeout_secs == 0 {
        anyhow::bail!("embedding.timeout_secs must be > 0");
    }

    match config.embedding.provider.as_str() {
        "hash" => {}
        "openai" => {
            if config.embedding.model.is_none() {
                anyhow::bail!("embedding.model must be specified when provider is 'openai'");
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be hash or openai.",
            other
        ),
    }

    if let Some(ranking) = &config.ranking {
        for boost in &ranking.keyword_boosts {
            if boost.keyword.trim().is_empty() {
                anyhow::bail!("ranking.keyword_boosts entries must have a non-empty keyword");
            }
        }
        for rule in &ranking.category_boosts {
            if rule.category.trim().is_empty() || rule.keywords.is_empty() {
                anyhow::bail!("ranking.category_boosts entries need a category and keywords");
            }
        }
    }

    for (name, source) in &config.sources {
        if name.trim().is_empty() {
            anyhow::bail!("source names must not be empty");
        }
        if source.include_globs.is_empty() {
            anyhow::bail!("sources.{}.include_globs must not be empty", name);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_src)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_minimal_config_defaults() {
        let config = parse("[db]\npath = \"kb.sqlite\"\n").unwrap();
        assert_eq!(config.embedding.provider, "hash");
        assert_eq!(config.embedding.dims, 1536);
        assert_eq!(config.embedding.timeout_secs, 30);
        assert_eq!(config.retrieval.top_k, 8);
        assert!(config.sources.is_empty());
        assert_eq!(config.ranking_table(), RankingTable::builtin());
    }

    #[test]
    fn test_sources_and_ranking() {
        let config = parse(
            r#"
[db]
path = "kb.sqlite"

[ranking]
version = 2

[[ranking.keyword_boosts]]
keyword = "wallet"
entity_ids = ["project_airdropops"]

[sources.projects]
kind = "project_case_study"
path = "content/projects.json"

[sources.notes]
kind = "insight"
path = "content/insights"
exclude_globs = ["**/draft-*.json"]
"#,
        )
        .unwrap();

        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.sources["projects"].kind, KnowledgeType::ProjectCaseStudy);
        assert_eq!(config.sources["notes"].include_globs, vec!["**/*.json"]);
        let ranking = config.ranking_table();
        assert_eq!(ranking.version, 2);
        assert_eq!(ranking.keyword_boosts[0].keyword, "wallet");
        assert!(ranking.category_boosts.is_empty());
    }

    #[test]
    fn test_rejects_unknown_provider() {
        let err = parse("[db]\npath = \"x\"\n[embedding]\nprovider = \"magic\"\n").unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[test]
    fn test_openai_requires_model() {
        let err = parse("[db]\npath = \"x\"\n[embedding]\nprovider = \"openai\"\n").unwrap_err();
        assert!(err.to_string().contains("embedding.model"));
    }

    #[test]
    fn test_rejects_zero_top_k() {
        let err = parse("[db]\npath = \"x\"\n[retrieval]\ntop_k = 0\n").unwrap_err();
        assert!(err.to_string().contains("top_k"));
    }

    #[test]
    fn test_rejects_unknown_kind() {
        assert!(parse(
            "[db]\npath = \"x\"\n[sources.a]\nkind = \"podcast\"\npath = \"a.json\"\n"
        )
        .is_err());
    }
}
