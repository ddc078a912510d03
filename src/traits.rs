//! Connector trait and registry.
//!
//! A [`Connector`] pulls raw records of one [`KnowledgeType`] from some
//! origin and hands them to the ingestion pipeline as a [`SourceBatch`].
//! Built-in JSON file connectors are created from `[sources.*]` config;
//! embedders of the library can register their own.
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │          ConnectorRegistry           │
//! │  ┌──────────────┐  ┌──────────────┐  │
//! │  │  JSON files  │  │ Custom (Rust)│  │
//! │  └──────────────┘  └──────────────┘  │
//! └──────────────┬───────────────────────┘
//!                ▼
//!     IngestionPipeline::run_connectors()
//! ```

use anyhow::Result;
use async_trait::async_trait;

use knowledge_harness_core::mappers::SourceBatch;
use knowledge_harness_core::models::KnowledgeType;

use crate::config::Config;
use crate::connector_fs::JsonFileConnector;

/// A source of raw knowledge records.
///
/// # Example
///
/// ```rust
/// use anyhow::Result;
/// use async_trait::async_trait;
/// use knowledge_harness::traits::Connector;
/// use knowledge_harness_core::mappers::SourceBatch;
/// use knowledge_harness_core::models::KnowledgeType;
///
/// struct Fixed;
///
/// #[async_trait]
/// impl Connector for Fixed {
///     fn name(&self) -> &str { "fixed" }
///     fn description(&self) -> &str { "Hardcoded insights" }
///     fn kind(&self) -> KnowledgeType { KnowledgeType::Insight }
///
///     async fn scan(&self) -> Result<SourceBatch> {
///         let records = vec![serde_json::json!({ "id": "a", "title": "A", "body": "..." })];
///         Ok(SourceBatch::new(self.kind(), self.source_label(), records))
///     }
/// }
/// ```
#[async_trait]
pub trait Connector: Send + Sync {
    /// Instance name (the `<name>` in `[sources.<name>]`).
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Kind of record this connector produces.
    fn kind(&self) -> KnowledgeType;

    /// Connector type identifier. Custom connectors default to `"custom"`.
    fn connector_type(&self) -> &str {
        "custom"
    }

    /// Label stored in `metadata.source` of every entity from this connector.
    fn source_label(&self) -> String {
        format!("{}:{}", self.connector_type(), self.name())
    }

    /// Cheap readiness check used by `kb sources`.
    fn check(&self) -> Result<()> {
        Ok(())
    }

    /// Read every record currently available from the source.
    async fn scan(&self) -> Result<SourceBatch>;
}

/// Ordered collection of connectors.
pub struct ConnectorRegistry {
    connectors: Vec<Box<dyn Connector>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self {
            connectors: Vec::new(),
        }
    }

    /// One [`JsonFileConnector`] per `[sources.<name>]` entry, in name order.
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::new();
        for (name, cfg) in &config.sources {
            registry.register(Box::new(JsonFileConnector::new(name.clone(), cfg.clone())));
        }
        registry
    }

    pub fn register(&mut self, connector: Box<dyn Connector>) {
        self.connectors.push(connector);
    }

    pub fn connectors(&self) -> &[Box<dyn Connector>] {
        &self.connectors
    }

    pub fn connectors_by_kind(&self, kind: KnowledgeType) -> Vec<&dyn Connector> {
        self.connectors
            .iter()
            .filter(|c| c.kind() == kind)
            .map(|c| c.as_ref())
            .collect()
    }

    pub fn find(&self, name: &str) -> Option<&dyn Connector> {
        self.connectors
            .iter()
            .find(|c| c.name() == name)
            .map(|c| c.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.connectors.len()
    }
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_orders_by_name() {
        let config: Config = toml::from_str(
            r#"
[db]
path = "kb.sqlite"

[sources.zeta]
kind = "insight"
path = "insights"

[sources.alpha]
kind = "project"
path = "projects.json"
"#,
        )
        .unwrap();

        let registry = ConnectorRegistry::from_config(&config);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.connectors()[0].name(), "alpha");
        assert_eq!(registry.connectors()[0].source_label(), "json:alpha");
        assert_eq!(
            registry.connectors_by_kind(KnowledgeType::Insight)[0].name(),
            "zeta"
        );
        assert!(registry.find("missing").is_none());
    }
}
