//! # Knowledge Harness
//!
//! A knowledge ingestion and retrieval service. Heterogeneous content
//! records (project case studies, architectural principles, insights,
//! testimonials) are normalized into typed entities, embedded, linked by
//! heuristic relationships, and published as a single versioned snapshot
//! that a ranked search reads from.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────────────┐   ┌───────────┐
//! │ Connectors  │──▶│  Pipeline                │──▶│  SQLite   │
//! │ JSON files  │   │ map+embed+detect+validate│   │ snapshots │
//! └─────────────┘   └──────────────────────────┘   └─────┬─────┘
//!                                                        │
//!                               ┌────────────────────────┤
//!                               ▼                        ▼
//!                          ┌──────────┐            ┌──────────┐
//!                          │   CLI    │            │   HTTP   │
//!                          │  (kb)    │            │  (axum)  │
//!                          └──────────┘            └──────────┘
//! ```
//!
//! ## Quick start
//!
//! ```bash
//! kb init                          # create database
//! kb ingest                        # ingest every configured source
//! kb search "airdropops" --explain
//! kb serve                         # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`connector_fs`] | JSON file connector |
//! | [`traits`] | Connector trait and registry |
//! | [`embedding`] | Provider selection, OpenAI backend |
//! | [`ingest`] | Ingestion orchestrator |
//! | [`sqlite_store`] | SQLite snapshot store |
//! | [`progress`] | Ingestion progress on stderr |
//! | [`search`] | `kb search` |
//! | [`get`] | `kb get` |
//! | [`jobs`] | `kb jobs` |
//! | [`stats`] | `kb stats` |
//! | [`export`] | `kb export` |
//! | [`sources`] | `kb sources` |
//! | [`server`] | HTTP server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//!
//! Entity model, mappers, detection and ranking live in
//! `knowledge_harness_core`.

pub mod config;
pub mod connector_fs;
pub mod db;
pub mod embedding;
pub mod export;
pub mod get;
pub mod ingest;
pub mod jobs;
pub mod migrate;
pub mod progress;
pub mod search;
pub mod server;
pub mod sources;
pub mod sqlite_store;
pub mod stats;
pub mod traits;
