//! # Knowledge Harness Core
//!
//! Runtime-free logic for Knowledge Harness: the entity model, source
//! mappers, embedding trait, relationship detection, snapshot validation,
//! the ranking engine, and the snapshot store abstraction.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or other
//! runtime-specific dependencies. The application crate supplies the
//! connectors, the SQLite store, and the ingestion orchestrator.

pub mod checksum;
pub mod embedding;
pub mod mappers;
pub mod models;
pub mod relationships;
pub mod search;
pub mod snapshot;
pub mod store;
