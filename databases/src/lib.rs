//! Casegraph database connectivity.
//!
//! This crate owns the seam between the retrieval engine and the property
//! graph it reads from: the [`GraphStore`] trait plus the Neo4j-backed
//! implementation in [`neo4j`]. The engine only ever sees rows of JSON
//! values, so tests can substitute an in-memory store.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

pub mod neo4j;

pub use neo4j::{Neo4jConfig, Neo4jStore, StoreStats};

/// One result row: column name to value.
pub type Row = HashMap<String, Value>;

/// Read-only access to a property graph via declarative pattern queries.
///
/// `params` are bound with the store's native parameter mechanism; callers
/// must not splice untrusted text into `cypher` directly. Implementations
/// must be safe for concurrent use behind an `Arc`.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Execute one query and collect its rows.
    async fn run(&self, cypher: &str, params: &[(&str, Value)]) -> Result<Vec<Row>>;
}
