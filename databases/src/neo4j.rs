//! Neo4j graph store.
//!
//! Wraps a `neo4rs` connection pool behind the [`GraphStore`] trait and
//! converts Bolt rows into plain JSON maps so the rest of the system never
//! touches driver types.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chrono::{DateTime, Utc};
use neo4rs::{BoltType, ConfigBuilder, Graph};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::{GraphStore, Row};

/// Neo4j connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Neo4jConfig {
    /// Bolt connection URI
    pub uri: String,
    /// Username for authentication
    pub username: String,
    /// Password for authentication
    pub password: String,
    /// Database name (Neo4j 4.x+)
    pub database: String,
    /// Connection pool size
    pub pool_size: usize,
    /// Rows fetched per round-trip
    pub fetch_size: usize,
}

impl Default for Neo4jConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            username: "neo4j".to_string(),
            password: "password".to_string(),
            database: "neo4j".to_string(),
            pool_size: 5,
            fetch_size: 200,
        }
    }
}

/// Query statistics, accumulated across the store's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoreStats {
    /// Total queries executed
    pub queries_executed: u64,
    /// Total rows returned
    pub rows_returned: u64,
    /// Average query time in milliseconds
    pub avg_query_time_ms: f64,
    /// Last updated timestamp
    pub last_updated: Option<DateTime<Utc>>,
}

/// Neo4j-backed [`GraphStore`] with connection pooling.
#[derive(Clone)]
pub struct Neo4jStore {
    graph: Arc<Graph>,
    config: Arc<Neo4jConfig>,
    stats: Arc<RwLock<StoreStats>>,
}

impl Neo4jStore {
    /// Connect and verify the connection with a probe query.
    pub async fn connect(config: Neo4jConfig) -> Result<Self> {
        let driver_config = ConfigBuilder::default()
            .uri(&config.uri)
            .user(&config.username)
            .password(&config.password)
            .db(config.database.as_str())
            .max_connections(config.pool_size)
            .fetch_size(config.fetch_size)
            .build()
            .map_err(|e| anyhow::anyhow!("invalid Neo4j configuration: {e}"))?;

        let graph = Arc::new(
            Graph::connect(driver_config)
                .await
                .map_err(|e| anyhow::anyhow!("failed to connect to Neo4j at {}: {e}", config.uri))?,
        );

        let store = Self {
            graph,
            config: Arc::new(config),
            stats: Arc::new(RwLock::new(StoreStats::default())),
        };

        store.probe().await?;
        info!("Connected to Neo4j at {}", store.config.uri);
        Ok(store)
    }

    /// Round-trip a trivial query to confirm the server is reachable.
    async fn probe(&self) -> Result<()> {
        let rows = self.run("RETURN 1 AS ok", &[]).await?;
        let ok = rows
            .first()
            .and_then(|row| row.get("ok"))
            .and_then(Value::as_i64)
            == Some(1);
        if ok {
            Ok(())
        } else {
            Err(anyhow::anyhow!("Neo4j probe query returned an unexpected result"))
        }
    }

    /// Snapshot of accumulated query statistics.
    pub async fn stats(&self) -> StoreStats {
        self.stats.read().await.clone()
    }

    pub fn config(&self) -> &Neo4jConfig {
        &self.config
    }

    async fn record_query(&self, rows: usize, elapsed_ms: u64) {
        let mut stats = self.stats.write().await;
        stats.queries_executed += 1;
        stats.rows_returned += rows as u64;
        stats.avg_query_time_ms = ((stats.avg_query_time_ms
            * (stats.queries_executed - 1) as f64)
            + elapsed_ms as f64)
            / stats.queries_executed as f64;
        stats.last_updated = Some(Utc::now());
    }
}

#[async_trait::async_trait]
impl GraphStore for Neo4jStore {
    async fn run(&self, cypher: &str, params: &[(&str, Value)]) -> Result<Vec<Row>> {
        let start = Instant::now();
        debug!("Executing graph query: {cypher}");

        let mut query = neo4rs::query(cypher);
        for (key, value) in params {
            query = query.param::<BoltType>(key, to_bolt(value));
        }

        let mut result = self
            .graph
            .execute(query)
            .await
            .map_err(|e| anyhow::anyhow!("query execution failed: {e}"))?;

        let mut rows = Vec::new();
        while let Ok(Some(row)) = result.next().await {
            let row: Row = row
                .to()
                .map_err(|e| anyhow::anyhow!("row conversion failed: {e}"))?;
            rows.push(row);
        }

        let elapsed_ms = start.elapsed().as_millis() as u64;
        self.record_query(rows.len(), elapsed_ms).await;

        debug!("Query returned {} rows in {elapsed_ms}ms", rows.len());
        Ok(rows)
    }
}

/// Convert a JSON parameter value to its Bolt representation.
fn to_bolt(value: &Value) -> BoltType {
    match value {
        Value::String(s) => s.clone().into(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.into()
            } else {
                n.as_f64().unwrap_or(0.0).into()
            }
        }
        Value::Bool(b) => (*b).into(),
        other => other.to_string().into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_config() {
        let config = Neo4jConfig::default();
        assert_eq!(config.uri, "bolt://localhost:7687");
        assert_eq!(config.username, "neo4j");
        assert_eq!(config.database, "neo4j");
        assert_eq!(config.pool_size, 5);
    }

    #[test]
    fn test_to_bolt_conversions() {
        assert!(matches!(to_bolt(&json!("West Side Crew")), BoltType::String(_)));
        assert!(matches!(to_bolt(&json!(42)), BoltType::Integer(_)));
        assert!(matches!(to_bolt(&json!(0.5)), BoltType::Float(_)));
        assert!(matches!(to_bolt(&json!(true)), BoltType::Boolean(_)));
    }

    #[tokio::test]
    #[ignore] // Integration test requiring a running Neo4j instance
    async fn test_connect_and_query() {
        let store = Neo4jStore::connect(Neo4jConfig::default()).await.unwrap();

        let rows = store
            .run("RETURN $greeting AS greeting", &[("greeting", json!("hello"))])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["greeting"], json!("hello"));

        let stats = store.stats().await;
        assert!(stats.queries_executed >= 2); // probe + query
    }
}
