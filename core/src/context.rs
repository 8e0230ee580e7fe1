//! The context bundle: per-request retrieval results, keyed by category.
//!
//! The bundle is the sole grounding source for answer generation. Two
//! invariants hold for every bundle: keys are only inserted with non-empty
//! data (presence means "data exists"), and every list is capped to its
//! query's row budget.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use casegraph_databases::Row;

/// Bundle key for the always-present baseline statistics.
pub const DATABASE_STATS_KEY: &str = "database_stats";

/// Baseline aggregate counts, computed at the start of every request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseStats {
    pub total_crimes: i64,
    pub total_persons: i64,
    pub total_organizations: i64,
    pub total_locations: i64,
}

/// One bundle entry: either the scalar statistics object or result rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ContextValue {
    Stats(DatabaseStats),
    Rows(Vec<Row>),
}

/// Insertion-ordered mapping from context key to retrieved data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextBundle {
    entries: Vec<(String, ContextValue)>,
}

impl ContextBundle {
    pub fn insert_stats(&mut self, stats: DatabaseStats) {
        self.entries
            .push((DATABASE_STATS_KEY.to_string(), ContextValue::Stats(stats)));
    }

    /// Insert `rows` under `key`, truncated to `cap`. Empty results are
    /// dropped so key presence always implies data. Returns whether the key
    /// was stored.
    pub fn insert_rows(&mut self, key: impl Into<String>, mut rows: Vec<Row>, cap: usize) -> bool {
        if rows.is_empty() {
            return false;
        }
        rows.truncate(cap);
        self.entries.push((key.into(), ContextValue::Rows(rows)));
        true
    }

    pub fn get(&self, key: &str) -> Option<&ContextValue> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn rows(&self, key: &str) -> Option<&[Row]> {
        match self.get(key)? {
            ContextValue::Rows(rows) => Some(rows),
            ContextValue::Stats(_) => None,
        }
    }

    pub fn stats(&self) -> Option<DatabaseStats> {
        match self.get(DATABASE_STATS_KEY)? {
            ContextValue::Stats(stats) => Some(*stats),
            ContextValue::Rows(_) => None,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|(k, _)| k.clone()).collect()
    }

    /// Keys with the given prefix and suffix, e.g. per-location suspect
    /// lists (`loc_*_suspects`).
    pub fn keys_matching(&self, prefix: &str, suffix: &str) -> Vec<&str> {
        self.entries
            .iter()
            .map(|(k, _)| k.as_str())
            .filter(|k| k.starts_with(prefix) && k.ends_with(suffix) && k.len() > prefix.len() + suffix.len())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ContextValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Serialize the bundle for the generation prompt: every list carries a
    /// visible item count and at most `preview_rows` rows, so exact counts
    /// stay inspectable even when previews truncate.
    pub fn to_prompt_block(&self, preview_rows: usize) -> String {
        let mut block = String::from("=== DATABASE RESULTS ===\n\n");
        for (key, value) in &self.entries {
            block.push_str(&key.to_uppercase());
            block.push_str(":\n");
            match value {
                ContextValue::Stats(stats) => {
                    block.push_str(&format!(
                        "{}\n",
                        serde_json::to_string_pretty(stats).unwrap_or_default()
                    ));
                }
                ContextValue::Rows(rows) => {
                    block.push_str(&format!("Count: {}\n", rows.len()));
                    for row in rows.iter().take(preview_rows) {
                        block.push_str(&format!(
                            "  - {}\n",
                            serde_json::to_string(row).unwrap_or_default()
                        ));
                    }
                    if rows.len() > preview_rows {
                        block.push_str(&format!(
                            "  ({} further rows omitted from preview)\n",
                            rows.len() - preview_rows
                        ));
                    }
                }
            }
            block.push('\n');
        }
        block
    }
}

impl Serialize for ContextBundle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// String field accessor for a result row.
pub fn field_str<'a>(row: &'a Row, key: &str) -> Option<&'a str> {
    row.get(key).and_then(Value::as_str)
}

/// Integer field accessor for a result row.
pub fn field_i64(row: &Row, key: &str) -> Option<i64> {
    row.get(key).and_then(Value::as_i64)
}

/// Float field accessor for a result row; integers widen.
pub fn field_f64(row: &Row, key: &str) -> Option<f64> {
    row.get(key).and_then(Value::as_f64)
}
