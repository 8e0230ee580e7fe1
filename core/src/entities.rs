//! Entity extraction from investigator questions.
//!
//! Locations and organizations are matched against gazetteers fetched from
//! the live graph, so any indexed name is found at the cost of a linear scan.
//! Person names come from a two-token capitalization heuristic: it misses
//! single-word aliases and can emit capitalized non-name phrases. That
//! trade-off is accepted, not a bug to fix here.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use casegraph_databases::GraphStore;

/// Crime-type vocabulary, mirroring the `type`/`subtype` values loaded into
/// the graph.
const CRIME_TYPE_VOCABULARY: &[&str] = &[
    "theft",
    "battery",
    "criminal damage",
    "assault",
    "burglary",
    "robbery",
    "narcotics",
    "vehicle theft",
    "carjacking",
    "weapons violation",
    "trespass",
    "vandalism",
    "homicide",
];

/// Capitalized tokens the person-name heuristic must never treat as part of
/// a name.
const NAME_STOP_LIST: &[&str] = &[
    "i", "chicago", "detective", "officer", "side", "gang", "crew", "street",
    "show", "his", "her", "their", "the", "who", "what", "which", "where",
    "when", "why", "how", "tell", "find", "list", "give", "does", "is", "are",
];

/// Entity mentions recognized in a span of text. Lists are deduplicated and
/// keep first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEntities {
    pub locations: Vec<String>,
    pub persons: Vec<String>,
    pub organizations: Vec<String>,
    pub crime_types: Vec<String>,
}

impl ExtractedEntities {
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
            && self.persons.is_empty()
            && self.organizations.is_empty()
            && self.crime_types.is_empty()
    }

    /// Union `other` into `self`. Existing mentions win on order; duplicates
    /// are dropped case-insensitively.
    pub fn merge(&mut self, other: ExtractedEntities) {
        for location in other.locations {
            push_unique(&mut self.locations, location);
        }
        for person in other.persons {
            push_unique(&mut self.persons, person);
        }
        for organization in other.organizations {
            push_unique(&mut self.organizations, organization);
        }
        for crime_type in other.crime_types {
            push_unique(&mut self.crime_types, crime_type);
        }
    }
}

fn push_unique(list: &mut Vec<String>, candidate: String) {
    if !list.iter().any(|e| e.eq_ignore_ascii_case(&candidate)) {
        list.push(candidate);
    }
}

/// Recognizes entity mentions using graph-backed gazetteers and lexical
/// heuristics.
pub struct EntityExtractor {
    store: Arc<dyn GraphStore>,
}

impl EntityExtractor {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    /// Extract every recognizable entity mention from `text`.
    pub async fn extract(&self, text: &str) -> ExtractedEntities {
        let lowered = text.to_lowercase();

        let mut entities = ExtractedEntities {
            locations: self
                .match_gazetteer(
                    &lowered,
                    "MATCH (l:Location) RETURN l.name AS name ORDER BY name",
                    "location",
                )
                .await,
            persons: extract_person_names(text),
            organizations: self
                .match_gazetteer(
                    &lowered,
                    "MATCH (o:Organization) RETURN o.name AS name ORDER BY name",
                    "organization",
                )
                .await,
            crime_types: Vec::new(),
        };

        for crime_type in CRIME_TYPE_VOCABULARY {
            if lowered.contains(crime_type) {
                push_unique(&mut entities.crime_types, (*crime_type).to_string());
            }
        }

        debug!(
            "Extracted {} locations, {} persons, {} organizations, {} crime types",
            entities.locations.len(),
            entities.persons.len(),
            entities.organizations.len(),
            entities.crime_types.len()
        );
        entities
    }

    /// Case-insensitive substring match of the question against every name
    /// the graph currently stores for one category. A failed catalog fetch
    /// degrades to no matches for that category, never an error.
    async fn match_gazetteer(&self, lowered: &str, cypher: &str, kind: &str) -> Vec<String> {
        let rows = match self.store.run(cypher, &[]).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!("{kind} gazetteer unavailable, skipping {kind} extraction: {e}");
                return Vec::new();
            }
        };

        let mut matched = Vec::new();
        for row in rows {
            if let Some(name) = row.get("name").and_then(Value::as_str) {
                if !name.is_empty() && lowered.contains(&name.to_lowercase()) {
                    push_unique(&mut matched, name.to_string());
                }
            }
        }
        matched
    }
}

/// Two-token capitalization rule: a capitalized token outside the stop-list,
/// immediately followed by another, is emitted as one "First Last" candidate
/// and both tokens are consumed. Single capitalized tokens are not emitted.
pub fn extract_person_names(text: &str) -> Vec<String> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let mut names = Vec::new();

    let mut i = 0;
    while i < tokens.len() {
        let first = strip_punctuation(tokens[i]);
        if is_name_token(first) && i + 1 < tokens.len() {
            let second = strip_punctuation(tokens[i + 1]);
            if is_name_token(second) {
                push_unique(&mut names, format!("{first} {second}"));
                i += 2;
                continue;
            }
        }
        i += 1;
    }
    names
}

fn strip_punctuation(token: &str) -> &str {
    token.trim_matches(|c: char| !c.is_alphanumeric())
}

fn is_name_token(token: &str) -> bool {
    let starts_upper = token.chars().next().is_some_and(|c| c.is_uppercase());
    starts_upper && !NAME_STOP_LIST.contains(&token.to_lowercase().as_str())
}
