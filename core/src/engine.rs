//! Session orchestrator: the engine's public entry point.
//!
//! One call runs the whole pipeline: extract entities from the question,
//! recall entities from recent history, merge, compute baseline statistics,
//! dispatch and execute the selected catalog queries with per-query failure
//! isolation, assemble the context bundle, and generate the answer. The
//! engine keeps no per-request state, so one instance serves concurrent
//! callers behind an `Arc`.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use casegraph_databases::GraphStore;

use crate::catalog::{resolve_person_name, IntentDispatcher, DATABASE_STATS_QUERY};
use crate::config::RetrievalLimits;
use crate::context::{field_i64, ContextBundle, DatabaseStats};
use crate::entities::EntityExtractor;
use crate::generate::AnswerGenerator;
use crate::llm::ChatBackend;
use crate::memory::{ConversationMemory, Turn};

/// The single precondition failure; every other problem degrades into a
/// partial or fallback answer instead of an error.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("question must not be empty")]
    EmptyQuestion,
}

/// One executed query, recorded for transparency and audit.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutedQuery {
    pub name: String,
    pub cypher: String,
}

/// The engine's response: answer text plus everything needed to verify it.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub answer: String,
    /// Bundle keys the answer may draw from.
    pub sources: Vec<String>,
    /// Ordered record of every query issued for this request.
    pub cypher_queries: Vec<ExecutedQuery>,
    pub context: ContextBundle,
}

/// Conversational graph-grounded retrieval engine.
pub struct GraphRagEngine {
    store: Arc<dyn GraphStore>,
    extractor: EntityExtractor,
    memory: ConversationMemory,
    dispatcher: IntentDispatcher,
    generator: AnswerGenerator,
    entity_cap: usize,
}

impl GraphRagEngine {
    /// Build an engine with default retrieval limits.
    pub fn new(store: Arc<dyn GraphStore>, backend: Option<Arc<dyn ChatBackend>>) -> Self {
        Self::with_limits(store, backend, RetrievalLimits::default(), 0.3, 600)
    }

    /// Build an engine with explicit limits and decoding settings.
    pub fn with_limits(
        store: Arc<dyn GraphStore>,
        backend: Option<Arc<dyn ChatBackend>>,
        limits: RetrievalLimits,
        temperature: f64,
        max_tokens: usize,
    ) -> Self {
        if backend.is_none() {
            info!("No generation backend configured; deterministic strategy is pinned");
        }
        Self {
            extractor: EntityExtractor::new(Arc::clone(&store)),
            memory: ConversationMemory::new(limits.history_window),
            dispatcher: IntentDispatcher::new(limits.entity_cap),
            generator: AnswerGenerator::new(backend, temperature, max_tokens),
            entity_cap: limits.entity_cap,
            store,
        }
    }

    pub fn has_backend(&self) -> bool {
        self.generator.has_backend()
    }

    /// Answer a standalone question.
    pub async fn ask(&self, question: &str) -> Result<Answer, EngineError> {
        self.ask_with_context(question, &[]).await
    }

    /// Answer a question in the context of a conversation.
    pub async fn ask_with_context(
        &self,
        question: &str,
        history: &[Turn],
    ) -> Result<Answer, EngineError> {
        if question.trim().is_empty() {
            return Err(EngineError::EmptyQuestion);
        }
        debug!("Processing question: {question}");

        let mut entities = self.extractor.extract(question).await;
        let recalled = self.memory.recall(&self.extractor, history).await;
        entities.merge(recalled);

        // Resolve heuristic person candidates against the graph; candidates
        // with no match simply drop out.
        let mut resolved_persons = Vec::new();
        for surface in entities.persons.iter().take(self.entity_cap) {
            if let Some(stored) = resolve_person_name(self.store.as_ref(), surface).await {
                resolved_persons.push((surface.clone(), stored));
            }
        }

        let mut bundle = ContextBundle::default();
        let mut executed = Vec::new();

        self.collect_baseline_stats(&mut bundle, &mut executed).await;

        let planned = self.dispatcher.select(question, &entities, &resolved_persons);
        debug!("Dispatcher selected {} queries", planned.len());

        for query in planned {
            executed.push(ExecutedQuery {
                name: query.name.clone(),
                cypher: query.cypher.clone(),
            });
            // One failed query never aborts its siblings or the request.
            match self.store.run(&query.cypher, &query.params).await {
                Ok(rows) => {
                    bundle.insert_rows(query.context_key, rows, query.row_cap);
                }
                Err(e) => {
                    warn!("query '{}' failed, omitting from context: {e}", query.name);
                }
            }
        }

        debug!("Assembled {} context keys", bundle.len());
        let answer = self.generator.generate(question, &bundle, history).await;

        Ok(Answer {
            answer,
            sources: bundle.keys(),
            cypher_queries: executed,
            context: bundle,
        })
    }

    /// Baseline aggregate counts, always attempted first so the bundle has
    /// an anchor even when no intent matches.
    async fn collect_baseline_stats(
        &self,
        bundle: &mut ContextBundle,
        executed: &mut Vec<ExecutedQuery>,
    ) {
        executed.push(ExecutedQuery {
            name: "Database Stats".to_string(),
            cypher: DATABASE_STATS_QUERY.to_string(),
        });
        match self.store.run(DATABASE_STATS_QUERY, &[]).await {
            Ok(rows) => {
                if let Some(row) = rows.first() {
                    bundle.insert_stats(DatabaseStats {
                        total_crimes: field_i64(row, "total_crimes").unwrap_or(0),
                        total_persons: field_i64(row, "total_persons").unwrap_or(0),
                        total_organizations: field_i64(row, "total_organizations").unwrap_or(0),
                        total_locations: field_i64(row, "total_locations").unwrap_or(0),
                    });
                }
            }
            Err(e) => warn!("baseline statistics unavailable: {e}"),
        }
    }
}
