//! casegraph-core — conversational graph-grounded retrieval.
//!
//! Turns free-text investigator questions into a bounded set of Cypher
//! queries against a crime knowledge graph, assembles the results into a
//! context bundle, and produces an answer that only asserts facts present in
//! that bundle. Multi-turn conversations work by re-deriving entity mentions
//! from recent history.
//!
//! The pipeline, one direction per request:
//!
//! text -> extracted entities -> dispatched query set -> context bundle
//!      -> generated (or deterministic fallback) answer
//!
//! External collaborators are injected at construction: a
//! [`casegraph_databases::GraphStore`] for retrieval and an optional
//! [`llm::ChatBackend`] for generation.

pub mod catalog;
pub mod config;
pub mod context;
pub mod engine;
pub mod entities;
pub mod generate;
pub mod llm;
pub mod memory;

pub use config::EngineConfig;
pub use context::{ContextBundle, ContextValue, DatabaseStats};
pub use engine::{Answer, EngineError, ExecutedQuery, GraphRagEngine};
pub use entities::{EntityExtractor, ExtractedEntities};
pub use llm::{ChatBackend, ChatMessage, LlmClient, LlmConfig, LlmProvider};
pub use memory::{ConversationMemory, Role, Turn};
