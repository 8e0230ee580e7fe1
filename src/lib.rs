//! casegraph — conversational graph-grounded retrieval over a crime
//! knowledge graph.
//!
//! Thin facade over the workspace crates; the binary and the integration
//! tests go through these re-exports.

pub use casegraph_core::{
    Answer, ChatBackend, ChatMessage, ContextBundle, ContextValue, DatabaseStats, EngineConfig,
    EngineError, EntityExtractor, ExecutedQuery, ExtractedEntities, GraphRagEngine, LlmClient,
    LlmConfig, LlmProvider, Role, Turn,
};

pub use casegraph_core::{catalog, config, context, engine, entities, generate, llm, memory};

pub use casegraph_databases::{GraphStore, Neo4jConfig, Neo4jStore, Row};
