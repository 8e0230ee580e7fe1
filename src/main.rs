//! casegraph CLI — interactive investigator console.
//!
//! Wires configuration, the Neo4j store and the optional generation backend
//! into a [`GraphRagEngine`], then either answers a single question or runs
//! a line-oriented conversation loop.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use casegraph::{Answer, ChatBackend, GraphRagEngine, LlmClient, Neo4jStore, Turn};
use casegraph_core::EngineConfig;

#[derive(Parser)]
#[command(
    name = "casegraph",
    version,
    about = "Conversational investigator console over a crime knowledge graph"
)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Ask a single question and exit
    #[arg(long, short = 'q')]
    question: Option<String>,

    /// Print the executed Cypher queries after each answer
    #[arg(long)]
    show_queries: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = EngineConfig::load(args.config.as_deref())?;

    let store = Arc::new(Neo4jStore::connect(config.neo4j.clone()).await?);

    let backend: Option<Arc<dyn ChatBackend>> = match LlmClient::from_config(&config.llm) {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            warn!("generation backend unavailable, answers use the deterministic strategy: {e}");
            None
        }
    };

    let engine = GraphRagEngine::with_limits(
        store,
        backend,
        config.retrieval.clone(),
        config.llm.temperature,
        config.llm.max_tokens,
    );

    match args.question {
        Some(question) => {
            let answer = engine.ask(&question).await?;
            print_answer(&answer, args.show_queries);
        }
        None => run_console(&engine, args.show_queries).await?,
    }

    Ok(())
}

/// Line-oriented conversation loop. The console owns the turn history; the
/// engine stays stateless.
async fn run_console(engine: &GraphRagEngine, show_queries: bool) -> Result<()> {
    println!("casegraph console — ask about the case graph, 'quit' to exit");

    let stdin = std::io::stdin();
    let mut history: Vec<Turn> = Vec::new();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if matches!(question, "quit" | "exit" | "q") {
            break;
        }

        match engine.ask_with_context(question, &history).await {
            Ok(answer) => {
                print_answer(&answer, show_queries);
                history.push(Turn::user(question));
                history.push(Turn::assistant(answer.answer));
            }
            Err(e) => eprintln!("error: {e}"),
        }
    }

    Ok(())
}

fn print_answer(answer: &Answer, show_queries: bool) {
    println!("\n{}\n", answer.answer);
    println!("sources: {}", answer.sources.join(", "));
    if show_queries {
        for query in &answer.cypher_queries {
            println!("\n[{}]\n{}", query.name, query.cypher);
        }
    }
    println!();
}
