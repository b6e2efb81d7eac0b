use meddata_assistant::schema::{OntologySchemaProvider, SchemaProvider};
use meddata_assistant::session::{new_session_id, InMemorySessionStore, SessionStore};
use meddata_assistant::sql::SqliteExecutor;
use meddata_assistant::{AssistantConfig, AssistantContext, AssistantResponse, IntentClassifier, LlmClient};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "meddata-assistant")]
#[command(about = "Ask natural-language questions about the medical ontology")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show how a question would be routed (no network calls)
    Route {
        question: String,
    },
    /// Print the schema description of an ontology snapshot
    Schema {
        /// SQLite ontology snapshot (or set MEDDATA_DB_PATH)
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Answer a single question
    Ask {
        question: String,

        /// SQLite ontology snapshot (or set MEDDATA_DB_PATH)
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Interactive conversation with memory
    Chat {
        /// SQLite ontology snapshot (or set MEDDATA_DB_PATH)
        #[arg(long)]
        db: Option<PathBuf>,

        /// Write the conversation memory here on exit
        #[arg(long)]
        export: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    match args.command {
        Commands::Route { question } => {
            let decision = IntentClassifier::new().analyze(&question);
            println!("{}", serde_json::to_string_pretty(&decision)?);
            println!("route: {:?}", decision.route());
            println!("{}", decision.status_message());
            Ok(())
        }
        Commands::Schema { db } => {
            let executor = open_snapshot(db)?;
            let schema = OntologySchemaProvider::new(executor).describe().await?;
            println!("{}", schema);
            Ok(())
        }
        Commands::Ask { question, db } => {
            let store = build_store(db).await?;
            let session = store.get_or_create(&new_session_id());
            let response = session.lock().await.route_and_answer(&question).await;
            print_response(&response);
            Ok(())
        }
        Commands::Chat { db, export } => run_chat(db, export).await,
    }
}

fn snapshot_path(db: Option<PathBuf>) -> Result<PathBuf> {
    db.or_else(|| std::env::var("MEDDATA_DB_PATH").ok().map(PathBuf::from))
        .context("No ontology snapshot: pass --db or set MEDDATA_DB_PATH")
}

fn open_snapshot(db: Option<PathBuf>) -> Result<Arc<SqliteExecutor>> {
    let path = snapshot_path(db)?;
    info!("Opening ontology snapshot {}", path.display());
    let executor = SqliteExecutor::open(&path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    Ok(Arc::new(executor))
}

async fn build_store(db: Option<PathBuf>) -> Result<InMemorySessionStore> {
    let config = AssistantConfig::from_env()?;
    let executor = open_snapshot(db.or_else(|| config.database_path.clone()))?;
    let llm = Arc::new(LlmClient::new(config.llm.clone()));

    let schema = OntologySchemaProvider::new(executor.clone());
    let context = AssistantContext::load(llm, executor, &schema, config.pipeline.clone()).await?;
    Ok(InMemorySessionStore::new(context))
}

async fn run_chat(db: Option<PathBuf>, export: Option<PathBuf>) -> Result<()> {
    let store = build_store(db).await?;
    let session_id = new_session_id();
    let session = store.get_or_create(&session_id);

    println!("\n{}", "=".repeat(80));
    println!(" MEDDATA ASSISTANT (session {})", session_id);
    println!("{}", "=".repeat(80));
    println!(" Commands: 'memory' shows history, 'clear' resets it, 'quit' exits\n");

    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }

        let mut assistant = session.lock().await;
        match line.trim() {
            "" => continue,
            "quit" | "exit" => break,
            "memory" => {
                println!("{}", serde_json::to_string_pretty(&assistant.get_memory_summary())?);
            }
            "clear" => {
                assistant.clear_memory();
                println!("Memory cleared.");
            }
            question => {
                let response = assistant.route_and_answer(question).await;
                print_response(&response);
            }
        }
    }

    if let Some(path) = export {
        session.lock().await.export_memory(&path)?;
        println!("Conversation exported to {}", path.display());
    }
    Ok(())
}

fn print_response(response: &AssistantResponse) {
    println!("\n{}", "-".repeat(80));
    println!("{}", response.routing.status_message());
    if let Some(sql) = &response.sql {
        println!("\nSQL:\n{}", sql);
    }
    if let Some(count) = response.row_count {
        println!("\nRows: {}", count);
    }
    if response.was_corrected {
        println!("(corrected after {} attempts)", response.retry_attempts);
    }
    println!("\n{}", response.response);
    if let Some(error) = &response.error {
        println!("\nError: {}", error);
    }
    println!("{}", "-".repeat(80));
}
