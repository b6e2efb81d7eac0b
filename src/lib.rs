//! MedData Assistant
//!
//! Natural-language question answering over a slot-based medical ontology.
//! Questions are routed by a heuristic classifier, answered with generated
//! SQL (with a bounded self-correction loop) or general knowledge, analyzed,
//! remembered per session, and formatted for display.

pub mod assistant;
pub mod config;
pub mod correction;
pub mod error;
pub mod formatter;
pub mod llm;
pub mod memory;
pub mod ontology;
pub mod prompts;
pub mod router;
pub mod schema;
pub mod session;
pub mod sql;
pub mod synthesis;

pub use assistant::{AssistantContext, AssistantResponse, MedDataAssistant};
pub use config::AssistantConfig;
pub use error::{AssistantError, Result};
pub use llm::{ChatMessage, CompletionService, LlmClient, Role};
pub use router::{IntentClassifier, QueryIntent, Route, RoutingDecision};
pub use session::{InMemorySessionStore, SessionStore};
