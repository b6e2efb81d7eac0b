//! MedData Assistant
//!
//! One assistant per conversation. A question is classified, then answered
//! either from the ontology database (generate, execute, correct, analyze)
//! or from general knowledge. Every answered question is remembered so the
//! next one can refer back to it.

use crate::config::PipelineConfig;
use crate::correction::{CorrectionLoop, RecoveryOutcome};
use crate::error::Result;
use crate::formatter::{self, FormattedResponse};
use crate::llm::{ChatMessage, CompletionService};
use crate::memory::{Interaction, Memory, MemorySummary};
use crate::prompts;
use crate::router::{IntentClassifier, Route, RoutingDecision};
use crate::schema::SchemaProvider;
use crate::sql::error_classifier::SqlErrorCategory;
use crate::sql::executor::QueryExecutor;
use crate::sql::generator::{SqlFailure, SqlGenerator};
use crate::sql::rows::{ResultSet, Row};
use crate::synthesis::Synthesizer;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

const CORRECTED_NOTE: &str = "Note: This query was automatically corrected from an initial SQL error.";
const EMPTY_QUESTION: &str = "Please provide a question.";

/// Collaborators shared by every session
#[derive(Clone)]
pub struct AssistantContext {
    pub llm: Arc<dyn CompletionService>,
    pub executor: Arc<dyn QueryExecutor>,
    pub schema: Arc<str>,
    pub pipeline: PipelineConfig,
}

impl AssistantContext {
    pub fn new(
        llm: Arc<dyn CompletionService>,
        executor: Arc<dyn QueryExecutor>,
        schema: impl Into<Arc<str>>,
        pipeline: PipelineConfig,
    ) -> Self {
        Self {
            llm,
            executor,
            schema: schema.into(),
            pipeline,
        }
    }

    /// Build the context, reading the schema description once
    pub async fn load(
        llm: Arc<dyn CompletionService>,
        executor: Arc<dyn QueryExecutor>,
        schema: &dyn SchemaProvider,
        pipeline: PipelineConfig,
    ) -> Result<Self> {
        let text = schema.describe().await?;
        info!("Loaded schema description ({} chars)", text.len());
        Ok(Self::new(llm, executor, text, pipeline))
    }
}

/// Answer envelope returned to the caller
#[derive(Debug, Clone, Serialize)]
pub struct AssistantResponse {
    pub success: bool,
    pub question: String,
    pub sql: Option<String>,
    pub response: String,
    pub rows: Option<Vec<Row>>,
    pub row_count: Option<usize>,
    pub columns: Option<Vec<String>>,
    pub memory_size: usize,
    pub retry_attempts: u8,
    pub routing: RoutingDecision,
    pub was_corrected: bool,
    pub error: Option<String>,
    pub error_category: Option<SqlErrorCategory>,
    /// First engine failure of the turn, kept when later attempts differ
    pub original_error: Option<SqlFailure>,
    pub timestamp: DateTime<Utc>,
    pub display: FormattedResponse,
}

impl AssistantResponse {
    fn new(question: &str, routing: RoutingDecision, success: bool, response: String) -> Self {
        Self {
            success,
            question: question.to_string(),
            sql: None,
            display: formatter::format(&response),
            response,
            rows: None,
            row_count: None,
            columns: None,
            memory_size: 0,
            retry_attempts: 0,
            routing,
            was_corrected: false,
            error: None,
            error_category: None,
            original_error: None,
            timestamp: Utc::now(),
        }
    }

    fn with_rows(mut self, sql: String, rows: ResultSet) -> Self {
        self.sql = Some(sql);
        self.row_count = Some(rows.row_count());
        self.columns = Some(rows.columns);
        self.rows = Some(rows.rows);
        self
    }
}

pub struct MedDataAssistant {
    context: AssistantContext,
    classifier: IntentClassifier,
    correction: CorrectionLoop,
    synthesizer: Synthesizer,
    memory: Memory,
}

impl MedDataAssistant {
    pub fn new(context: AssistantContext) -> Self {
        let generator = SqlGenerator::new(Arc::clone(&context.llm), Arc::clone(&context.executor));
        let correction = CorrectionLoop::new(
            generator,
            Arc::clone(&context.llm),
            context.pipeline.max_attempts,
        );
        let synthesizer = Synthesizer::new(Arc::clone(&context.llm), &context.pipeline);

        Self {
            context,
            classifier: IntentClassifier::new(),
            correction,
            synthesizer,
            memory: Memory::new(),
        }
    }

    /// Route the question and answer it
    pub async fn route_and_answer(&mut self, question: &str) -> AssistantResponse {
        let question = question.trim();
        let routing = self.classifier.analyze(question);

        if question.is_empty() {
            let mut response = AssistantResponse::new(question, routing, false, EMPTY_QUESTION.to_string());
            response.error = Some(EMPTY_QUESTION.to_string());
            response.memory_size = self.memory.len();
            return response;
        }

        info!(
            "Routing {:?} (sql likelihood {:.2}, confidence {:.2}): {}",
            routing.intent,
            routing.sql_likelihood,
            routing.confidence,
            routing.status_message()
        );

        let mut response = match routing.route() {
            Route::SqlThenAnalysis => self.answer_from_data(question, routing).await,
            Route::KnowledgeOnly => self.answer_from_knowledge(question, routing).await,
        };
        response.memory_size = self.memory.len();
        response
    }

    async fn answer_from_data(&mut self, question: &str, routing: RoutingDecision) -> AssistantResponse {
        let pipeline = &self.context.pipeline;
        let history = self.memory.recent_messages(pipeline.history_exchanges);
        let outcome = self
            .correction
            .run_with_recovery(question, &self.context.schema, &history)
            .await;
        let attempts = outcome.attempts();

        match outcome {
            RecoveryOutcome::GenerationFailed { message } => {
                let mut response = AssistantResponse::new(
                    question,
                    routing,
                    false,
                    format!("I couldn't generate a database query for that question. {}", message),
                );
                response.error = Some(message);
                response.retry_attempts = attempts;
                response
            }
            RecoveryOutcome::Exhausted { last_sql, last_error, original_error, explanation, .. } => {
                let mut response = AssistantResponse::new(question, routing, false, explanation);
                response.sql = Some(last_sql);
                response.error = Some(last_error.message);
                response.error_category = Some(last_error.category);
                response.original_error = Some(original_error);
                response.retry_attempts = attempts;
                response
            }
            RecoveryOutcome::Succeeded { sql, rows, was_corrected, original_error, .. } => {
                let recent = self.memory.recent_context(pipeline.context_interactions);
                let synthesis = self.synthesizer.synthesize(question, &rows, &recent).await;

                let mut text = synthesis.answer.clone();
                if was_corrected {
                    text.push_str("\n\n");
                    text.push_str(CORRECTED_NOTE);
                }

                self.memory.append(Interaction::new(
                    question,
                    Some(sql.clone()),
                    rows.clone(),
                    rows.summary_text(),
                    synthesis.answer,
                ));

                let mut response =
                    AssistantResponse::new(question, routing, true, text).with_rows(sql, rows);
                response.retry_attempts = attempts;
                response.was_corrected = was_corrected;
                response.original_error = original_error;
                response
            }
        }
    }

    async fn answer_from_knowledge(&mut self, question: &str, routing: RoutingDecision) -> AssistantResponse {
        let recent = self.memory.recent_context(self.context.pipeline.context_interactions);
        let messages = [
            ChatMessage::system(prompts::GENERAL_KNOWLEDGE_SYSTEM_PROMPT),
            ChatMessage::user(prompts::knowledge_prompt(question, &recent, routing.format_instructions())),
        ];

        match self.context.llm.complete(&messages).await {
            Ok(answer) => {
                self.memory.append(Interaction::new(
                    question,
                    None,
                    ResultSet::default(),
                    String::new(),
                    answer.clone(),
                ));
                AssistantResponse::new(question, routing, true, answer)
            }
            Err(e) => {
                warn!("Knowledge answer failed: {}", e);
                let mut response = AssistantResponse::new(
                    question,
                    routing,
                    false,
                    "I couldn't answer that question right now. Please try again.".to_string(),
                );
                response.error = Some(e.to_string());
                response
            }
        }
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn get_memory_summary(&self) -> MemorySummary {
        self.memory.summary()
    }

    pub fn clear_memory(&mut self) {
        self.memory.clear();
    }

    pub fn export_memory(&self, path: impl AsRef<Path>) -> Result<()> {
        self.memory.export(path)
    }
}
