//! SQL Generation and Execution Step
//!
//! Turns a question into one SQL statement via the completion service, runs
//! it, and classifies any engine failure so the correction loop can act on it.

use crate::error::{AssistantError, Result};
use crate::llm::{ChatMessage, CompletionService};
use crate::prompts;
use crate::sql::dialect::SqlDialect;
use crate::sql::error_classifier::{ErrorClassifier, SqlErrorCategory};
use crate::sql::executor::QueryExecutor;
use crate::sql::extract::strip_code_fences;
use crate::sql::rows::ResultSet;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Classified engine failure for one statement
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SqlFailure {
    pub message: String,
    pub category: SqlErrorCategory,
    pub hint: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Rows(ResultSet),
    Failed(SqlFailure),
}

/// One executed statement and what came back
#[derive(Debug, Clone, PartialEq)]
pub struct SqlAttempt {
    pub sql: String,
    pub attempt_number: u8,
    pub outcome: AttemptOutcome,
}

impl SqlAttempt {
    pub fn success(&self) -> bool {
        matches!(self.outcome, AttemptOutcome::Rows(_))
    }

    pub fn rows(&self) -> Option<&ResultSet> {
        match &self.outcome {
            AttemptOutcome::Rows(rows) => Some(rows),
            AttemptOutcome::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&SqlFailure> {
        match &self.outcome {
            AttemptOutcome::Rows(_) => None,
            AttemptOutcome::Failed(failure) => Some(failure),
        }
    }
}

/// Generates and runs SQL for a question
#[derive(Clone)]
pub struct SqlGenerator {
    llm: Arc<dyn CompletionService>,
    executor: Arc<dyn QueryExecutor>,
    classifier: ErrorClassifier,
}

impl SqlGenerator {
    pub fn new(llm: Arc<dyn CompletionService>, executor: Arc<dyn QueryExecutor>) -> Self {
        Self {
            llm,
            executor,
            classifier: ErrorClassifier::new(),
        }
    }

    pub fn dialect(&self) -> SqlDialect {
        self.executor.dialect()
    }

    /// Ask the completion service for a raw SQL string.
    ///
    /// `history` is replayed between the instructions and the question so
    /// follow-ups like "which of those..." can be resolved.
    pub async fn generate_sql(
        &self,
        question: &str,
        schema: &str,
        history: &[ChatMessage],
    ) -> Result<String> {
        let dialect = self.dialect();
        let mut messages = Vec::with_capacity(history.len() + 3);
        messages.push(ChatMessage::system(prompts::ontology_system_prompt(dialect)));
        messages.push(ChatMessage::system(prompts::generation_instructions(schema, dialect)));
        messages.extend_from_slice(history);
        messages.push(ChatMessage::user(question));

        let completion = self
            .llm
            .complete(&messages)
            .await
            .map_err(|e| AssistantError::Generation(format!("Error generating SQL: {}", e)))?;

        let sql = strip_code_fences(&completion);
        if sql.is_empty() {
            return Err(AssistantError::Generation(
                "The completion service returned no SQL".to_string(),
            ));
        }

        debug!("Generated SQL: {}", sql);
        Ok(sql)
    }

    /// Execute one statement and classify a failure
    pub async fn execute(&self, sql: &str, attempt_number: u8) -> SqlAttempt {
        let outcome = match self.executor.execute(sql).await {
            Ok(rows) => {
                info!("Attempt {}: retrieved {} rows", attempt_number, rows.row_count());
                AttemptOutcome::Rows(rows)
            }
            Err(e) => {
                let classified = self.classifier.classify(&e.message);
                warn!(
                    "Attempt {}: {} - {}",
                    attempt_number, classified.category, e.message
                );
                AttemptOutcome::Failed(SqlFailure {
                    message: e.message,
                    category: classified.category,
                    hint: classified.hint,
                })
            }
        };

        SqlAttempt {
            sql: sql.to_string(),
            attempt_number,
            outcome,
        }
    }

    /// Generate SQL for the question and execute it.
    ///
    /// Returns `Err` only when no SQL could be generated; engine failures are
    /// part of the returned attempt.
    pub async fn generate_and_run(
        &self,
        question: &str,
        schema: &str,
        history: &[ChatMessage],
        attempt_number: u8,
    ) -> Result<SqlAttempt> {
        let sql = self.generate_sql(question, schema, history).await?;
        Ok(self.execute(&sql, attempt_number).await)
    }
}
