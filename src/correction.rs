//! Correction Loop
//!
//! Bounded retry over the SQL step. A failed statement is sent back to the
//! completion service for diagnosis; SQL extracted from the reply runs as
//! the next attempt. When nothing usable comes back, the next attempt
//! regenerates from the question instead. Once the attempt budget is spent,
//! the user gets a plain-language explanation of what went wrong.
//!
//! No more than `max_attempts` statements are executed per question.

use crate::llm::{ChatMessage, CompletionService};
use crate::prompts;
use crate::sql::error_classifier::SqlErrorCategory;
use crate::sql::extract::extract_corrected_sql;
use crate::sql::generator::{AttemptOutcome, SqlAttempt, SqlFailure, SqlGenerator};
use crate::sql::rows::ResultSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Next move after an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Succeed,
    Correct,
    Exhaust,
}

/// State transition after attempt `attempt_number` of `max_attempts`
pub fn transition(success: bool, attempt_number: u8, max_attempts: u8) -> Step {
    if success {
        Step::Succeed
    } else if attempt_number < max_attempts {
        Step::Correct
    } else {
        Step::Exhaust
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryOutcome {
    Succeeded {
        sql: String,
        rows: ResultSet,
        attempts: u8,
        /// The rows came from SQL proposed by a correction
        was_corrected: bool,
        original_error: Option<SqlFailure>,
    },
    Exhausted {
        last_sql: String,
        last_error: SqlFailure,
        original_error: SqlFailure,
        attempts: u8,
        explanation: String,
    },
    /// No SQL could be generated for the first attempt
    GenerationFailed { message: String },
}

impl RecoveryOutcome {
    pub fn success(&self) -> bool {
        matches!(self, RecoveryOutcome::Succeeded { .. })
    }

    pub fn attempts(&self) -> u8 {
        match self {
            RecoveryOutcome::Succeeded { attempts, .. } => *attempts,
            RecoveryOutcome::Exhausted { attempts, .. } => *attempts,
            RecoveryOutcome::GenerationFailed { .. } => 1,
        }
    }
}

pub struct CorrectionLoop {
    generator: SqlGenerator,
    llm: Arc<dyn CompletionService>,
    max_attempts: u8,
}

impl CorrectionLoop {
    pub fn new(generator: SqlGenerator, llm: Arc<dyn CompletionService>, max_attempts: u8) -> Self {
        Self {
            generator,
            llm,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Answer the question with SQL, correcting failed statements
    pub async fn run_with_recovery(
        &self,
        question: &str,
        schema: &str,
        history: &[ChatMessage],
    ) -> RecoveryOutcome {
        let mut attempt = match self.generator.generate_and_run(question, schema, history, 1).await {
            Ok(attempt) => attempt,
            Err(e) => {
                warn!("SQL generation failed: {}", e);
                return RecoveryOutcome::GenerationFailed { message: e.to_string() };
            }
        };
        let mut original_error: Option<SqlFailure> = None;
        let mut from_fix = false;

        loop {
            let step = transition(attempt.success(), attempt.attempt_number, self.max_attempts);
            let failure = match (step, &attempt.outcome) {
                (Step::Succeed, AttemptOutcome::Rows(rows)) => {
                    info!("SQL succeeded on attempt {}", attempt.attempt_number);
                    return RecoveryOutcome::Succeeded {
                        rows: rows.clone(),
                        sql: attempt.sql,
                        attempts: attempt.attempt_number,
                        was_corrected: from_fix,
                        original_error,
                    };
                }
                (Step::Correct, AttemptOutcome::Failed(failure)) => failure.clone(),
                _ => {
                    let attempts = attempt.attempt_number;
                    return self.exhaust(question, attempt, original_error, attempts).await;
                }
            };

            let next = attempt.attempt_number + 1;
            if original_error.is_none() {
                original_error = Some(failure.clone());
            }

            info!(
                "Attempt {} failed with {}; requesting correction",
                attempt.attempt_number, failure.category
            );
            attempt = match self.propose_fix(question, &attempt.sql, &failure).await {
                Some(sql) => {
                    info!("Retrying with corrected SQL as attempt {}", next);
                    from_fix = true;
                    self.generator.execute(&sql, next).await
                }
                None => {
                    from_fix = false;
                    match self.generator.generate_and_run(question, schema, history, next).await {
                        Ok(regenerated) => regenerated,
                        Err(e) => {
                            warn!("Regeneration failed on attempt {}: {}", next, e);
                            return self.exhaust(question, attempt, original_error, next).await;
                        }
                    }
                }
            };
        }
    }

    async fn propose_fix(&self, question: &str, failed_sql: &str, failure: &SqlFailure) -> Option<String> {
        let dialect = self.generator.dialect();
        let prompt = prompts::correction_prompt(
            question,
            failed_sql,
            &failure.category.to_string(),
            &failure.message,
            &failure.hint,
            dialect,
        );
        let messages = [
            ChatMessage::system(prompts::GENERAL_KNOWLEDGE_SYSTEM_PROMPT),
            ChatMessage::user(prompt),
        ];

        match self.llm.complete(&messages).await {
            Ok(reply) => {
                let sql = extract_corrected_sql(&reply, dialect);
                if sql.is_none() {
                    warn!("No usable SQL in correction reply");
                }
                sql
            }
            Err(e) => {
                warn!("Correction request failed: {}", e);
                None
            }
        }
    }

    async fn exhaust(
        &self,
        question: &str,
        last: SqlAttempt,
        original_error: Option<SqlFailure>,
        attempts: u8,
    ) -> RecoveryOutcome {
        let last_error = last.failure().cloned().unwrap_or_else(|| SqlFailure {
            message: "Unknown error".to_string(),
            category: SqlErrorCategory::UnknownError,
            hint: String::new(),
        });
        warn!("All {} attempts exhausted: {}", attempts, last_error.message);

        let prompt = prompts::exhaustion_prompt(
            question,
            &last.sql,
            &last_error.category.to_string(),
            &last_error.message,
            &last_error.hint,
        );
        let messages = [
            ChatMessage::system(prompts::GENERAL_KNOWLEDGE_SYSTEM_PROMPT),
            ChatMessage::user(prompt),
        ];

        let fallback = || {
            format!(
                "I encountered a SQL error: {}. The system tried to: {}",
                last_error.message, last_error.hint
            )
        };
        let explanation = match self.llm.complete(&messages).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => fallback(),
            Err(e) => {
                warn!("Error explanation unavailable: {}", e);
                fallback()
            }
        };

        RecoveryOutcome::Exhausted {
            original_error: original_error.unwrap_or_else(|| last_error.clone()),
            last_sql: last.sql,
            last_error,
            attempts,
            explanation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AssistantError, Result};
    use crate::sql::dialect::SqlDialect;
    use crate::sql::executor::{EngineError, QueryExecutor};
    use crate::sql::rows::Row;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedLlm(Mutex<VecDeque<Result<String>>>);

    impl ScriptedLlm {
        fn new(replies: Vec<Result<String>>) -> Arc<Self> {
            Arc::new(Self(Mutex::new(replies.into())))
        }

        fn remaining(&self) -> usize {
            self.0.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl CompletionService for ScriptedLlm {
        async fn complete(&self, _messages: &[ChatMessage]) -> Result<String> {
            self.0
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(AssistantError::Llm("script exhausted".to_string())))
        }
    }

    struct ScriptedDb {
        results: Mutex<VecDeque<std::result::Result<ResultSet, EngineError>>>,
        executed: Mutex<Vec<String>>,
    }

    impl ScriptedDb {
        fn new(results: Vec<std::result::Result<ResultSet, EngineError>>) -> Arc<Self> {
            Arc::new(Self {
                results: Mutex::new(results.into()),
                executed: Mutex::new(Vec::new()),
            })
        }

        fn executed(&self) -> Vec<String> {
            self.executed.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl QueryExecutor for ScriptedDb {
        async fn execute(&self, sql: &str) -> std::result::Result<ResultSet, EngineError> {
            self.executed.lock().unwrap().push(sql.to_string());
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(EngineError::new("no scripted result")))
        }

        fn dialect(&self) -> SqlDialect {
            SqlDialect::Sqlite
        }
    }

    fn one_row() -> ResultSet {
        ResultSet::new(
            vec!["CODE".to_string()],
            vec![Row::from_iter([("CODE", Some("1302".to_string()))])],
        )
    }

    fn ok(text: &str) -> Result<String> {
        Ok(text.to_string())
    }

    fn correction_loop(llm: &Arc<ScriptedLlm>, db: &Arc<ScriptedDb>, max_attempts: u8) -> CorrectionLoop {
        let generator = SqlGenerator::new(llm.clone(), db.clone());
        CorrectionLoop::new(generator, llm.clone(), max_attempts)
    }

    #[test]
    fn test_transition_table() {
        assert_eq!(transition(true, 1, 2), Step::Succeed);
        assert_eq!(transition(true, 2, 2), Step::Succeed);
        assert_eq!(transition(false, 1, 2), Step::Correct);
        assert_eq!(transition(false, 2, 2), Step::Exhaust);
        assert_eq!(transition(false, 1, 1), Step::Exhaust);
    }

    #[tokio::test]
    async fn test_first_attempt_success() {
        let llm = ScriptedLlm::new(vec![ok("SELECT CODE FROM MED")]);
        let db = ScriptedDb::new(vec![Ok(one_row())]);

        let outcome = correction_loop(&llm, &db, 2).run_with_recovery("q", "", &[]).await;
        match outcome {
            RecoveryOutcome::Succeeded { attempts, was_corrected, original_error, rows, .. } => {
                assert_eq!(attempts, 1);
                assert!(!was_corrected);
                assert!(original_error.is_none());
                assert_eq!(rows.row_count(), 1);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(db.executed().len(), 1);
    }

    #[tokio::test]
    async fn test_corrected_sql_runs_as_second_attempt() {
        let llm = ScriptedLlm::new(vec![
            ok("SELECT TOP 5 CODE FROM MED"),
            ok("PROBLEM: TOP is not SQLite\nFIX: SELECT CODE FROM MED LIMIT 5\n\nEXPLANATION: use LIMIT"),
        ]);
        let db = ScriptedDb::new(vec![
            Err(EngineError::new("near \"5\": syntax error")),
            Ok(one_row()),
        ]);

        let outcome = correction_loop(&llm, &db, 2).run_with_recovery("q", "", &[]).await;
        match outcome {
            RecoveryOutcome::Succeeded { sql, attempts, was_corrected, original_error, .. } => {
                assert_eq!(sql, "SELECT CODE FROM MED LIMIT 5");
                assert_eq!(attempts, 2);
                assert!(was_corrected);
                assert_eq!(original_error.map(|e| e.category), Some(SqlErrorCategory::SyntaxError));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(
            db.executed(),
            vec!["SELECT TOP 5 CODE FROM MED", "SELECT CODE FROM MED LIMIT 5"]
        );
    }

    #[tokio::test]
    async fn test_two_failures_exhaust_with_explanation() {
        let llm = ScriptedLlm::new(vec![
            ok("SELECT CODE FROM MED LIMIT 10"),
            ok("FIX: SELECT CODE FROM MEDS"),
            ok("The database could not find that table. Try asking about tests by name."),
        ]);
        let db = ScriptedDb::new(vec![
            Err(EngineError::new("Incorrect syntax near 'LIMIT'.")),
            Err(EngineError::new("Invalid object name 'MEDS'.")),
        ]);

        let outcome = correction_loop(&llm, &db, 2).run_with_recovery("q", "", &[]).await;
        assert!(!outcome.success());
        assert_eq!(outcome.attempts(), 2);
        match outcome {
            RecoveryOutcome::Exhausted { last_error, original_error, explanation, last_sql, .. } => {
                assert_eq!(last_error.category, SqlErrorCategory::TableError);
                assert_eq!(original_error.category, SqlErrorCategory::SyntaxError);
                assert!(original_error.hint.contains("TOP"));
                assert_eq!(last_sql, "SELECT CODE FROM MEDS");
                assert!(explanation.starts_with("The database could not find"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(db.executed().len(), 2);
    }

    #[tokio::test]
    async fn test_explanation_falls_back_when_service_fails() {
        let llm = ScriptedLlm::new(vec![ok("SELECT NAME FROM MED")]);
        let db = ScriptedDb::new(vec![Err(EngineError::new("no such column: NAME"))]);

        let outcome = correction_loop(&llm, &db, 1).run_with_recovery("q", "", &[]).await;
        match outcome {
            RecoveryOutcome::Exhausted { explanation, attempts, .. } => {
                assert_eq!(attempts, 1);
                assert!(explanation.starts_with("I encountered a SQL error: no such column: NAME."));
                assert!(explanation.contains("The system tried to: The SQL references a column"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(db.executed().len(), 1);
    }

    #[tokio::test]
    async fn test_unextractable_correction_regenerates() {
        let llm = ScriptedLlm::new(vec![
            ok("SELECT NAME FROM MED"),
            ok("I'm not sure what went wrong."),
            ok("SELECT CODE FROM MED"),
        ]);
        let db = ScriptedDb::new(vec![Err(EngineError::new("no such column: NAME")), Ok(one_row())]);

        let outcome = correction_loop(&llm, &db, 2).run_with_recovery("q", "", &[]).await;
        match outcome {
            RecoveryOutcome::Succeeded { sql, attempts, was_corrected, original_error, .. } => {
                assert_eq!(sql, "SELECT CODE FROM MED");
                assert_eq!(attempts, 2);
                assert!(!was_corrected);
                assert!(original_error.is_some());
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(llm.remaining(), 0);
    }

    #[tokio::test]
    async fn test_generation_failure_ends_turn_without_sql() {
        let llm = ScriptedLlm::new(vec![Err(AssistantError::Llm("timeout".to_string()))]);
        let db = ScriptedDb::new(vec![]);

        let outcome = correction_loop(&llm, &db, 2).run_with_recovery("q", "", &[]).await;
        assert!(matches!(outcome, RecoveryOutcome::GenerationFailed { ref message } if message.contains("timeout")));
        assert!(db.executed().is_empty());
    }

    #[tokio::test]
    async fn test_regeneration_failure_exhausts_with_last_error() {
        let llm = ScriptedLlm::new(vec![
            ok("SELECT NAME FROM MED"),
            Err(AssistantError::Llm("correction timeout".to_string())),
            Err(AssistantError::Llm("generation timeout".to_string())),
            ok("Please try asking by test name."),
        ]);
        let db = ScriptedDb::new(vec![Err(EngineError::new("no such column: NAME"))]);

        let outcome = correction_loop(&llm, &db, 2).run_with_recovery("q", "", &[]).await;
        match outcome {
            RecoveryOutcome::Exhausted { last_error, attempts, explanation, .. } => {
                assert_eq!(last_error.category, SqlErrorCategory::ColumnError);
                assert_eq!(attempts, 2);
                assert_eq!(explanation, "Please try asking by test name.");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(db.executed().len(), 1);
    }

    #[tokio::test]
    async fn test_never_exceeds_max_attempts() {
        for max_attempts in 1..=4u8 {
            let mut replies = Vec::new();
            replies.push(ok("SELECT CODE FROM MED"));
            for _ in 0..8 {
                replies.push(ok("FIX: SELECT CODE FROM MED WHERE SLOT_NUMBER = 6"));
            }
            let llm = ScriptedLlm::new(replies);
            let db = ScriptedDb::new((0..8).map(|_| Err(EngineError::new("disk I/O error"))).collect());

            let outcome = correction_loop(&llm, &db, max_attempts).run_with_recovery("q", "", &[]).await;
            assert!(!outcome.success());
            assert_eq!(outcome.attempts(), max_attempts);
            assert_eq!(db.executed().len(), max_attempts as usize);
        }
    }
}
