//! Shared fixtures for the pipeline tests

#![allow(dead_code)]

use async_trait::async_trait;
use meddata_assistant::config::PipelineConfig;
use meddata_assistant::error::{AssistantError, Result};
use meddata_assistant::llm::{ChatMessage, CompletionService};
use meddata_assistant::sql::SqliteExecutor;
use meddata_assistant::{AssistantContext, MedDataAssistant};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub const SCHEMA: &str = "MED(CODE, SLOT_NUMBER, SLOT_VALUE)\nMED_SLOTS(SLOT_NUMBER, SLOT_NAME)";

/// Completion service that replays canned replies and records every request
pub struct ScriptedCompletion {
    replies: Mutex<VecDeque<Result<String>>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedCompletion {
    pub fn new(replies: Vec<&str>) -> Arc<Self> {
        Self::with_results(replies.into_iter().map(|r| Ok(r.to_string())).collect())
    }

    pub fn with_results(replies: Vec<Result<String>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn push(&self, reply: &str) {
        self.replies.lock().unwrap().push_back(Ok(reply.to_string()));
    }

    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().unwrap().clone()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().unwrap().len()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        self.requests.lock().unwrap().push(messages.to_vec());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AssistantError::Llm("script exhausted".to_string())))
    }
}

/// In-memory snapshot with a handful of lab tests and a diagnosis
pub fn ontology_db() -> Arc<SqliteExecutor> {
    let executor = SqliteExecutor::in_memory().unwrap();
    executor
        .execute_batch(
            "CREATE TABLE MED (CODE TEXT NOT NULL, SLOT_NUMBER INTEGER NOT NULL, SLOT_VALUE TEXT);
             CREATE TABLE MED_SLOTS (SLOT_NUMBER INTEGER NOT NULL, SLOT_NAME TEXT);
             INSERT INTO MED_SLOTS VALUES
                (4, 'DESCENDANT-OF,CONCEPT'), (6, 'PRINT-NAME,STRING'),
                (212, 'LOINC-CODE,STRING'), (266, 'SNOMED-CT,STRING');
             INSERT INTO MED VALUES
                ('1302', 6, 'Sodium, Serum'), ('1302', 212, '2947-0'), ('1302', 4, '1288'),
                ('1303', 6, 'Potassium, Serum'), ('1303', 212, '2823-3'), ('1303', 4, '1288'),
                ('3668', 6, 'Hypernatremia'), ('3668', 266, '39355002');",
        )
        .unwrap();
    Arc::new(executor)
}

pub fn assistant_with(llm: Arc<ScriptedCompletion>, pipeline: PipelineConfig) -> MedDataAssistant {
    MedDataAssistant::new(context_with(llm, pipeline))
}

pub fn context_with(llm: Arc<ScriptedCompletion>, pipeline: PipelineConfig) -> AssistantContext {
    AssistantContext::new(llm, ontology_db(), SCHEMA, pipeline)
}
