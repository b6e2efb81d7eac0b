//! Data-Analysis Synthesis
//!
//! Second completion call that reads the retrieved rows and writes the
//! answer. A failure here never fails the turn: the rows were retrieved, so
//! the plain SQL-step text is returned with a note instead.

use crate::config::PipelineConfig;
use crate::llm::{ChatMessage, CompletionService};
use crate::prompts;
use crate::sql::rows::ResultSet;
use std::sync::Arc;
use tracing::{info, warn};

const ANALYSIS_SYSTEM_PROMPT: &str = "You are a medical data analysis expert. \
Interpret medical ontology query results, explain relationships between concepts, \
and answer using only the data provided.";

pub const ANALYSIS_UNAVAILABLE_NOTE: &str = "Note: Data analysis unavailable.";

#[derive(Debug, Clone, PartialEq)]
pub struct Synthesis {
    pub answer: String,
    /// Whether the answer came from the analysis call
    pub analyzed: bool,
}

pub struct Synthesizer {
    llm: Arc<dyn CompletionService>,
    table_rows: usize,
    json_rows: usize,
}

impl Synthesizer {
    pub fn new(llm: Arc<dyn CompletionService>, config: &PipelineConfig) -> Self {
        Self {
            llm,
            table_rows: config.table_preview_rows,
            json_rows: config.json_excerpt_rows,
        }
    }

    /// Analyze the rows returned for `question`
    pub async fn synthesize(&self, question: &str, rows: &ResultSet, recent_context: &str) -> Synthesis {
        let prompt = prompts::analysis_prompt(question, rows, self.table_rows, self.json_rows, recent_context);
        let messages = [ChatMessage::system(ANALYSIS_SYSTEM_PROMPT), ChatMessage::user(prompt)];

        match self.llm.complete(&messages).await {
            Ok(answer) if !answer.trim().is_empty() => {
                info!("Analysis complete for {} rows", rows.row_count());
                Synthesis { answer, analyzed: true }
            }
            Ok(_) => {
                warn!("Analysis returned empty text; using raw results");
                Self::fallback(rows)
            }
            Err(e) => {
                warn!("Analysis failed: {}; using raw results", e);
                Self::fallback(rows)
            }
        }
    }

    fn fallback(rows: &ResultSet) -> Synthesis {
        Synthesis {
            answer: format!("{}\n\n{}", rows.summary_text(), ANALYSIS_UNAVAILABLE_NOTE),
            analyzed: false,
        }
    }
}
