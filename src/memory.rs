//! Conversational Memory
//!
//! Append-only log of answered questions for one session. Recent entries are
//! rendered into prompts so follow-up questions ("which of those...") resolve
//! against earlier answers.

use crate::error::Result;
use crate::llm::ChatMessage;
use crate::sql::rows::ResultSet;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::info;

const NO_INTERACTIONS: &str = "No previous interactions.";
const CONTEXT_ANSWER_CHARS: usize = 200;

/// One answered question
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Interaction {
    pub timestamp: DateTime<Utc>,
    pub question: String,
    /// Final SQL used; `None` for knowledge-only answers
    pub sql: Option<String>,
    pub rows: ResultSet,
    /// Plain rendering of the rows before analysis
    pub sql_response: String,
    pub answer: String,
}

impl Interaction {
    pub fn new(
        question: impl Into<String>,
        sql: Option<String>,
        rows: ResultSet,
        sql_response: impl Into<String>,
        answer: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            question: question.into(),
            sql,
            rows,
            sql_response: sql_response.into(),
            answer: answer.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InteractionSummary {
    pub timestamp: String,
    pub question: String,
    pub sql_query: Option<String>,
    pub row_count: usize,
    pub final_response: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemorySummary {
    pub total_interactions: usize,
    pub interactions: Vec<InteractionSummary>,
}

#[derive(Debug, Clone, Default)]
pub struct Memory {
    interactions: Vec<Interaction>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, interaction: Interaction) {
        self.interactions.push(interaction);
        info!("Stored interaction #{} in memory", self.interactions.len());
    }

    pub fn clear(&mut self) {
        self.interactions.clear();
        info!("Memory cleared");
    }

    pub fn all(&self) -> &[Interaction] {
        &self.interactions
    }

    pub fn len(&self) -> usize {
        self.interactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interactions.is_empty()
    }

    fn last(&self, n: usize) -> &[Interaction] {
        let start = self.interactions.len().saturating_sub(n);
        &self.interactions[start..]
    }

    /// Last `n` interactions as a prompt fragment
    pub fn recent_context(&self, n: usize) -> String {
        let recent = self.last(n);
        if recent.is_empty() {
            return NO_INTERACTIONS.to_string();
        }

        let mut parts = Vec::with_capacity(recent.len() * 5);
        for (i, interaction) in recent.iter().enumerate() {
            let answer: String = interaction.answer.chars().take(CONTEXT_ANSWER_CHARS).collect();
            parts.push(format!("Previous Interaction {}:", i + 1));
            parts.push(format!("  Question: {}", interaction.question));
            parts.push(format!("  SQL: {}", interaction.sql.as_deref().unwrap_or("N/A")));
            parts.push(format!("  Response: {}...", answer));
            parts.push(String::new());
        }
        parts.join("\n")
    }

    /// Last `n` SQL exchanges as chat history for SQL generation.
    /// Knowledge-only interactions are skipped and do not use up the window.
    pub fn recent_messages(&self, n: usize) -> Vec<ChatMessage> {
        let mut exchanges: Vec<[ChatMessage; 2]> = self
            .interactions
            .iter()
            .rev()
            .filter_map(|interaction| {
                let sql = interaction.sql.as_deref()?;
                Some([
                    ChatMessage::user(interaction.question.as_str()),
                    ChatMessage::assistant(format!("SQL: {}\n\n{}", sql, interaction.answer)),
                ])
            })
            .take(n)
            .collect();
        exchanges.reverse();
        exchanges.into_iter().flatten().collect()
    }

    pub fn summary(&self) -> MemorySummary {
        MemorySummary {
            total_interactions: self.interactions.len(),
            interactions: self
                .interactions
                .iter()
                .map(|i| InteractionSummary {
                    timestamp: i.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
                    question: i.question.clone(),
                    sql_query: i.sql.clone(),
                    row_count: i.rows.row_count(),
                    final_response: i.answer.clone(),
                })
                .collect(),
        }
    }

    /// Write every interaction, rows included, as pretty JSON
    pub fn export(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(&self.interactions)?;
        fs::write(path, json)?;
        info!("Exported {} interactions to {}", self.interactions.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::rows::Row;

    fn interaction(question: &str, sql: Option<&str>, answer: &str) -> Interaction {
        let rows = ResultSet::new(
            vec!["CODE".to_string()],
            vec![Row::from_iter([("CODE", Some("1302".to_string()))])],
        );
        Interaction::new(question, sql.map(String::from), rows, "Found 1", answer)
    }

    #[test]
    fn test_append_then_all_ends_with_appended() {
        let mut memory = Memory::new();
        memory.append(interaction("first", Some("SELECT 1"), "one"));
        let last = interaction("second", Some("SELECT 2"), "two");
        memory.append(last.clone());

        assert_eq!(memory.all().last(), Some(&last));
        assert_eq!(memory.len(), 2);

        memory.clear();
        assert!(memory.all().is_empty());
        memory.clear();
        assert!(memory.is_empty());
    }

    #[test]
    fn test_recent_context_sentinel() {
        assert_eq!(Memory::new().recent_context(2), "No previous interactions.");
        assert_eq!(Memory::new().recent_context(0), "No previous interactions.");
    }

    #[test]
    fn test_recent_context_windows_and_truncates() {
        let mut memory = Memory::new();
        memory.append(interaction("oldest", Some("SELECT 0"), "zero"));
        memory.append(interaction("middle", Some("SELECT 1"), &"a".repeat(300)));
        memory.append(interaction("newest", None, "general answer"));

        let context = memory.recent_context(2);
        assert!(!context.contains("oldest"));
        assert!(context.contains("Previous Interaction 1:\n  Question: middle"));
        assert!(context.contains(&format!("  Response: {}...", "a".repeat(200))));
        assert!(!context.contains(&"a".repeat(201)));
        assert!(context.contains("Previous Interaction 2:\n  Question: newest\n  SQL: N/A"));
    }

    #[test]
    fn test_recent_messages_skip_knowledge_answers() {
        let mut memory = Memory::new();
        memory.append(interaction("tests?", Some("SELECT CODE FROM MED"), "1302"));
        memory.append(interaction("what is loinc", None, "a code system"));

        let messages = memory.recent_messages(3);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], ChatMessage::user("tests?"));
        assert_eq!(messages[1].content, "SQL: SELECT CODE FROM MED\n\n1302");
    }

    #[test]
    fn test_knowledge_answers_do_not_shrink_history_window() {
        let mut memory = Memory::new();
        memory.append(interaction("oldest", Some("SELECT 1"), "one"));
        memory.append(interaction("sodium?", Some("SELECT 2"), "two"));
        memory.append(interaction("what is loinc", None, "a code system"));
        memory.append(interaction("potassium?", Some("SELECT 3"), "three"));
        memory.append(interaction("what is snomed", None, "a terminology"));

        let messages = memory.recent_messages(2);
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0], ChatMessage::user("sodium?"));
        assert_eq!(messages[2], ChatMessage::user("potassium?"));
        assert_eq!(messages[3].content, "SQL: SELECT 3\n\nthree");
        assert!(memory.recent_messages(0).is_empty());
    }

    #[test]
    fn test_summary_counts_rows() {
        let mut memory = Memory::new();
        memory.append(interaction("q", Some("SELECT 1"), "a"));
        let summary = memory.summary();
        assert_eq!(summary.total_interactions, 1);
        assert_eq!(summary.interactions[0].row_count, 1);
        assert!(summary.interactions[0].timestamp.ends_with('Z'));
    }

    #[test]
    fn test_export_writes_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.json");
        let mut memory = Memory::new();
        memory.append(interaction("q", Some("SELECT 1"), "a"));
        memory.export(&path).unwrap();

        let exported: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(exported[0]["question"], "q");
        assert_eq!(exported[0]["rows"]["rows"][0]["CODE"], "1302");
        assert!(exported[0]["timestamp"].as_str().is_some());
    }

    #[test]
    fn test_export_to_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("memory.json");
        assert!(Memory::new().export(&path).is_err());
    }
}
