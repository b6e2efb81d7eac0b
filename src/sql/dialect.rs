//! SQL dialects the assistant can target

use serde::{Deserialize, Serialize};
use sqlparser::dialect::{Dialect, MsSqlDialect, SQLiteDialect};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlDialect {
    /// Microsoft SQL Server, the production ontology database
    TSql,
    /// Local ontology snapshots
    Sqlite,
}

impl SqlDialect {
    pub fn display_name(&self) -> &'static str {
        match self {
            SqlDialect::TSql => "T-SQL for Microsoft SQL Server",
            SqlDialect::Sqlite => "SQLite SQL",
        }
    }

    /// Row-limiting rule the model most often gets wrong
    pub fn limit_rule(&self) -> &'static str {
        match self {
            SqlDialect::TSql => "Use TOP instead of LIMIT (e.g. SELECT TOP 100 ...)",
            SqlDialect::Sqlite => "Use LIMIT instead of TOP (e.g. ... LIMIT 100)",
        }
    }

    /// Rules a corrected query must follow
    pub fn correction_rules(&self) -> Vec<&'static str> {
        vec![
            self.limit_rule(),
            "Use DISTINCT when needed for multiple joins",
            "Use MAX(CASE WHEN ...) for conditional aggregation",
            "Always GROUP BY when using aggregates",
            "Use proper table aliases (m1, m2, m3, etc.)",
            "No markdown, no code fences - just raw SQL",
        ]
    }

    pub(crate) fn parser_dialect(&self) -> Box<dyn Dialect> {
        match self {
            SqlDialect::TSql => Box::new(MsSqlDialect {}),
            SqlDialect::Sqlite => Box::new(SQLiteDialect {}),
        }
    }
}

impl fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}
