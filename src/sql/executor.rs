//! Query Executors
//!
//! The database is an opaque collaborator: [`QueryExecutor::execute`] either
//! returns rows or an [`EngineError`] carrying the engine's own message, which
//! the error classifier inspects. [`SqliteExecutor`] runs against a local
//! SQLite snapshot of the ontology tables.

use crate::error::{AssistantError, Result};
use crate::sql::dialect::SqlDialect;
use crate::sql::rows::{ResultSet, Row};
use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::debug;

/// Error reported by the database engine for one statement
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct EngineError {
    pub message: String,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(e: rusqlite::Error) -> Self {
        EngineError::new(e.to_string())
    }
}

/// Executes single ad hoc read statements
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, sql: &str) -> std::result::Result<ResultSet, EngineError>;

    /// Dialect the engine speaks
    fn dialect(&self) -> SqlDialect;
}

/// Executor over a SQLite ontology snapshot
#[derive(Clone)]
pub struct SqliteExecutor {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteExecutor {
    /// Open a snapshot file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        Ok(Self::from_connection(conn))
    }

    /// Empty in-memory database, mostly for fixtures
    pub fn in_memory() -> Result<Self> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Run a batch of statements (DDL, fixture inserts)
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| AssistantError::Database("SQLite connection lock poisoned".to_string()))?;
        conn.execute_batch(sql)?;
        Ok(())
    }
}

#[async_trait]
impl QueryExecutor for SqliteExecutor {
    async fn execute(&self, sql: &str) -> std::result::Result<ResultSet, EngineError> {
        let conn = Arc::clone(&self.conn);
        let sql = sql.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| EngineError::new("SQLite connection lock poisoned"))?;
            run_query(&conn, &sql)
        })
        .await
        .map_err(|e| EngineError::new(format!("Query task failed: {}", e)))?
    }

    fn dialect(&self) -> SqlDialect {
        SqlDialect::Sqlite
    }
}

fn run_query(conn: &Connection, sql: &str) -> std::result::Result<ResultSet, EngineError> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    let mut rows = Vec::new();
    let mut cursor = stmt.query([])?;
    while let Some(raw) = cursor.next()? {
        let mut row = Row::with_capacity(columns.len());
        for (idx, column) in columns.iter().enumerate() {
            row.push(column.clone(), stringify(raw.get_ref(idx)?));
        }
        rows.push(row);
    }

    debug!("SQLite returned {} rows", rows.len());
    Ok(ResultSet::new(columns, rows))
}

fn stringify(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => {
            let mut hex = String::with_capacity(bytes.len() * 2);
            for b in bytes {
                let _ = write!(hex, "{:02x}", b);
            }
            Some(hex)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn executor() -> SqliteExecutor {
        let executor = SqliteExecutor::in_memory().unwrap();
        executor
            .execute_batch(
                "CREATE TABLE MED (CODE TEXT, SLOT_NUMBER INTEGER, SLOT_VALUE TEXT);
                 INSERT INTO MED VALUES ('1302', 212, '2947-0');
                 INSERT INTO MED VALUES ('1302', 6, 'Sodium, Serum');
                 INSERT INTO MED VALUES ('3668', 6, NULL);",
            )
            .unwrap();
        executor
    }

    #[tokio::test]
    async fn test_rows_are_stringified_in_column_order() {
        let result = executor()
            .execute("SELECT SLOT_NUMBER, CODE, SLOT_VALUE, 1.5 AS ratio FROM MED ORDER BY CODE, SLOT_NUMBER")
            .await
            .unwrap();

        assert_eq!(result.columns, vec!["SLOT_NUMBER", "CODE", "SLOT_VALUE", "ratio"]);
        assert_eq!(result.row_count(), 3);
        let first: Vec<&str> = result.rows[0].columns().collect();
        assert_eq!(first, vec!["SLOT_NUMBER", "CODE", "SLOT_VALUE", "ratio"]);
        assert_eq!(result.rows[0].get("SLOT_NUMBER"), Some(Some("6")));
        assert_eq!(result.rows[0].get("ratio"), Some(Some("1.5")));
        assert_eq!(result.rows[2].get("SLOT_VALUE"), Some(None));
    }

    #[tokio::test]
    async fn test_engine_error_keeps_message() {
        let err = executor().execute("SELECT NAME FROM MED").await.unwrap_err();
        assert!(err.message.contains("no such column"), "{}", err.message);

        let err = executor().execute("SELECT * FROM MEDS").await.unwrap_err();
        assert!(err.message.contains("no such table"), "{}", err.message);
    }

    #[test]
    fn test_blob_is_hex() {
        assert_eq!(stringify(ValueRef::Blob(&[0x0a, 0xff])), Some("0aff".to_string()));
    }
}
