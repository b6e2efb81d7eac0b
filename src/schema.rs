//! Schema description providers
//!
//! The schema text is consumed verbatim by the generation prompt. It can be
//! fixed up front or built from the live ontology tables.

use crate::error::{AssistantError, Result};
use crate::ontology::{MED_SLOTS_TABLE, MED_TABLE};
use crate::sql::dialect::SqlDialect;
use crate::sql::executor::QueryExecutor;
use crate::sql::rows::ResultSet;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

#[async_trait]
pub trait SchemaProvider: Send + Sync {
    async fn describe(&self) -> Result<String>;
}

/// Fixed schema text
#[derive(Debug, Clone)]
pub struct StaticSchema(String);

impl StaticSchema {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }
}

#[async_trait]
impl SchemaProvider for StaticSchema {
    async fn describe(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Builds the description from catalog queries against the ontology tables
pub struct OntologySchemaProvider {
    executor: Arc<dyn QueryExecutor>,
}

impl OntologySchemaProvider {
    pub fn new(executor: Arc<dyn QueryExecutor>) -> Self {
        Self { executor }
    }

    async fn query(&self, sql: &str) -> Result<ResultSet> {
        debug!("Schema query: {}", sql);
        self.executor
            .execute(sql)
            .await
            .map_err(|e| AssistantError::Database(format!("Error retrieving schema: {}", e)))
    }

    async fn columns(&self, table: &str) -> Result<Vec<String>> {
        let sql = match self.executor.dialect() {
            SqlDialect::TSql => format!(
                "SELECT COLUMN_NAME AS column_name, \
                 DATA_TYPE + COALESCE('(' + CAST(CHARACTER_MAXIMUM_LENGTH AS VARCHAR(10)) + ')', '') AS data_type, \
                 IS_NULLABLE AS nullable \
                 FROM INFORMATION_SCHEMA.COLUMNS WHERE TABLE_NAME = '{}' ORDER BY ORDINAL_POSITION",
                table
            ),
            SqlDialect::Sqlite => format!(
                "SELECT name AS column_name, type AS data_type, \
                 CASE WHEN \"notnull\" = 1 THEN 'NO' ELSE 'YES' END AS nullable \
                 FROM pragma_table_info('{}') ORDER BY cid",
                table
            ),
        };

        let result = self.query(&sql).await?;
        Ok(result
            .rows
            .iter()
            .map(|row| {
                let name = row.get("column_name").flatten().unwrap_or("?");
                let data_type = row.get("data_type").flatten().unwrap_or("");
                let null_info = match row.get("nullable").flatten() {
                    Some("YES") => "NULL",
                    _ => "NOT NULL",
                };
                format!("  - {}: {} {}", name, data_type, null_info)
            })
            .collect())
    }

    fn top_slots_sql(&self) -> String {
        match self.executor.dialect() {
            SqlDialect::TSql => format!(
                "SELECT TOP 5 SLOT_NUMBER, COUNT(*) AS usage_count FROM {} GROUP BY SLOT_NUMBER ORDER BY usage_count DESC",
                MED_TABLE
            ),
            SqlDialect::Sqlite => format!(
                "SELECT SLOT_NUMBER, COUNT(*) AS usage_count FROM {} GROUP BY SLOT_NUMBER ORDER BY usage_count DESC LIMIT 5",
                MED_TABLE
            ),
        }
    }
}

fn cell<'a>(result: &'a ResultSet, row: usize, column: &str) -> &'a str {
    result
        .rows
        .get(row)
        .and_then(|r| r.get(column).flatten())
        .unwrap_or("")
}

#[async_trait]
impl SchemaProvider for OntologySchemaProvider {
    async fn describe(&self) -> Result<String> {
        let mut parts = vec!["=== MEDICAL ONTOLOGY DATABASE SCHEMA ===".to_string()];

        parts.push(format!("\n--- Table: {} (Medical Concepts & Attributes) ---", MED_TABLE));
        parts.push("Columns:".to_string());
        parts.extend(self.columns(MED_TABLE).await?);

        let usage = self.query(&self.top_slots_sql()).await?;
        parts.push("\nTop Slot Usage:".to_string());
        for i in 0..usage.row_count() {
            parts.push(format!(
                "  - Slot {}: {} entries",
                cell(&usage, i, "SLOT_NUMBER"),
                cell(&usage, i, "usage_count")
            ));
        }

        parts.push(format!("\n--- Table: {} (Slot Definitions) ---", MED_SLOTS_TABLE));
        parts.push("Columns:".to_string());
        parts.extend(self.columns(MED_SLOTS_TABLE).await?);

        let slots = self
            .query(&format!(
                "SELECT SLOT_NUMBER, SLOT_NAME FROM {} ORDER BY SLOT_NUMBER",
                MED_SLOTS_TABLE
            ))
            .await?;
        parts.push("\nAvailable Slots:".to_string());
        for i in 0..slots.row_count() {
            parts.push(format!(
                "  - Slot {}: {}",
                cell(&slots, i, "SLOT_NUMBER"),
                cell(&slots, i, "SLOT_NAME")
            ));
        }

        let stats = self
            .query(&format!(
                "SELECT COUNT(DISTINCT CODE) AS unique_codes, COUNT(*) AS total_pairs FROM {}",
                MED_TABLE
            ))
            .await?;
        let unique: u64 = cell(&stats, 0, "unique_codes").parse().unwrap_or(0);
        let total: u64 = cell(&stats, 0, "total_pairs").parse().unwrap_or(0);

        parts.push("\n=== DATABASE STATISTICS ===".to_string());
        parts.push(format!("Total unique medical codes: {}", unique));
        parts.push(format!("Total slot-value pairs: {}", total));
        if unique > 0 {
            parts.push(format!(
                "Average attributes per code: {:.1}",
                total as f64 / unique as f64
            ));
        }

        Ok(parts.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::executor::SqliteExecutor;

    fn snapshot() -> Arc<SqliteExecutor> {
        let executor = SqliteExecutor::in_memory().unwrap();
        executor
            .execute_batch(
                "CREATE TABLE MED (CODE TEXT NOT NULL, SLOT_NUMBER INTEGER NOT NULL, SLOT_VALUE TEXT);
                 CREATE TABLE MED_SLOTS (SLOT_NUMBER INTEGER NOT NULL, SLOT_NAME TEXT);
                 INSERT INTO MED_SLOTS VALUES (6, 'PRINT-NAME,STRING'), (212, 'LOINC-CODE,STRING');
                 INSERT INTO MED VALUES ('1302', 6, 'Sodium, Serum'), ('1302', 212, '2947-0'),
                                        ('3668', 6, 'Hypernatremia');",
            )
            .unwrap();
        Arc::new(executor)
    }

    #[tokio::test]
    async fn test_static_schema() {
        let schema = StaticSchema::new("MED(CODE, SLOT_NUMBER, SLOT_VALUE)");
        assert_eq!(schema.describe().await.unwrap(), "MED(CODE, SLOT_NUMBER, SLOT_VALUE)");
    }

    #[tokio::test]
    async fn test_describes_live_snapshot() {
        let text = OntologySchemaProvider::new(snapshot()).describe().await.unwrap();

        assert!(text.contains("--- Table: MED (Medical Concepts & Attributes) ---"));
        assert!(text.contains("  - CODE: TEXT NOT NULL"));
        assert!(text.contains("  - SLOT_VALUE: TEXT NULL"));
        assert!(text.contains("  - Slot 6: 2 entries"));
        assert!(text.contains("  - Slot 212: LOINC-CODE,STRING"));
        assert!(text.contains("Total unique medical codes: 2"));
        assert!(text.contains("Total slot-value pairs: 3"));
        assert!(text.contains("Average attributes per code: 1.5"));
    }

    #[tokio::test]
    async fn test_missing_tables_are_database_errors() {
        let empty = Arc::new(SqliteExecutor::in_memory().unwrap());
        let err = OntologySchemaProvider::new(empty).describe().await.unwrap_err();
        assert!(matches!(err, AssistantError::Database(_)));
    }
}
