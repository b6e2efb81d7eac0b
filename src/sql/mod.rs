//! SQL generation, execution and error classification

pub mod dialect;
pub mod error_classifier;
pub mod executor;
pub mod extract;
pub mod generator;
pub mod rows;

pub use dialect::SqlDialect;
pub use error_classifier::{ClassifiedError, ErrorClassifier, SqlErrorCategory};
pub use executor::{EngineError, QueryExecutor, SqliteExecutor};
pub use extract::{extract_corrected_sql, is_single_query, strip_code_fences};
pub use generator::{AttemptOutcome, SqlAttempt, SqlFailure, SqlGenerator};
pub use rows::{ResultSet, Row};
