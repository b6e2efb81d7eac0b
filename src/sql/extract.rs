//! SQL extraction from free-text completions
//!
//! Completions are supposed to be raw SQL, but models wrap queries in code
//! fences or bury them in prose. Extraction is heuristic string scanning;
//! every candidate must parse as a single query statement in the target
//! dialect before it is handed to the engine.

use crate::sql::dialect::SqlDialect;
use lazy_static::lazy_static;
use regex::Regex;
use sqlparser::ast::Statement;
use sqlparser::parser::Parser;
use tracing::debug;

lazy_static! {
    static ref FIX_BLOCK: Regex = Regex::new(
        r"(?is)\bFIX(?:ED)?\s*:\s*(?:```(?:sql)?\s*)?((?:SELECT|WITH)\b.*?)(?:```|\n\s*\n|\n\s*(?:-\s*)?(?:EXPLANATION|PROBLEM)\s*:|$)"
    )
    .unwrap();
    static ref FENCED_BLOCK: Regex = Regex::new(r"(?is)```(?:sql)?[ \t]*\n(.*?)\n?```").unwrap();
    static ref SELECT_START: Regex = Regex::new(r"(?i)^(?:SELECT|WITH)\b").unwrap();
    static ref HAS_SOURCE: Regex = Regex::new(r"(?i)\b(?:FROM|WHERE)\b").unwrap();
    static ref SECTION_LABEL: Regex = Regex::new(r"^[A-Z][A-Z ]{2,}:").unwrap();
}

/// Strip code-fence wrapping from a completion that should be raw SQL
pub fn strip_code_fences(text: &str) -> String {
    text.replace("```sql", "")
        .replace("```SQL", "")
        .replace("```", "")
        .trim()
        .to_string()
}

/// Pull a corrected query out of a diagnosis response.
///
/// Tries, in order: a `FIX:` section, a fenced code block, then the first
/// line starting a SELECT/WITH statement plus the contiguous lines after it.
pub fn extract_corrected_sql(response: &str, dialect: SqlDialect) -> Option<String> {
    let candidates = [
        ("fix block", from_fix_block(response)),
        ("fenced block", from_fenced_block(response)),
        ("line scan", from_line_scan(response)),
    ];

    for (strategy, candidate) in candidates {
        let Some(sql) = candidate else { continue };
        if is_single_query(&sql, dialect) {
            debug!("Extracted corrected SQL via {}", strategy);
            return Some(sql);
        }
        debug!("Discarding {} candidate that does not parse as one query", strategy);
    }

    None
}

/// Sanity check: exactly one statement, and it is a query
pub fn is_single_query(sql: &str, dialect: SqlDialect) -> bool {
    let parser_dialect = dialect.parser_dialect();
    match Parser::parse_sql(parser_dialect.as_ref(), sql) {
        Ok(statements) => matches!(statements.as_slice(), [Statement::Query(_)]),
        Err(_) => false,
    }
}

fn from_fix_block(response: &str) -> Option<String> {
    let captured = FIX_BLOCK.captures(response)?.get(1)?.as_str();
    non_empty(strip_code_fences(captured))
}

fn from_fenced_block(response: &str) -> Option<String> {
    FENCED_BLOCK
        .captures_iter(response)
        .filter_map(|c| c.get(1).map(|m| m.as_str().trim().to_string()))
        .find(|sql| SELECT_START.is_match(sql))
}

fn from_line_scan(response: &str) -> Option<String> {
    let lines: Vec<&str> = response.lines().collect();
    let start = lines.iter().position(|line| {
        let line = line.trim();
        SELECT_START.is_match(line) && HAS_SOURCE.is_match(line)
    })?;

    let mut collected = vec![lines[start].trim()];
    for line in &lines[start + 1..] {
        let line = line.trim();
        if line.is_empty() || line.starts_with("```") || SECTION_LABEL.is_match(line) {
            break;
        }
        collected.push(line);
    }

    // Newlines keep line comments and wrapped string literals intact
    non_empty(collected.join("\n"))
}

fn non_empty(sql: String) -> Option<String> {
    let sql = sql.trim().trim_end_matches(';').trim().to_string();
    if sql.is_empty() {
        None
    } else {
        Some(sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```sql\nSELECT 1\n```"), "SELECT 1");
        assert_eq!(strip_code_fences("  SELECT CODE FROM MED  "), "SELECT CODE FROM MED");
    }

    #[test]
    fn test_fix_block_wins() {
        let response = "PROBLEM: LIMIT is not valid in T-SQL\n\
                        FIX: SELECT TOP 10 CODE FROM MED WHERE SLOT_NUMBER = 212\n\n\
                        EXPLANATION: TOP replaces LIMIT.\n\
                        ```sql\nSELECT CODE FROM MED\n```";
        assert_eq!(
            extract_corrected_sql(response, SqlDialect::TSql).as_deref(),
            Some("SELECT TOP 10 CODE FROM MED WHERE SLOT_NUMBER = 212")
        );
    }

    #[test]
    fn test_fix_block_with_fence_and_multiline_sql() {
        let response = "- PROBLEM: wrong alias\n- FIX:\n```sql\nSELECT m1.CODE\nFROM MED m1\nWHERE m1.SLOT_NUMBER = 6\n```\n- EXPLANATION: alias fixed";
        let sql = extract_corrected_sql(response, SqlDialect::Sqlite).unwrap();
        assert_eq!(sql, "SELECT m1.CODE\nFROM MED m1\nWHERE m1.SLOT_NUMBER = 6");
    }

    #[test]
    fn test_fix_block_keeps_problem_slot_names() {
        let response = "PROBLEM: wrong slot\n\
                        FIX: SELECT m1.CODE FROM MED m1 JOIN MED_SLOTS s ON s.SLOT_NUMBER = m1.SLOT_NUMBER WHERE s.SLOT_NAME LIKE 'PT-PROBLEM%'\n\n\
                        EXPLANATION: join on the slot definitions";
        assert_eq!(
            extract_corrected_sql(response, SqlDialect::Sqlite).as_deref(),
            Some("SELECT m1.CODE FROM MED m1 JOIN MED_SLOTS s ON s.SLOT_NUMBER = m1.SLOT_NUMBER WHERE s.SLOT_NAME LIKE 'PT-PROBLEM%'")
        );
    }

    #[test]
    fn test_fix_block_keeps_problem_alias() {
        let response = "FIX: SELECT m2.SLOT_VALUE AS problem FROM MED m2 WHERE m2.SLOT_NUMBER = 150";
        assert_eq!(
            extract_corrected_sql(response, SqlDialect::TSql).as_deref(),
            Some("SELECT m2.SLOT_VALUE AS problem FROM MED m2 WHERE m2.SLOT_NUMBER = 150")
        );
    }

    #[test]
    fn test_fix_block_ends_at_next_label() {
        let response = "FIX: SELECT CODE FROM MED\nWHERE SLOT_NUMBER = 6\n- EXPLANATION: names live in slot 6";
        assert_eq!(
            extract_corrected_sql(response, SqlDialect::Sqlite).as_deref(),
            Some("SELECT CODE FROM MED\nWHERE SLOT_NUMBER = 6")
        );
    }

    #[test]
    fn test_fenced_block_fallback() {
        let response = "The corrected query is:\n```sql\nSELECT CODE FROM MED WHERE SLOT_NUMBER = 266\n```\nThis should work.";
        assert_eq!(
            extract_corrected_sql(response, SqlDialect::TSql).as_deref(),
            Some("SELECT CODE FROM MED WHERE SLOT_NUMBER = 266")
        );
    }

    #[test]
    fn test_line_scan_fallback_stops_at_label() {
        let response = "Try this instead:\nSELECT CODE, SLOT_VALUE FROM MED\nWHERE SLOT_NUMBER = 6\nEXPLANATION: names live in slot 6";
        assert_eq!(
            extract_corrected_sql(response, SqlDialect::Sqlite).as_deref(),
            Some("SELECT CODE, SLOT_VALUE FROM MED\nWHERE SLOT_NUMBER = 6")
        );
    }

    #[test]
    fn test_unparseable_candidate_is_rejected() {
        let response = "FIX: SELECT CODE FROM MED WHERE (SLOT_NUMBER = 6";
        assert_eq!(extract_corrected_sql(response, SqlDialect::Sqlite), None);
    }

    #[test]
    fn test_no_sql_in_prose() {
        assert_eq!(
            extract_corrected_sql("I am not sure how to fix this query.", SqlDialect::TSql),
            None
        );
    }

    #[test]
    fn test_is_single_query() {
        assert!(is_single_query("SELECT CODE FROM MED", SqlDialect::TSql));
        assert!(!is_single_query("DELETE FROM MED", SqlDialect::TSql));
        assert!(!is_single_query("SELECT 1; SELECT 2", SqlDialect::Sqlite));
    }
}
