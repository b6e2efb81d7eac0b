//! Result rows
//!
//! Query projections vary per question, so rows are schema-less: an ordered
//! list of column name / stringified value pairs. NULL stays `None`.

use itertools::Itertools;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    cells: Vec<(String, Option<String>)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { cells: Vec::with_capacity(capacity) }
    }

    pub fn push(&mut self, column: impl Into<String>, value: Option<String>) {
        self.cells.push((column.into(), value));
    }

    /// Value of the first column with this name; `Some(None)` for NULL
    pub fn get(&self, column: &str) -> Option<Option<&str>> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_deref())
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.cells.iter().map(|(name, value)| (name.as_str(), value.as_deref()))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Option<String>)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, Option<String>)>>(iter: I) -> Self {
        Self {
            cells: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (name, value) in &self.cells {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Rows returned by one statement, with the column order the engine reported
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Fixed-width text table of the first `max_rows` rows
    pub fn to_text_table(&self, max_rows: usize) -> String {
        if self.rows.is_empty() {
            return "No data returned from query.".to_string();
        }

        let cell = |row: &Row, column: &str| -> String {
            match row.get(column) {
                Some(Some(value)) => value.to_string(),
                Some(None) => "NULL".to_string(),
                None => String::new(),
            }
        };

        let widths: Vec<usize> = self
            .columns
            .iter()
            .map(|column| {
                self.rows
                    .iter()
                    .map(|row| cell(row, column).chars().count())
                    .chain(std::iter::once(column.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let pad = |text: &str, width: usize| format!("{:<width$}", text, width = width);

        let header = self
            .columns
            .iter()
            .zip(&widths)
            .map(|(column, width)| pad(column, *width))
            .join(" | ");
        let separator = "-".repeat(header.chars().count());

        let body = self
            .rows
            .iter()
            .take(max_rows)
            .map(|row| {
                self.columns
                    .iter()
                    .zip(&widths)
                    .map(|(column, width)| pad(&cell(row, column), *width))
                    .join(" | ")
            })
            .join("\n");

        let mut table = format!("{}\n{}\n{}", header, separator, body);
        if self.rows.len() > max_rows {
            table.push_str(&format!("\n... and {} more rows", self.rows.len() - max_rows));
        }
        table
    }

    /// Pretty JSON of the first `max_rows` rows, one block per row
    pub fn to_json_excerpt(&self, max_rows: usize) -> String {
        if self.rows.is_empty() {
            return String::new();
        }

        let mut excerpt = String::new();
        for (i, row) in self.rows.iter().take(max_rows).enumerate() {
            let json = serde_json::to_string_pretty(row).unwrap_or_else(|_| "{}".to_string());
            excerpt.push_str(&format!("\nRow {}:\n```json\n{}\n```", i + 1, json));
        }
        if self.rows.len() > max_rows {
            excerpt.push_str(&format!("\n... and {} more rows", self.rows.len() - max_rows));
        }
        excerpt
    }

    /// Plain summary used when no model-written answer is available
    pub fn summary_text(&self) -> String {
        if self.rows.is_empty() {
            return "No matching medical concepts found in the ontology.".to_string();
        }
        let preview: Vec<&Row> = self.rows.iter().take(5).collect();
        let json = serde_json::to_string_pretty(&preview).unwrap_or_else(|_| "[]".to_string());
        format!(
            "Found {} medical concepts. Here are the results:\n\n{}",
            self.rows.len(),
            json
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ResultSet {
        let rows = vec![
            Row::from_iter([("CODE", Some("1302".to_string())), ("Name", Some("Sodium".to_string()))]),
            Row::from_iter([("CODE", Some("3668".to_string())), ("Name", None)]),
        ];
        ResultSet::new(vec!["CODE".to_string(), "Name".to_string()], rows)
    }

    #[test]
    fn test_row_serializes_in_column_order() {
        let row = Row::from_iter([("Z", Some("1".to_string())), ("A", None)]);
        assert_eq!(serde_json::to_string(&row).unwrap(), r#"{"Z":"1","A":null}"#);
    }

    #[test]
    fn test_row_get_distinguishes_null_from_missing() {
        let set = sample();
        assert_eq!(set.rows[1].get("Name"), Some(None));
        assert_eq!(set.rows[1].get("Missing"), None);
        assert_eq!(set.rows[0].get("CODE"), Some(Some("1302")));
    }

    #[test]
    fn test_text_table_pads_and_truncates() {
        let table = sample().to_text_table(1);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "CODE | Name  ");
        assert!(lines[1].chars().all(|c| c == '-'));
        assert_eq!(lines[2], "1302 | Sodium");
        assert_eq!(lines[3], "... and 1 more rows");
    }

    #[test]
    fn test_empty_result_texts() {
        let empty = ResultSet::default();
        assert_eq!(empty.to_text_table(20), "No data returned from query.");
        assert_eq!(empty.to_json_excerpt(3), "");
        assert!(empty.summary_text().starts_with("No matching medical concepts"));
    }

    #[test]
    fn test_json_excerpt_limits_rows() {
        let excerpt = sample().to_json_excerpt(1);
        assert!(excerpt.contains("Row 1:"));
        assert!(!excerpt.contains("Row 2:"));
        assert!(excerpt.ends_with("... and 1 more rows"));
    }
}
