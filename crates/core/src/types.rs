use serde::{Deserialize, Serialize};

/// A single result cell; `None` is SQL `NULL`, distinct from the empty string
pub type Cell = Option<String>;

/// One result row, in column order
pub type Row = Vec<Cell>;

/// What the sandbox is asked to run
///
/// `init` sets up the environment and is hashed verbatim; `query` is
/// canonicalized before it is hashed or executed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionInput {
    pub init: String,
    pub query: String,
}

impl ExecutionInput {
    #[must_use]
    pub fn new(init: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            init: init.into(),
            query: query.into(),
        }
    }

    /// Replace the query, keeping the init script
    #[must_use]
    pub fn with_query(&self, query: impl Into<String>) -> Self {
        Self {
            init: self.init.clone(),
            query: query.into(),
        }
    }
}

/// What the sandbox produced: a header and row-major text cells
///
/// Row order and column order are part of the value's identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionOutput {
    pub header: Vec<String>,
    pub rows: Vec<Row>,
}

impl ExecutionOutput {
    #[must_use]
    pub fn new(header: Vec<String>, rows: Vec<Row>) -> Self {
        Self { header, rows }
    }

    /// Output of a statement that produces no rows
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn column_count(&self) -> usize {
        self.header.len()
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_is_not_empty_string() {
        let with_null = ExecutionOutput::new(vec!["name".into()], vec![vec![None]]);
        let with_empty = ExecutionOutput::new(vec!["name".into()], vec![vec![Some(String::new())]]);
        assert_ne!(with_null, with_empty);
    }

    #[test]
    fn test_json_shape() {
        let output = ExecutionOutput::new(
            vec!["column".into(), "column2".into()],
            vec![vec![None, Some("Hello!".into())]],
        );

        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "header": ["column", "column2"],
                "rows": [[null, "Hello!"]],
            })
        );

        let decoded: ExecutionOutput = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, output);
    }

    #[test]
    fn test_with_query_keeps_init() {
        let input = ExecutionInput::new("CREATE TABLE t (id INTEGER);", "SELECT 1");
        let other = input.with_query("SELECT 2");
        assert_eq!(other.init, input.init);
        assert_eq!(other.query, "SELECT 2");
    }
}
