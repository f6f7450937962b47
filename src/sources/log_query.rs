// Tabular log-query results: `{tables: [{columns: [{name}], rows: [[...]]}]}`.

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

pub const LOG_QUERY_PATH: &str = "logs/query";

#[derive(Debug, Clone, Deserialize)]
pub struct LogQueryResponse {
    #[serde(default)]
    pub tables: Vec<LogTable>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogTable {
    #[serde(default)]
    pub columns: Vec<LogColumn>,
    #[serde(default)]
    pub rows: Vec<Vec<Value>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogColumn {
    pub name: String,
}

/// One result row addressed by column name.
#[derive(Debug, Clone)]
pub struct LogRow {
    cells: HashMap<String, Value>,
}

impl LogRow {
    pub fn str(&self, column: &str) -> &str {
        self.cells.get(column).and_then(Value::as_str).unwrap_or("")
    }

    /// Numeric cell; numbers encoded as strings are accepted.
    pub fn num(&self, column: &str) -> Option<f64> {
        match self.cells.get(column)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl LogQueryResponse {
    /// Rows of the first (primary) table.
    pub fn rows(&self) -> Vec<LogRow> {
        let Some(table) = self.tables.first() else {
            return Vec::new();
        };
        table
            .rows
            .iter()
            .map(|row| LogRow {
                cells: table
                    .columns
                    .iter()
                    .zip(row.iter())
                    .map(|(c, v)| (c.name.clone(), v.clone()))
                    .collect(),
            })
            .collect()
    }
}
