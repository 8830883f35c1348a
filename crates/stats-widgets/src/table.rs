//! Row-oriented JSON tables
//!
//! Widgets exchange tables as a JSON array of objects, one object per row:
//! `[{"age": 31, "city": "Oslo"}, ...]`. [`Table`] wraps that shape with
//! column-aware helpers. Column order is the order in which names first
//! appear, scanning rows top to bottom.

use dataflow_engine::{WidgetError, WidgetInvocation};
use serde_json::{Map, Value};

/// One row of a table
pub type Row = Map<String, Value>;

/// A table parsed from a port value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    rows: Vec<Row>,
    columns: Vec<String>,
}

impl Table {
    /// Build a table from rows
    pub fn new(rows: Vec<Row>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for row in &rows {
            for key in row.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }
        Self { rows, columns }
    }

    /// Parse a port value; `port` names the value in error messages
    pub fn from_value(value: &Value, port: &str) -> Result<Self, WidgetError> {
        let items = value
            .as_array()
            .ok_or_else(|| WidgetError::invalid(port, "an array of row objects"))?;
        let rows = items
            .iter()
            .map(|item| item.as_object().cloned())
            .collect::<Option<Vec<Row>>>()
            .ok_or_else(|| WidgetError::invalid(port, "an array of row objects"))?;
        Ok(Self::new(rows))
    }

    /// Read the table from a required input port
    pub fn from_input(invocation: &WidgetInvocation, port: &str) -> Result<Self, WidgetError> {
        Self::from_value(invocation.input(port)?, port)
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Fail with a widget error naming the first unknown column
    pub fn require_columns<'a>(
        &self,
        names: impl IntoIterator<Item = &'a String>,
    ) -> Result<(), WidgetError> {
        for name in names {
            if !self.has_column(name) {
                return Err(WidgetError::failed(format!("Column '{}' not found", name)));
            }
        }
        Ok(())
    }

    /// Numeric values of a column, skipping missing and non-numeric cells
    pub fn numeric_column(&self, name: &str) -> Vec<f64> {
        self.rows
            .iter()
            .filter_map(|row| row.get(name).and_then(as_number))
            .collect()
    }

    /// Columns where every present value is numeric and at least one is
    pub fn numeric_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|name| {
                let mut seen = false;
                for row in &self.rows {
                    match row.get(name.as_str()) {
                        None | Some(Value::Null) => {}
                        Some(value) if as_number(value).is_some() => seen = true,
                        Some(_) => return false,
                    }
                }
                seen
            })
            .cloned()
            .collect()
    }

    /// Rows where every listed column holds a number, as aligned vectors
    pub fn complete_numeric_rows(&self, names: &[String]) -> Vec<Vec<f64>> {
        self.rows
            .iter()
            .filter_map(|row| {
                names
                    .iter()
                    .map(|name| row.get(name).and_then(as_number))
                    .collect::<Option<Vec<f64>>>()
            })
            .collect()
    }

    /// Number of missing (absent or null) cells in a column
    pub fn missing_count(&self, name: &str) -> usize {
        self.rows.iter().filter(|row| is_missing(row.get(name))).count()
    }

    pub fn to_value(&self) -> Value {
        Value::Array(self.rows.iter().cloned().map(Value::Object).collect())
    }
}

impl From<Table> for Value {
    fn from(table: Table) -> Self {
        Value::Array(table.rows.into_iter().map(Value::Object).collect())
    }
}

/// Whether a cell counts as missing
pub fn is_missing(value: Option<&Value>) -> bool {
    matches!(value, None | Some(Value::Null))
}

/// Numeric value of a cell; numeric strings count
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

/// JSON number from an f64; non-finite values become null
pub fn number(value: f64) -> Value {
    serde_json::Number::from_f64(value).map_or(Value::Null, Value::Number)
}

/// Read a list of column names from a node parameter.
///
/// Accepts a JSON array of strings or a comma-separated string.
pub fn column_list(invocation: &WidgetInvocation, key: &str) -> Result<Option<Vec<String>>, WidgetError> {
    match invocation.input_or_param(key) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(
            s.split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(String::from)
                .collect(),
        )),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| item.as_str().map(String::from))
            .collect::<Option<Vec<String>>>()
            .map(Some)
            .ok_or_else(|| WidgetError::invalid(key, "a list of column names")),
        Some(_) => Err(WidgetError::invalid(key, "a list of column names")),
    }
}

/// Read a single column name from a node parameter
pub fn column_name(invocation: &WidgetInvocation, key: &str) -> Result<String, WidgetError> {
    invocation
        .input_or_param(key)
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| WidgetError::invalid(key, "a column name"))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use dataflow_engine::{CancellationToken, DatasetContext, PortValues};
    use serde_json::json;
    use std::sync::Arc;

    /// Invocation of `kind` with `data` on the `data` port and the given params
    pub(crate) fn invocation(kind: &str, data: Value, params: Value) -> WidgetInvocation {
        let mut inputs = PortValues::new();
        if !data.is_null() {
            inputs.insert("data".to_string(), data);
        }
        WidgetInvocation {
            node_id: format!("{}-1", kind),
            widget_kind: kind.to_string(),
            inputs,
            params,
            dataset: Arc::new(DatasetContext::new()),
            cancel: CancellationToken::new(),
        }
    }

    pub(crate) fn people() -> Value {
        json!([
            {"name": "Ada", "age": 36, "score": 9.5},
            {"name": "Brian", "age": 41, "score": null},
            {"name": "Chen", "age": "29", "score": 7.0},
            {"name": "Ada", "age": 36, "score": 9.5}
        ])
    }

    #[test]
    fn test_columns_in_first_seen_order() {
        let table = Table::from_value(&json!([{"b": 1}, {"a": 2, "b": 3}]), "data").unwrap();
        assert_eq!(table.columns(), ["b", "a"]);
        assert_eq!(table.row_count(), 2);
    }

    #[test]
    fn test_rejects_non_tables() {
        assert!(Table::from_value(&json!({"a": 1}), "data").is_err());
        assert!(Table::from_value(&json!([1, 2]), "data").is_err());
    }

    #[test]
    fn test_numeric_helpers() {
        let table = Table::from_value(&people(), "data").unwrap();
        assert_eq!(table.numeric_column("age"), vec![36.0, 41.0, 29.0, 36.0]);
        assert_eq!(table.numeric_columns(), vec!["age", "score"]);
        assert_eq!(table.missing_count("score"), 1);
        assert_eq!(
            table
                .complete_numeric_rows(&["age".to_string(), "score".to_string()])
                .len(),
            3
        );
    }

    #[test]
    fn test_column_list_forms() {
        let inv = invocation("t", Value::Null, json!({"columns": "age, score"}));
        assert_eq!(
            column_list(&inv, "columns").unwrap(),
            Some(vec!["age".to_string(), "score".to_string()])
        );

        let inv = invocation("t", Value::Null, json!({"columns": ["age"]}));
        assert_eq!(column_list(&inv, "columns").unwrap(), Some(vec!["age".to_string()]));

        let inv = invocation("t", Value::Null, json!({"columns": 3}));
        assert!(column_list(&inv, "columns").is_err());
        assert_eq!(column_list(&inv, "missing").unwrap(), None);
    }
}
