//! CSV File Widget
//!
//! Loads a table from a delimited text file.

use async_trait::async_trait;
use csv::{ReaderBuilder, Trim};
use dataflow_engine::{
    PortDefinition, PortValues, WidgetCategory, WidgetDefinition, WidgetDescriptor, WidgetError,
    WidgetExecutor, WidgetInvocation,
};
use serde_json::{Map, Value};

use crate::table::Table;

/// CSV File Widget
///
/// Cells that parse as numbers become JSON numbers; empty cells become null;
/// everything else stays a string.
///
/// # Params
/// - `filePath` (required) - file to read
/// - `delimiter` - single-character field separator (default `,`)
/// - `header` - whether the first line holds column names (default true);
///   without a header, columns are named `column_0`, `column_1`, ...
///
/// # Outputs
/// - `data` - the parsed rows
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvFileWidget;

impl CsvFileWidget {
    pub const KIND: &'static str = "csv_file";
    /// Port ID for data output
    pub const PORT_DATA: &'static str = "data";

    /// Parse CSV text into a table
    pub fn parse(text: &str, delimiter: u8, has_headers: bool) -> Result<Table, WidgetError> {
        let mut reader = ReaderBuilder::new()
            .has_headers(has_headers)
            .delimiter(delimiter)
            .trim(Trim::All)
            .from_reader(text.as_bytes());

        let headers: Option<Vec<String>> = if has_headers {
            let record = reader
                .headers()
                .map_err(|e| WidgetError::failed(format!("Failed to read CSV header: {}", e)))?;
            Some(record.iter().map(String::from).collect())
        } else {
            None
        };

        let mut rows = Vec::new();
        for (index, result) in reader.records().enumerate() {
            let record = result.map_err(|e| {
                WidgetError::failed(format!("Failed to parse CSV record {}: {}", index + 1, e))
            })?;
            let mut row = Map::new();
            for (i, field) in record.iter().enumerate() {
                let name = match &headers {
                    Some(headers) => match headers.get(i) {
                        Some(name) => name.clone(),
                        None => continue,
                    },
                    None => format!("column_{}", i),
                };
                row.insert(name, cell_value(field));
            }
            rows.push(row);
        }
        Ok(Table::new(rows))
    }
}

fn cell_value(field: &str) -> Value {
    if field.is_empty() {
        return Value::Null;
    }
    if let Ok(int) = field.parse::<i64>() {
        return Value::from(int);
    }
    match field.parse::<f64>() {
        Ok(float) if float.is_finite() => crate::table::number(float),
        _ => Value::String(field.to_string()),
    }
}

/// Single-byte delimiter from a node parameter
pub(crate) fn delimiter_param(invocation: &WidgetInvocation) -> Result<u8, WidgetError> {
    match invocation.param("delimiter").and_then(Value::as_str) {
        None => Ok(b','),
        Some(s) if s.len() == 1 && s.is_ascii() => Ok(s.as_bytes()[0]),
        Some("\\t") => Ok(b'\t'),
        Some(_) => Err(WidgetError::invalid("delimiter", "a single ASCII character")),
    }
}

impl WidgetDescriptor for CsvFileWidget {
    fn descriptor() -> WidgetDefinition {
        WidgetDefinition {
            kind: Self::KIND.to_string(),
            label: "CSV File".to_string(),
            description: "Loads data from a CSV file".to_string(),
            category: WidgetCategory::DataSource,
            inputs: vec![],
            outputs: vec![PortDefinition::optional(Self::PORT_DATA, "Data")],
        }
    }
}

inventory::submit!(dataflow_engine::DescriptorFn(CsvFileWidget::descriptor));
inventory::submit!(dataflow_engine::ExecutorFn {
    kind: CsvFileWidget::KIND,
    executor: crate::shared::<CsvFileWidget>,
});

#[async_trait]
impl WidgetExecutor for CsvFileWidget {
    async fn execute(&self, invocation: WidgetInvocation) -> Result<PortValues, WidgetError> {
        let path = invocation
            .param("filePath")
            .and_then(Value::as_str)
            .ok_or_else(|| WidgetError::invalid("filePath", "a file path"))?;
        let delimiter = delimiter_param(&invocation)?;
        let has_headers = invocation
            .param("header")
            .and_then(Value::as_bool)
            .unwrap_or(true);

        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| WidgetError::failed(format!("Failed to read '{}': {}", path, e)))?;
        invocation.check_cancelled()?;

        let table = Self::parse(&text, delimiter, has_headers)?;
        log::debug!(
            "CsvFileWidget {}: read {} row(s) from '{}'",
            invocation.node_id,
            table.row_count(),
            path
        );

        let mut outputs = PortValues::new();
        outputs.insert(Self::PORT_DATA.to_string(), table.into());
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::tests::invocation;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_parse_types_cells() {
        let table = CsvFileWidget::parse("name,age,score\nAda,36,9.5\nBo,,x\n", b',', true).unwrap();
        assert_eq!(
            Value::from(table),
            json!([
                {"name": "Ada", "age": 36, "score": 9.5},
                {"name": "Bo", "age": null, "score": "x"}
            ])
        );
    }

    #[test]
    fn test_parse_without_header() {
        let table = CsvFileWidget::parse("1;2\n3;4\n", b';', false).unwrap();
        assert_eq!(table.columns(), ["column_0", "column_1"]);
        assert_eq!(table.numeric_column("column_1"), vec![2.0, 4.0]);
    }

    #[test]
    fn test_parse_rejects_ragged_records() {
        assert!(CsvFileWidget::parse("a,b\n1,2,3\n", b',', true).is_err());
    }

    #[tokio::test]
    async fn test_reads_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.tsv");
        std::fs::write(&path, "x\ty\n1\t2\n").unwrap();

        let inv = invocation(
            "csv_file",
            json!(null),
            json!({"filePath": path.to_str().unwrap(), "delimiter": "\t"}),
        );
        let out = CsvFileWidget.execute(inv).await.unwrap();
        assert_eq!(out["data"], json!([{"x": 1, "y": 2}]));
    }

    #[tokio::test]
    async fn test_missing_file_fails() {
        let inv = invocation("csv_file", json!(null), json!({"filePath": "/no/such/file.csv"}));
        let err = CsvFileWidget.execute(inv).await.unwrap_err();
        assert!(err.to_string().starts_with("Failed to read"));

        let inv = invocation("csv_file", json!(null), json!({}));
        assert!(matches!(
            CsvFileWidget.execute(inv).await,
            Err(WidgetError::InvalidInput { .. })
        ));
    }
}
