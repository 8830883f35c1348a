//! Export CSV Widget

use std::path::Path;

use async_trait::async_trait;
use csv::WriterBuilder;
use dataflow_engine::{
    PortDefinition, PortValues, WidgetCategory, WidgetDefinition, WidgetDescriptor, WidgetError,
    WidgetExecutor, WidgetInvocation,
};
use serde_json::{json, Value};

use crate::source::delimiter_param;
use crate::table::{column_list, Table};

/// Export CSV Widget
///
/// Writes a table to disk. Missing cells are written empty; nested values
/// are written as compact JSON.
///
/// # Inputs
/// - `data` (required) - table to write
///
/// # Params
/// - `filePath` (required) - destination; parent directories are created
/// - `delimiter` - field separator (default `,`)
/// - `header` - whether to write a header line (default true)
/// - `columns` - column order (default: table column order)
///
/// # Outputs
/// - `file` - `{path, rows, size}`
#[derive(Debug, Clone, Copy, Default)]
pub struct ExportCsvWidget;

impl ExportCsvWidget {
    pub const KIND: &'static str = "export_csv";
    /// Port ID for data input
    pub const PORT_DATA: &'static str = "data";
    /// Port ID for the written file summary
    pub const PORT_FILE: &'static str = "file";

    /// Render a table as CSV bytes
    pub fn render(
        table: &Table,
        columns: &[String],
        delimiter: u8,
        header: bool,
    ) -> Result<Vec<u8>, WidgetError> {
        let mut writer = WriterBuilder::new()
            .delimiter(delimiter)
            .from_writer(Vec::new());
        let fail = |e: csv::Error| WidgetError::failed(format!("Failed to write CSV: {}", e));

        if header {
            writer.write_record(columns).map_err(fail)?;
        }
        for row in table.rows() {
            let record: Vec<String> = columns.iter().map(|c| cell(row.get(c))).collect();
            writer.write_record(&record).map_err(fail)?;
        }
        writer
            .into_inner()
            .map_err(|e| WidgetError::failed(format!("Failed to write CSV: {}", e.error())))
    }
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

impl WidgetDescriptor for ExportCsvWidget {
    fn descriptor() -> WidgetDefinition {
        WidgetDefinition {
            kind: Self::KIND.to_string(),
            label: "Export CSV".to_string(),
            description: "Writes a table to a CSV file".to_string(),
            category: WidgetCategory::Export,
            inputs: vec![PortDefinition::required(Self::PORT_DATA, "Data")],
            outputs: vec![PortDefinition::optional(Self::PORT_FILE, "File")],
        }
    }
}

inventory::submit!(dataflow_engine::DescriptorFn(ExportCsvWidget::descriptor));
inventory::submit!(dataflow_engine::ExecutorFn {
    kind: ExportCsvWidget::KIND,
    executor: crate::shared::<ExportCsvWidget>,
});

#[async_trait]
impl WidgetExecutor for ExportCsvWidget {
    async fn execute(&self, invocation: WidgetInvocation) -> Result<PortValues, WidgetError> {
        let table = Table::from_input(&invocation, Self::PORT_DATA)?;
        let path = invocation
            .param("filePath")
            .and_then(Value::as_str)
            .ok_or_else(|| WidgetError::invalid("filePath", "a file path"))?;
        let delimiter = delimiter_param(&invocation)?;
        let header = invocation
            .param("header")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        let columns = match column_list(&invocation, "columns")? {
            Some(columns) if !columns.is_empty() => {
                table.require_columns(&columns)?;
                columns
            }
            _ => table.columns().to_vec(),
        };

        let bytes = Self::render(&table, &columns, delimiter, header)?;
        invocation.check_cancelled()?;

        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    WidgetError::failed(format!("Failed to create '{}': {}", parent.display(), e))
                })?;
            }
        }
        tokio::fs::write(path, &bytes)
            .await
            .map_err(|e| WidgetError::failed(format!("Failed to write '{}': {}", path, e)))?;
        log::info!(
            "ExportCsvWidget {}: wrote {} row(s) to '{}'",
            invocation.node_id,
            table.row_count(),
            path
        );

        let mut outputs = PortValues::new();
        outputs.insert(
            Self::PORT_FILE.to_string(),
            json!({
                "path": path,
                "rows": table.row_count(),
                "size": bytes.len(),
            }),
        );
        Ok(outputs)
    }
}
