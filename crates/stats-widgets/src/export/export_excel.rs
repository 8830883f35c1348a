//! Export Excel Widget

use std::path::Path;

use async_trait::async_trait;
use dataflow_engine::{
    PortDefinition, PortValues, WidgetCategory, WidgetDefinition, WidgetDescriptor, WidgetError,
    WidgetExecutor, WidgetInvocation,
};
use serde_json::{json, Value};

use crate::table::{column_list, Table};
use crate::xlsx;

/// Export Excel Widget
///
/// Writes a table to a one-sheet `.xlsx` workbook.
///
/// # Inputs
/// - `data` (required) - table to write
///
/// # Params
/// - `filePath` (required) - destination; parent directories are created
/// - `sheetName` - worksheet name (default `Sheet1`)
/// - `header` - whether to write a header row (default true)
/// - `columns` - column order (default: table column order)
///
/// # Outputs
/// - `file` - `{path, rows, size}`
#[derive(Debug, Clone, Copy, Default)]
pub struct ExportExcelWidget;

impl ExportExcelWidget {
    pub const KIND: &'static str = "export_excel";
    /// Port ID for data input
    pub const PORT_DATA: &'static str = "data";
    /// Port ID for the written file summary
    pub const PORT_FILE: &'static str = "file";
    /// Worksheet name when none is given
    pub const DEFAULT_SHEET: &'static str = "Sheet1";
}

impl WidgetDescriptor for ExportExcelWidget {
    fn descriptor() -> WidgetDefinition {
        WidgetDefinition {
            kind: Self::KIND.to_string(),
            label: "Export Excel".to_string(),
            description: "Writes a table to an Excel workbook".to_string(),
            category: WidgetCategory::Export,
            inputs: vec![PortDefinition::required(Self::PORT_DATA, "Data")],
            outputs: vec![PortDefinition::optional(Self::PORT_FILE, "File")],
        }
    }
}

inventory::submit!(dataflow_engine::DescriptorFn(ExportExcelWidget::descriptor));
inventory::submit!(dataflow_engine::ExecutorFn {
    kind: ExportExcelWidget::KIND,
    executor: crate::shared::<ExportExcelWidget>,
});

#[async_trait]
impl WidgetExecutor for ExportExcelWidget {
    async fn execute(&self, invocation: WidgetInvocation) -> Result<PortValues, WidgetError> {
        let table = Table::from_input(&invocation, Self::PORT_DATA)?;
        let path = invocation
            .param("filePath")
            .and_then(Value::as_str)
            .ok_or_else(|| WidgetError::invalid("filePath", "a file path"))?;
        let sheet_name = invocation
            .param("sheetName")
            .and_then(Value::as_str)
            .unwrap_or(Self::DEFAULT_SHEET);
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

        let bytes = xlsx::write_workbook(&table, &columns, sheet_name, header)?;
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
            "ExportExcelWidget {}: wrote {} row(s) to '{}' sheet '{}'",
            invocation.node_id,
            table.row_count(),
            path,
            sheet_name
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::tests::{invocation, people};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_writes_workbook() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join("people.xlsx");
        let inv = invocation(
            "export_excel",
            people(),
            json!({"filePath": path.to_str().unwrap(), "columns": ["name", "age"]}),
        );

        let out = ExportExcelWidget.execute(inv).await.unwrap();
        assert_eq!(out["file"]["rows"], 4);

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(out["file"]["size"], bytes.len());
        let table = xlsx::read_workbook(&bytes, Some(ExportExcelWidget::DEFAULT_SHEET), true).unwrap();
        assert_eq!(table.columns().len(), 2);
        assert_eq!(table.rows()[2]["name"], "Chen");
        assert_eq!(table.rows()[2]["age"], "29");
    }

    #[tokio::test]
    async fn test_rejects_bad_sheet_name() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("people.xlsx");
        let err = ExportExcelWidget
            .execute(invocation(
                "export_excel",
                people(),
                json!({"filePath": path.to_str().unwrap(), "sheetName": "a/b"}),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, WidgetError::InvalidInput { .. }));
        assert!(!path.exists());
    }
}
