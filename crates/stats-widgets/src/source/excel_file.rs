//! Excel File Widget
//!
//! Loads a table from one worksheet of an `.xlsx` workbook.

use async_trait::async_trait;
use dataflow_engine::{
    PortDefinition, PortValues, WidgetCategory, WidgetDefinition, WidgetDescriptor, WidgetError,
    WidgetExecutor, WidgetInvocation,
};
use serde_json::Value;

use crate::xlsx;

/// Excel File Widget
///
/// Numeric cells become JSON numbers, boolean cells booleans and text cells
/// strings; empty cells become null.
///
/// # Params
/// - `filePath` (required) - workbook to read
/// - `sheetName` - worksheet to read (default: the first)
/// - `header` - whether the first row holds column names (default true)
///
/// # Outputs
/// - `data` - the parsed rows
#[derive(Debug, Clone, Copy, Default)]
pub struct ExcelFileWidget;

impl ExcelFileWidget {
    pub const KIND: &'static str = "excel_file";
    /// Port ID for data output
    pub const PORT_DATA: &'static str = "data";
}

impl WidgetDescriptor for ExcelFileWidget {
    fn descriptor() -> WidgetDefinition {
        WidgetDefinition {
            kind: Self::KIND.to_string(),
            label: "Excel File".to_string(),
            description: "Loads data from an Excel workbook".to_string(),
            category: WidgetCategory::DataSource,
            inputs: vec![],
            outputs: vec![PortDefinition::optional(Self::PORT_DATA, "Data")],
        }
    }
}

inventory::submit!(dataflow_engine::DescriptorFn(ExcelFileWidget::descriptor));
inventory::submit!(dataflow_engine::ExecutorFn {
    kind: ExcelFileWidget::KIND,
    executor: crate::shared::<ExcelFileWidget>,
});

#[async_trait]
impl WidgetExecutor for ExcelFileWidget {
    async fn execute(&self, invocation: WidgetInvocation) -> Result<PortValues, WidgetError> {
        let path = invocation
            .param("filePath")
            .and_then(Value::as_str)
            .ok_or_else(|| WidgetError::invalid("filePath", "a file path"))?;
        let sheet = match invocation.param("sheetName") {
            None | Some(Value::Null) => None,
            Some(Value::String(name)) => Some(name.as_str()),
            Some(_) => return Err(WidgetError::invalid("sheetName", "a sheet name")),
        };
        let header = invocation
            .param("header")
            .and_then(Value::as_bool)
            .unwrap_or(true);

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| WidgetError::failed(format!("Failed to read '{}': {}", path, e)))?;
        invocation.check_cancelled()?;

        let table = xlsx::read_workbook(&bytes, sheet, header)?;
        log::debug!(
            "ExcelFileWidget {}: read {} row(s) from '{}'",
            invocation.node_id,
            table.row_count(),
            path
        );

        let mut outputs = PortValues::new();
        outputs.insert(Self::PORT_DATA.to_string(), table.into());
        Ok(outputs)
    }
}
