//! Manual Data Widget
//!
//! Emits rows typed directly into the node configuration.

use async_trait::async_trait;
use dataflow_engine::{
    PortDefinition, PortValues, WidgetCategory, WidgetDefinition, WidgetDescriptor, WidgetError,
    WidgetExecutor, WidgetInvocation,
};
use serde_json::{Map, Value};

use crate::table::Table;

/// Manual Data Widget
///
/// # Params
/// - `rows` - array of row objects, or
/// - `columns` + `values` - column names and an array of row arrays
///
/// # Outputs
/// - `data` - the rows
#[derive(Debug, Clone, Copy, Default)]
pub struct ManualDataWidget;

impl ManualDataWidget {
    pub const KIND: &'static str = "manual_data";
    /// Port ID for data output
    pub const PORT_DATA: &'static str = "data";

    fn rows_from_matrix(columns: &[Value], values: &[Value]) -> Result<Table, WidgetError> {
        let names = columns
            .iter()
            .map(|c| c.as_str().map(String::from))
            .collect::<Option<Vec<String>>>()
            .ok_or_else(|| WidgetError::invalid("columns", "a list of column names"))?;

        let mut rows = Vec::with_capacity(values.len());
        for (index, row) in values.iter().enumerate() {
            let cells = row
                .as_array()
                .ok_or_else(|| WidgetError::invalid("values", "an array of row arrays"))?;
            if cells.len() != names.len() {
                return Err(WidgetError::failed(format!(
                    "Row {} has {} value(s), expected {}",
                    index,
                    cells.len(),
                    names.len()
                )));
            }
            let row: Map<String, Value> = names.iter().cloned().zip(cells.iter().cloned()).collect();
            rows.push(row);
        }
        Ok(Table::new(rows))
    }
}

impl WidgetDescriptor for ManualDataWidget {
    fn descriptor() -> WidgetDefinition {
        WidgetDefinition {
            kind: Self::KIND.to_string(),
            label: "Manual Data".to_string(),
            description: "Enter rows by hand".to_string(),
            category: WidgetCategory::DataSource,
            inputs: vec![],
            outputs: vec![PortDefinition::optional(Self::PORT_DATA, "Data")],
        }
    }
}

inventory::submit!(dataflow_engine::DescriptorFn(ManualDataWidget::descriptor));
inventory::submit!(dataflow_engine::ExecutorFn {
    kind: ManualDataWidget::KIND,
    executor: crate::shared::<ManualDataWidget>,
});

#[async_trait]
impl WidgetExecutor for ManualDataWidget {
    async fn execute(&self, invocation: WidgetInvocation) -> Result<PortValues, WidgetError> {
        let table = match (
            invocation.param("rows"),
            invocation.param("columns").and_then(Value::as_array),
            invocation.param("values").and_then(Value::as_array),
        ) {
            (Some(rows), _, _) => Table::from_value(rows, "rows")?,
            (None, Some(columns), Some(values)) => Self::rows_from_matrix(columns, values)?,
            _ => return Err(WidgetError::invalid("rows", "an array of row objects")),
        };

        let mut outputs = PortValues::new();
        outputs.insert(Self::PORT_DATA.to_string(), table.into());
        Ok(outputs)
    }
}
