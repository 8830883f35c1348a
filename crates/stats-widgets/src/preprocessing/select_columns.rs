//! Select Columns Widget

use async_trait::async_trait;
use dataflow_engine::{
    PortDefinition, PortValues, WidgetCategory, WidgetDefinition, WidgetDescriptor, WidgetError,
    WidgetExecutor, WidgetInvocation,
};

use crate::table::{column_list, Row, Table};

/// Select Columns Widget
///
/// Keeps only the listed columns. Rows missing a selected column get no
/// entry for it rather than a null.
///
/// # Inputs
/// - `data` (required) - table to project
///
/// # Params
/// - `columns` (required) - column names, as a list or comma-separated string
///
/// # Outputs
/// - `data` - projected table
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectColumnsWidget;

impl SelectColumnsWidget {
    pub const KIND: &'static str = "select_columns";
    /// Port ID for data input and output
    pub const PORT_DATA: &'static str = "data";
}

impl WidgetDescriptor for SelectColumnsWidget {
    fn descriptor() -> WidgetDefinition {
        WidgetDefinition {
            kind: Self::KIND.to_string(),
            label: "Select Columns".to_string(),
            description: "Keeps a subset of columns".to_string(),
            category: WidgetCategory::Preprocessing,
            inputs: vec![PortDefinition::required(Self::PORT_DATA, "Data")],
            outputs: vec![PortDefinition::optional(Self::PORT_DATA, "Data")],
        }
    }
}

inventory::submit!(dataflow_engine::DescriptorFn(SelectColumnsWidget::descriptor));
inventory::submit!(dataflow_engine::ExecutorFn {
    kind: SelectColumnsWidget::KIND,
    executor: crate::shared::<SelectColumnsWidget>,
});

#[async_trait]
impl WidgetExecutor for SelectColumnsWidget {
    async fn execute(&self, invocation: WidgetInvocation) -> Result<PortValues, WidgetError> {
        let table = Table::from_input(&invocation, Self::PORT_DATA)?;
        let columns = column_list(&invocation, "columns")?
            .filter(|c| !c.is_empty())
            .ok_or_else(|| WidgetError::invalid("columns", "at least one column name"))?;
        table.require_columns(&columns)?;

        let rows: Vec<Row> = table
            .into_rows()
            .into_iter()
            .map(|mut row| {
                let mut kept = Row::new();
                for column in &columns {
                    if let Some(value) = row.remove(column) {
                        kept.insert(column.clone(), value);
                    }
                }
                kept
            })
            .collect();

        let mut outputs = PortValues::new();
        outputs.insert(Self::PORT_DATA.to_string(), Table::new(rows).into());
        Ok(outputs)
    }
}
