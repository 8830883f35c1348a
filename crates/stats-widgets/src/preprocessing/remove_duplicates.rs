//! Remove Duplicates Widget

use std::collections::HashSet;

use async_trait::async_trait;
use dataflow_engine::{
    PortDefinition, PortValues, WidgetCategory, WidgetDefinition, WidgetDescriptor, WidgetError,
    WidgetExecutor, WidgetInvocation,
};
use serde_json::Value;

use crate::table::{column_list, Table};

/// Remove Duplicates Widget
///
/// Keeps the first occurrence of each row. With `subset`, rows are compared
/// on those columns only.
///
/// # Inputs
/// - `data` (required) - table to de-duplicate
///
/// # Params
/// - `subset` - columns to compare (default: all columns)
///
/// # Outputs
/// - `data` - table without duplicates
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoveDuplicatesWidget;

impl RemoveDuplicatesWidget {
    pub const KIND: &'static str = "remove_duplicates";
    /// Port ID for data input and output
    pub const PORT_DATA: &'static str = "data";
}

impl WidgetDescriptor for RemoveDuplicatesWidget {
    fn descriptor() -> WidgetDefinition {
        WidgetDefinition {
            kind: Self::KIND.to_string(),
            label: "Remove Duplicates".to_string(),
            description: "Drops repeated rows".to_string(),
            category: WidgetCategory::Preprocessing,
            inputs: vec![PortDefinition::required(Self::PORT_DATA, "Data")],
            outputs: vec![PortDefinition::optional(Self::PORT_DATA, "Data")],
        }
    }
}

inventory::submit!(dataflow_engine::DescriptorFn(RemoveDuplicatesWidget::descriptor));
inventory::submit!(dataflow_engine::ExecutorFn {
    kind: RemoveDuplicatesWidget::KIND,
    executor: crate::shared::<RemoveDuplicatesWidget>,
});

#[async_trait]
impl WidgetExecutor for RemoveDuplicatesWidget {
    async fn execute(&self, invocation: WidgetInvocation) -> Result<PortValues, WidgetError> {
        let table = Table::from_input(&invocation, Self::PORT_DATA)?;
        let subset = match column_list(&invocation, "subset")? {
            Some(columns) if !columns.is_empty() => {
                table.require_columns(&columns)?;
                columns
            }
            _ => table.columns().to_vec(),
        };

        let before = table.row_count();
        let mut seen: HashSet<String> = HashSet::new();
        let mut rows = Vec::with_capacity(before);
        for row in table.into_rows() {
            let key: Vec<&Value> = subset
                .iter()
                .map(|c| row.get(c).unwrap_or(&Value::Null))
                .collect();
            // serde_json renders maps in key order, so equal rows give equal keys
            let key = serde_json::to_string(&key)
                .map_err(|e| WidgetError::failed(e.to_string()))?;
            if seen.insert(key) {
                rows.push(row);
            }
        }

        log::debug!(
            "RemoveDuplicatesWidget {}: removed {} of {} row(s)",
            invocation.node_id,
            before - rows.len(),
            before
        );
        let mut outputs = PortValues::new();
        outputs.insert(Self::PORT_DATA.to_string(), Table::new(rows).into());
        Ok(outputs)
    }
}
