//! Data Info Widget
//!
//! Summarizes the shape and column types of a table.

use async_trait::async_trait;
use dataflow_engine::{
    PortDefinition, PortValues, WidgetCategory, WidgetDefinition, WidgetDescriptor, WidgetError,
    WidgetExecutor, WidgetInvocation,
};
use serde_json::{json, Map, Value};

use crate::table::{as_number, Table};

/// Data Info Widget
///
/// # Inputs
/// - `data` (required) - table to inspect
///
/// # Outputs
/// - `info` - `{shape: [rows, columns], columns, dtypes, missingValues}`
///
/// A column's dtype is `number`, `boolean` or `string` when every present
/// value has that type, `mixed` otherwise, and `empty` when all are missing.
#[derive(Debug, Clone, Copy, Default)]
pub struct DataInfoWidget;

impl DataInfoWidget {
    pub const KIND: &'static str = "data_info";
    /// Port ID for data input
    pub const PORT_DATA: &'static str = "data";
    /// Port ID for info output
    pub const PORT_INFO: &'static str = "info";

    fn dtype(table: &Table, column: &str) -> &'static str {
        let mut kind: Option<&'static str> = None;
        for row in table.rows() {
            let this = match row.get(column) {
                None | Some(Value::Null) => continue,
                Some(Value::Number(_)) => "number",
                Some(Value::Bool(_)) => "boolean",
                Some(value @ Value::String(_)) if as_number(value).is_some() => "number",
                Some(Value::String(_)) => "string",
                Some(_) => "mixed",
            };
            match kind {
                None => kind = Some(this),
                Some(existing) if existing != this => return "mixed",
                Some(_) => {}
            }
        }
        kind.unwrap_or("empty")
    }

    /// Build the info object for a table
    pub fn describe(table: &Table) -> Value {
        let mut dtypes = Map::new();
        let mut missing = Map::new();
        for column in table.columns() {
            dtypes.insert(column.clone(), json!(Self::dtype(table, column)));
            missing.insert(column.clone(), json!(table.missing_count(column)));
        }
        json!({
            "shape": [table.row_count(), table.columns().len()],
            "columns": table.columns(),
            "dtypes": dtypes,
            "missingValues": missing,
        })
    }
}

impl WidgetDescriptor for DataInfoWidget {
    fn descriptor() -> WidgetDefinition {
        WidgetDefinition {
            kind: Self::KIND.to_string(),
            label: "Data Info".to_string(),
            description: "Shows row count, column types and missing values".to_string(),
            category: WidgetCategory::Preprocessing,
            inputs: vec![PortDefinition::required(Self::PORT_DATA, "Data")],
            outputs: vec![PortDefinition::optional(Self::PORT_INFO, "Info")],
        }
    }
}

inventory::submit!(dataflow_engine::DescriptorFn(DataInfoWidget::descriptor));
inventory::submit!(dataflow_engine::ExecutorFn {
    kind: DataInfoWidget::KIND,
    executor: crate::shared::<DataInfoWidget>,
});

#[async_trait]
impl WidgetExecutor for DataInfoWidget {
    async fn execute(&self, invocation: WidgetInvocation) -> Result<PortValues, WidgetError> {
        let table = Table::from_input(&invocation, Self::PORT_DATA)?;
        let mut outputs = PortValues::new();
        outputs.insert(Self::PORT_INFO.to_string(), Self::describe(&table));
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::tests::{invocation, people};

    #[tokio::test]
    async fn test_info() {
        let out = DataInfoWidget
            .execute(invocation("data_info", people(), json!({})))
            .await
            .unwrap();
        let info = &out["info"];
        assert_eq!(info["shape"], json!([4, 3]));
        assert_eq!(info["dtypes"]["age"], "number");
        assert_eq!(info["dtypes"]["name"], "string");
        assert_eq!(info["missingValues"]["score"], 1);
        assert_eq!(info["missingValues"]["name"], 0);
    }

    #[test]
    fn test_mixed_and_empty_dtypes() {
        let table = Table::from_value(
            &json!([{"a": 1, "b": null}, {"a": "x", "b": null}]),
            "data",
        )
        .unwrap();
        let info = DataInfoWidget::describe(&table);
        assert_eq!(info["dtypes"]["a"], "mixed");
        assert_eq!(info["dtypes"]["b"], "empty");
    }

    #[tokio::test]
    async fn test_requires_table() {
        let err = DataInfoWidget
            .execute(invocation("data_info", json!("not a table"), json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, WidgetError::InvalidInput { .. }));
    }
}
