//! Handle Missing Widget

use std::str::FromStr;

use async_trait::async_trait;
use dataflow_engine::{
    PortDefinition, PortValues, WidgetCategory, WidgetDefinition, WidgetDescriptor, WidgetError,
    WidgetExecutor, WidgetInvocation,
};
use serde_json::Value;

use crate::stats;
use crate::table::{column_list, is_missing, number, Table};

/// Strategy for missing cells
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingMethod {
    /// Drop rows with a missing cell in any considered column
    Drop,
    /// Replace missing cells with `fillValue`
    Fill,
    /// Replace missing numeric cells with the column mean
    Mean,
    /// Replace missing numeric cells with the column median
    Median,
}

impl FromStr for MissingMethod {
    type Err = WidgetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "drop" => Ok(Self::Drop),
            "fill" => Ok(Self::Fill),
            "mean" => Ok(Self::Mean),
            "median" => Ok(Self::Median),
            _ => Err(WidgetError::invalid("method", "one of drop, fill, mean, median")),
        }
    }
}

/// Handle Missing Widget
///
/// # Inputs
/// - `data` (required) - table to clean
///
/// # Params
/// - `method` - `drop` (default), `fill`, `mean` or `median`
/// - `fillValue` - replacement for `fill`
/// - `columns` - columns to consider (default: all columns)
///
/// # Outputs
/// - `data` - cleaned table
#[derive(Debug, Clone, Copy, Default)]
pub struct HandleMissingWidget;

impl HandleMissingWidget {
    pub const KIND: &'static str = "handle_missing";
    /// Port ID for data input and output
    pub const PORT_DATA: &'static str = "data";
}

impl WidgetDescriptor for HandleMissingWidget {
    fn descriptor() -> WidgetDefinition {
        WidgetDefinition {
            kind: Self::KIND.to_string(),
            label: "Handle Missing Values".to_string(),
            description: "Drops or fills missing values".to_string(),
            category: WidgetCategory::Preprocessing,
            inputs: vec![PortDefinition::required(Self::PORT_DATA, "Data")],
            outputs: vec![PortDefinition::optional(Self::PORT_DATA, "Data")],
        }
    }
}

inventory::submit!(dataflow_engine::DescriptorFn(HandleMissingWidget::descriptor));
inventory::submit!(dataflow_engine::ExecutorFn {
    kind: HandleMissingWidget::KIND,
    executor: crate::shared::<HandleMissingWidget>,
});

#[async_trait]
impl WidgetExecutor for HandleMissingWidget {
    async fn execute(&self, invocation: WidgetInvocation) -> Result<PortValues, WidgetError> {
        let table = Table::from_input(&invocation, Self::PORT_DATA)?;
        let method = match invocation.param("method").and_then(Value::as_str) {
            Some(name) => name.parse()?,
            None => MissingMethod::Drop,
        };
        let columns = match column_list(&invocation, "columns")? {
            Some(columns) if !columns.is_empty() => {
                table.require_columns(&columns)?;
                columns
            }
            _ => table.columns().to_vec(),
        };

        let cleaned = match method {
            MissingMethod::Drop => {
                let rows = table
                    .into_rows()
                    .into_iter()
                    .filter(|row| columns.iter().all(|c| !is_missing(row.get(c))))
                    .collect();
                Table::new(rows)
            }
            MissingMethod::Fill => {
                let fill = invocation
                    .param("fillValue")
                    .cloned()
                    .ok_or_else(|| WidgetError::invalid("fillValue", "a value to fill with"))?;
                fill_columns(table, &columns, |_| Some(fill.clone()))
            }
            MissingMethod::Mean | MissingMethod::Median => {
                let replacements: Vec<(String, Option<Value>)> = columns
                    .iter()
                    .map(|c| {
                        let values = table.numeric_column(c);
                        let center = if method == MissingMethod::Mean {
                            stats::mean(&values)
                        } else {
                            stats::quantile_sorted(&stats::sorted(&values), 0.5)
                        };
                        (c.clone(), center.map(number))
                    })
                    .collect();
                fill_columns(table, &columns, |column| {
                    replacements
                        .iter()
                        .find(|(name, _)| name == column)
                        .and_then(|(_, value)| value.clone())
                })
            }
        };

        let mut outputs = PortValues::new();
        outputs.insert(Self::PORT_DATA.to_string(), cleaned.into());
        Ok(outputs)
    }
}

/// Replace missing cells of `columns`; a `None` replacement leaves the cell as is
fn fill_columns(table: Table, columns: &[String], replacement: impl Fn(&str) -> Option<Value>) -> Table {
    let rows = table
        .into_rows()
        .into_iter()
        .map(|mut row| {
            for column in columns {
                if is_missing(row.get(column)) {
                    if let Some(value) = replacement(column) {
                        row.insert(column.clone(), value);
                    }
                }
            }
            row
        })
        .collect();
    Table::new(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use crate::table::tests::{invocation, people};

    fn sparse() -> Value {
        json!([
            {"x": 1, "y": "a"},
            {"x": null, "y": "b"},
            {"x": 5, "y": null},
            {"x": 6}
        ])
    }

    async fn run(params: Value) -> Result<Value, WidgetError> {
        HandleMissingWidget
            .execute(invocation("handle_missing", sparse(), params))
            .await
            .map(|mut out| out.remove("data").unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_drop_is_default() {
        let data = run(json!({})).await.unwrap();
        assert_eq!(data, json!([{"x": 1, "y": "a"}]));

        let data = run(json!({"columns": ["x"]})).await.unwrap();
        assert_eq!(data.as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_fill_value() {
        let data = run(json!({"method": "fill", "fillValue": 0})).await.unwrap();
        assert_eq!(data[1]["x"], 0);
        assert_eq!(data[2]["y"], 0);
        assert_eq!(data[3]["y"], 0);

        let err = run(json!({"method": "fill"})).await.unwrap_err();
        assert!(matches!(err, WidgetError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn test_mean_and_median() {
        let data = run(json!({"method": "mean", "columns": "x"})).await.unwrap();
        assert_eq!(data[1]["x"], json!(4.0));
        // non-numeric columns are left alone
        let data = run(json!({"method": "median"})).await.unwrap();
        assert_eq!(data[1]["x"], json!(5.0));
        assert!(data[2]["y"].is_null());
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let err = HandleMissingWidget
            .execute(invocation("handle_missing", people(), json!({"method": "guess"})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("drop, fill, mean, median"));
    }
}
