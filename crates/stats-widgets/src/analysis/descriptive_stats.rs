//! Descriptive Statistics Widget

use async_trait::async_trait;
use dataflow_engine::{
    PortDefinition, PortValues, WidgetCategory, WidgetDefinition, WidgetDescriptor, WidgetError,
    WidgetExecutor, WidgetInvocation,
};
use serde_json::{json, Map, Value};

use crate::stats;
use crate::table::{column_list, number, Table};

/// Descriptive Statistics Widget
///
/// # Inputs
/// - `data` (required) - table to summarize
///
/// # Params
/// - `columns` - columns to summarize (default: every numeric column)
///
/// # Outputs
/// - `stats` - per column: `count`, `mean`, `std`, `min`, `max`,
///   `percentiles` (`25%`, `50%`, `75%`), `skewness`, `kurtosis`.
///   Statistics that are undefined for the column are null.
#[derive(Debug, Clone, Copy, Default)]
pub struct DescriptiveStatsWidget;

impl DescriptiveStatsWidget {
    pub const KIND: &'static str = "descriptive_stats";
    /// Port ID for data input
    pub const PORT_DATA: &'static str = "data";
    /// Port ID for stats output
    pub const PORT_STATS: &'static str = "stats";

    /// Summary of one column's numeric values
    pub fn summarize(values: &[f64]) -> Value {
        let sorted = stats::sorted(values);
        let opt = |v: Option<f64>| v.map_or(Value::Null, number);
        json!({
            "count": values.len(),
            "mean": opt(stats::mean(values)),
            "std": opt(stats::std_dev(values)),
            "min": opt(sorted.first().copied()),
            "max": opt(sorted.last().copied()),
            "percentiles": {
                "25%": opt(stats::quantile_sorted(&sorted, 0.25)),
                "50%": opt(stats::quantile_sorted(&sorted, 0.5)),
                "75%": opt(stats::quantile_sorted(&sorted, 0.75)),
            },
            "skewness": opt(stats::skewness(values)),
            "kurtosis": opt(stats::kurtosis(values)),
        })
    }
}

impl WidgetDescriptor for DescriptiveStatsWidget {
    fn descriptor() -> WidgetDefinition {
        WidgetDefinition {
            kind: Self::KIND.to_string(),
            label: "Descriptive Statistics".to_string(),
            description: "Count, mean, spread and shape of numeric columns".to_string(),
            category: WidgetCategory::Analysis,
            inputs: vec![PortDefinition::required(Self::PORT_DATA, "Data")],
            outputs: vec![PortDefinition::optional(Self::PORT_STATS, "Statistics")],
        }
    }
}

inventory::submit!(dataflow_engine::DescriptorFn(DescriptiveStatsWidget::descriptor));
inventory::submit!(dataflow_engine::ExecutorFn {
    kind: DescriptiveStatsWidget::KIND,
    executor: crate::shared::<DescriptiveStatsWidget>,
});

#[async_trait]
impl WidgetExecutor for DescriptiveStatsWidget {
    async fn execute(&self, invocation: WidgetInvocation) -> Result<PortValues, WidgetError> {
        let table = Table::from_input(&invocation, Self::PORT_DATA)?;
        let columns = match column_list(&invocation, "columns")? {
            Some(columns) if !columns.is_empty() => {
                table.require_columns(&columns)?;
                columns
            }
            _ => table.numeric_columns(),
        };
        if columns.is_empty() {
            return Err(WidgetError::failed("No numeric columns to summarize"));
        }

        let mut summary = Map::new();
        for column in &columns {
            invocation.check_cancelled()?;
            summary.insert(column.clone(), Self::summarize(&table.numeric_column(column)));
        }

        let mut outputs = PortValues::new();
        outputs.insert(Self::PORT_STATS.to_string(), Value::Object(summary));
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::tests::{invocation, people};

    #[test]
    fn test_summarize() {
        let summary = DescriptiveStatsWidget::summarize(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(summary["count"], 4);
        assert_eq!(summary["mean"], json!(2.5));
        assert_eq!(summary["min"], json!(1.0));
        assert_eq!(summary["max"], json!(4.0));
        assert_eq!(summary["percentiles"]["50%"], json!(2.5));
        assert_eq!(summary["skewness"], json!(0.0));
    }

    #[test]
    fn test_summarize_empty_column() {
        let summary = DescriptiveStatsWidget::summarize(&[]);
        assert_eq!(summary["count"], 0);
        assert!(summary["mean"].is_null());
        assert!(summary["std"].is_null());
    }

    #[tokio::test]
    async fn test_defaults_to_numeric_columns() {
        let out = DescriptiveStatsWidget
            .execute(invocation("descriptive_stats", people(), json!({})))
            .await
            .unwrap();
        let stats = out["stats"].as_object().unwrap();
        let keys: Vec<&str> = stats.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["age", "score"]);
        assert_eq!(stats["score"]["count"], 3);
    }

    #[tokio::test]
    async fn test_no_numeric_columns() {
        let err = DescriptiveStatsWidget
            .execute(invocation("descriptive_stats", json!([{"a": "x"}]), json!({})))
            .await
            .unwrap_err();
        assert_eq!(err, WidgetError::failed("No numeric columns to summarize"));
    }
}
