//! Box Plot Widget

use async_trait::async_trait;
use dataflow_engine::{
    PortDefinition, PortValues, WidgetCategory, WidgetDefinition, WidgetDescriptor, WidgetError,
    WidgetExecutor, WidgetInvocation,
};
use serde_json::{json, Map, Value};

use crate::stats;
use crate::table::{column_list, number, Table};

/// Box Plot Widget
///
/// Five-number summary per column with whiskers at 1.5 IQR.
///
/// # Inputs
/// - `data` (required) - source table
///
/// # Params
/// - `columns` - columns to plot (default: every numeric column)
/// - `title` - chart title (default `Box Plot`)
///
/// # Outputs
/// - `plot` - `{type: "box", title, columns, statistics}` where
///   `statistics[column]` holds `mean`, `median`, `q1`, `q3`, `min`, `max`,
///   `lowerWhisker`, `upperWhisker`, `outliers`, `count`
#[derive(Debug, Clone, Copy, Default)]
pub struct BoxPlotWidget;

impl BoxPlotWidget {
    pub const KIND: &'static str = "box_plot";
    /// Port ID for data input
    pub const PORT_DATA: &'static str = "data";
    /// Port ID for plot output
    pub const PORT_PLOT: &'static str = "plot";

    /// Box statistics for one column; `None` without values
    pub fn summarize(values: &[f64]) -> Option<Value> {
        let sorted = stats::sorted(values);
        let q1 = stats::quantile_sorted(&sorted, 0.25)?;
        let median = stats::quantile_sorted(&sorted, 0.5)?;
        let q3 = stats::quantile_sorted(&sorted, 0.75)?;
        let (lo_fence, hi_fence) = (q1 - 1.5 * (q3 - q1), q3 + 1.5 * (q3 - q1));

        let inside = || sorted.iter().copied().filter(|v| (lo_fence..=hi_fence).contains(v));
        let lower_whisker = inside().next().unwrap_or(q1);
        let upper_whisker = inside().last().unwrap_or(q3);
        let outliers: Vec<Value> = sorted
            .iter()
            .copied()
            .filter(|v| !(lo_fence..=hi_fence).contains(v))
            .map(number)
            .collect();

        Some(json!({
            "count": sorted.len(),
            "mean": stats::mean(&sorted).map(number),
            "median": number(median),
            "q1": number(q1),
            "q3": number(q3),
            "min": sorted.first().copied().map(number),
            "max": sorted.last().copied().map(number),
            "lowerWhisker": number(lower_whisker),
            "upperWhisker": number(upper_whisker),
            "outliers": outliers,
        }))
    }
}

impl WidgetDescriptor for BoxPlotWidget {
    fn descriptor() -> WidgetDefinition {
        WidgetDefinition {
            kind: Self::KIND.to_string(),
            label: "Box Plot".to_string(),
            description: "Spread and outliers of numeric columns".to_string(),
            category: WidgetCategory::Visualization,
            inputs: vec![PortDefinition::required(Self::PORT_DATA, "Data")],
            outputs: vec![PortDefinition::optional(Self::PORT_PLOT, "Plot")],
        }
    }
}

inventory::submit!(dataflow_engine::DescriptorFn(BoxPlotWidget::descriptor));
inventory::submit!(dataflow_engine::ExecutorFn {
    kind: BoxPlotWidget::KIND,
    executor: crate::shared::<BoxPlotWidget>,
});

#[async_trait]
impl WidgetExecutor for BoxPlotWidget {
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
            return Err(WidgetError::failed("No numeric columns found"));
        }

        let mut statistics = Map::new();
        for column in &columns {
            let summary = Self::summarize(&table.numeric_column(column)).ok_or_else(|| {
                WidgetError::failed(format!("Column '{}' has no numeric values", column))
            })?;
            statistics.insert(column.clone(), summary);
        }
        let title = invocation
            .param("title")
            .and_then(Value::as_str)
            .unwrap_or("Box Plot");

        let mut outputs = PortValues::new();
        outputs.insert(
            Self::PORT_PLOT.to_string(),
            json!({
                "type": "box",
                "title": title,
                "columns": columns,
                "statistics": statistics,
            }),
        );
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::tests::{invocation, people};

    #[test]
    fn test_summary_flags_outliers() {
        let summary = BoxPlotWidget::summarize(&[1.0, 2.0, 3.0, 4.0, 100.0]).unwrap();
        assert_eq!(summary["median"], 3.0);
        assert_eq!(summary["q1"], 2.0);
        assert_eq!(summary["q3"], 4.0);
        assert_eq!(summary["lowerWhisker"], 1.0);
        assert_eq!(summary["upperWhisker"], 4.0);
        assert_eq!(summary["outliers"], json!([100.0]));
        assert_eq!(summary["max"], 100.0);
        assert!(BoxPlotWidget::summarize(&[]).is_none());
    }

    #[tokio::test]
    async fn test_plot_defaults_to_numeric_columns() {
        let out = BoxPlotWidget
            .execute(invocation("box_plot", people(), json!({})))
            .await
            .unwrap();
        let plot = &out["plot"];
        assert_eq!(plot["type"], "box");
        assert_eq!(plot["title"], "Box Plot");
        assert_eq!(plot["columns"], json!(["age", "score"]));
        assert_eq!(plot["statistics"]["score"]["count"], 3);
        assert_eq!(plot["statistics"]["age"]["median"], 36.0);
    }

    #[tokio::test]
    async fn test_non_numeric_column_fails() {
        let err = BoxPlotWidget
            .execute(invocation("box_plot", people(), json!({"columns": ["name"]})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no numeric values"));
    }
}
