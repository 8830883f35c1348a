//! Line Chart Widget

use async_trait::async_trait;
use dataflow_engine::{
    PortDefinition, PortValues, WidgetCategory, WidgetDefinition, WidgetDescriptor, WidgetError,
    WidgetExecutor, WidgetInvocation,
};
use serde_json::{json, Value};

use crate::table::{column_name, number, Table};

/// Line Chart Widget
///
/// Points sorted by x; rows missing either value are left out and ties in x
/// keep their row order.
///
/// # Inputs
/// - `data` (required) - source table
///
/// # Params
/// - `xColumn` (required)
/// - `yColumn` (required)
/// - `title` - chart title (default `<y> over <x>`)
///
/// # Outputs
/// - `plot` - `{type: "line", title, xLabel, yLabel, points: [{x, y}]}`
#[derive(Debug, Clone, Copy, Default)]
pub struct LineChartWidget;

impl LineChartWidget {
    pub const KIND: &'static str = "line_chart";
    /// Port ID for data input
    pub const PORT_DATA: &'static str = "data";
    /// Port ID for plot output
    pub const PORT_PLOT: &'static str = "plot";
}

impl WidgetDescriptor for LineChartWidget {
    fn descriptor() -> WidgetDefinition {
        WidgetDefinition {
            kind: Self::KIND.to_string(),
            label: "Line Chart".to_string(),
            description: "One numeric column plotted over another".to_string(),
            category: WidgetCategory::Visualization,
            inputs: vec![PortDefinition::required(Self::PORT_DATA, "Data")],
            outputs: vec![PortDefinition::optional(Self::PORT_PLOT, "Plot")],
        }
    }
}

inventory::submit!(dataflow_engine::DescriptorFn(LineChartWidget::descriptor));
inventory::submit!(dataflow_engine::ExecutorFn {
    kind: LineChartWidget::KIND,
    executor: crate::shared::<LineChartWidget>,
});

#[async_trait]
impl WidgetExecutor for LineChartWidget {
    async fn execute(&self, invocation: WidgetInvocation) -> Result<PortValues, WidgetError> {
        let table = Table::from_input(&invocation, Self::PORT_DATA)?;
        let x = column_name(&invocation, "xColumn")?;
        let y = column_name(&invocation, "yColumn")?;
        table.require_columns([&x, &y])?;

        let mut pairs = table.complete_numeric_rows(&[x.clone(), y.clone()]);
        if pairs.is_empty() {
            return Err(WidgetError::failed(format!(
                "No rows with numeric '{}' and '{}'",
                x, y
            )));
        }
        pairs.sort_by(|a, b| a[0].total_cmp(&b[0]));
        let points: Vec<Value> = pairs
            .into_iter()
            .map(|pair| json!({"x": number(pair[0]), "y": number(pair[1])}))
            .collect();
        let title = match invocation.param("title").and_then(Value::as_str) {
            Some(title) => title.to_string(),
            None => format!("{} over {}", y, x),
        };

        let mut outputs = PortValues::new();
        outputs.insert(
            Self::PORT_PLOT.to_string(),
            json!({
                "type": "line",
                "title": title,
                "xLabel": x,
                "yLabel": y,
                "points": points,
            }),
        );
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::tests::{invocation, people};

    #[tokio::test]
    async fn test_points_sorted_by_x() {
        let data = json!([
            {"t": 3, "v": 30},
            {"t": 1, "v": 10},
            {"t": null, "v": 0},
            {"t": 2, "v": 20},
            {"t": 1, "v": 11}
        ]);
        let out = LineChartWidget
            .execute(invocation("line_chart", data, json!({"xColumn": "t", "yColumn": "v"})))
            .await
            .unwrap();
        let plot = &out["plot"];
        assert_eq!(plot["type"], "line");
        assert_eq!(plot["title"], "v over t");
        let xs: Vec<f64> = plot["points"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["x"].as_f64().unwrap())
            .collect();
        assert_eq!(xs, vec![1.0, 1.0, 2.0, 3.0]);
        assert_eq!(plot["points"][1]["y"], 11.0);
    }

    #[tokio::test]
    async fn test_requires_both_columns() {
        let err = LineChartWidget
            .execute(invocation("line_chart", people(), json!({"xColumn": "age"})))
            .await
            .unwrap_err();
        assert!(matches!(err, WidgetError::InvalidInput { .. }));
    }
}
