//! Scatter Plot Widget

use async_trait::async_trait;
use dataflow_engine::{
    PortDefinition, PortValues, WidgetCategory, WidgetDefinition, WidgetDescriptor, WidgetError,
    WidgetExecutor, WidgetInvocation,
};
use serde_json::json;

use crate::table::{column_name, number, Table};

/// Scatter Plot Widget
///
/// Pairs two numeric columns; rows missing either value are left out.
///
/// # Inputs
/// - `data` (required) - source table
///
/// # Params
/// - `xColumn` (required)
/// - `yColumn` (required)
///
/// # Outputs
/// - `plot` - `{type: "scatter", title, xLabel, yLabel, points: [{x, y}]}`
#[derive(Debug, Clone, Copy, Default)]
pub struct ScatterPlotWidget;

impl ScatterPlotWidget {
    pub const KIND: &'static str = "scatter_plot";
    /// Port ID for data input
    pub const PORT_DATA: &'static str = "data";
    /// Port ID for plot output
    pub const PORT_PLOT: &'static str = "plot";
}

impl WidgetDescriptor for ScatterPlotWidget {
    fn descriptor() -> WidgetDefinition {
        WidgetDefinition {
            kind: Self::KIND.to_string(),
            label: "Scatter Plot".to_string(),
            description: "Relationship between two numeric columns".to_string(),
            category: WidgetCategory::Visualization,
            inputs: vec![PortDefinition::required(Self::PORT_DATA, "Data")],
            outputs: vec![PortDefinition::optional(Self::PORT_PLOT, "Plot")],
        }
    }
}

inventory::submit!(dataflow_engine::DescriptorFn(ScatterPlotWidget::descriptor));
inventory::submit!(dataflow_engine::ExecutorFn {
    kind: ScatterPlotWidget::KIND,
    executor: crate::shared::<ScatterPlotWidget>,
});

#[async_trait]
impl WidgetExecutor for ScatterPlotWidget {
    async fn execute(&self, invocation: WidgetInvocation) -> Result<PortValues, WidgetError> {
        let table = Table::from_input(&invocation, Self::PORT_DATA)?;
        let x = column_name(&invocation, "xColumn")?;
        let y = column_name(&invocation, "yColumn")?;
        table.require_columns([&x, &y])?;

        let points: Vec<_> = table
            .complete_numeric_rows(&[x.clone(), y.clone()])
            .into_iter()
            .map(|pair| json!({"x": number(pair[0]), "y": number(pair[1])}))
            .collect();
        if points.is_empty() {
            return Err(WidgetError::failed(format!(
                "No rows with numeric '{}' and '{}'",
                x, y
            )));
        }

        let mut outputs = PortValues::new();
        outputs.insert(
            Self::PORT_PLOT.to_string(),
            json!({
                "type": "scatter",
                "title": format!("{} vs {}", y, x),
                "xLabel": x,
                "yLabel": y,
                "points": points,
            }),
        );
        Ok(outputs)
    }
}
