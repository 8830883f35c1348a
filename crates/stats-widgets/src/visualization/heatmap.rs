//! Heatmap Widget

use async_trait::async_trait;
use dataflow_engine::{
    PortDefinition, PortValues, WidgetCategory, WidgetDefinition, WidgetDescriptor, WidgetError,
    WidgetExecutor, WidgetInvocation,
};
use serde_json::{json, Value};

use crate::analysis::CorrelationMethod;
use crate::table::{column_list, number, Table};

/// Heatmap Widget
///
/// Correlation heatmap as a dense matrix; `matrix[i][j]` pairs
/// `columns[i]` with `columns[j]`.
///
/// # Inputs
/// - `data` (required) - source table
///
/// # Params
/// - `columns` - columns to include (default: every numeric column)
/// - `method` - `pearson` (default) or `spearman`
/// - `title` - chart title (default `Correlation Heatmap`)
///
/// # Outputs
/// - `plot` - `{type: "heatmap", title, method, columns, matrix}`; a cell is
///   null when either column is constant
#[derive(Debug, Clone, Copy, Default)]
pub struct HeatmapWidget;

impl HeatmapWidget {
    pub const KIND: &'static str = "heatmap";
    /// Port ID for data input
    pub const PORT_DATA: &'static str = "data";
    /// Port ID for plot output
    pub const PORT_PLOT: &'static str = "plot";
}

impl WidgetDescriptor for HeatmapWidget {
    fn descriptor() -> WidgetDefinition {
        WidgetDefinition {
            kind: Self::KIND.to_string(),
            label: "Heatmap".to_string(),
            description: "Correlation heatmap of numeric columns".to_string(),
            category: WidgetCategory::Visualization,
            inputs: vec![PortDefinition::required(Self::PORT_DATA, "Data")],
            outputs: vec![PortDefinition::optional(Self::PORT_PLOT, "Plot")],
        }
    }
}

inventory::submit!(dataflow_engine::DescriptorFn(HeatmapWidget::descriptor));
inventory::submit!(dataflow_engine::ExecutorFn {
    kind: HeatmapWidget::KIND,
    executor: crate::shared::<HeatmapWidget>,
});

#[async_trait]
impl WidgetExecutor for HeatmapWidget {
    async fn execute(&self, invocation: WidgetInvocation) -> Result<PortValues, WidgetError> {
        let table = Table::from_input(&invocation, Self::PORT_DATA)?;
        let method = match invocation.param("method").and_then(Value::as_str) {
            Some(name) => name.parse()?,
            None => CorrelationMethod::default(),
        };
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

        let mut matrix: Vec<Vec<Value>> = Vec::with_capacity(columns.len());
        for a in &columns {
            invocation.check_cancelled()?;
            let row = columns
                .iter()
                .map(|b| {
                    let pairs = table.complete_numeric_rows(&[a.clone(), b.clone()]);
                    let xs: Vec<f64> = pairs.iter().map(|p| p[0]).collect();
                    let ys: Vec<f64> = pairs.iter().map(|p| p[1]).collect();
                    method.coefficient(&xs, &ys).map_or(Value::Null, number)
                })
                .collect();
            matrix.push(row);
        }
        let title = invocation
            .param("title")
            .and_then(Value::as_str)
            .unwrap_or("Correlation Heatmap");

        let mut outputs = PortValues::new();
        outputs.insert(
            Self::PORT_PLOT.to_string(),
            json!({
                "type": "heatmap",
                "title": title,
                "method": method,
                "columns": columns,
                "matrix": matrix,
            }),
        );
        Ok(outputs)
    }
}
