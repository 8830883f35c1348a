//! Histogram Widget

use async_trait::async_trait;
use dataflow_engine::{
    PortDefinition, PortValues, WidgetCategory, WidgetDefinition, WidgetDescriptor, WidgetError,
    WidgetExecutor, WidgetInvocation,
};
use serde_json::{json, Value};

use crate::table::{column_name, number, Table};

const DEFAULT_BINS: u64 = 10;
const MAX_BINS: u64 = 10_000;

/// Histogram Widget
///
/// Splits the numeric values of one column into equal-width bins.
///
/// # Inputs
/// - `data` (required) - source table
///
/// # Params
/// - `column` (required) - column to plot
/// - `bins` - number of bins (default 10, at most 10000)
///
/// # Outputs
/// - `plot` - `{type: "histogram", title, column, bins, frequencies}` where
///   `bins` holds the `n + 1` bin edges
#[derive(Debug, Clone, Copy, Default)]
pub struct HistogramWidget;

impl HistogramWidget {
    pub const KIND: &'static str = "histogram";
    /// Port ID for data input
    pub const PORT_DATA: &'static str = "data";
    /// Port ID for plot output
    pub const PORT_PLOT: &'static str = "plot";

    /// Bin edges and per-bin counts; the last bin is closed on the right
    pub fn bin(values: &[f64], bins: usize) -> (Vec<f64>, Vec<u64>) {
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        // A constant column gets a unit-wide range centered on its value
        let (lo, hi) = if min < max { (min, max) } else { (min - 0.5, max + 0.5) };
        let width = (hi - lo) / bins as f64;

        let edges = (0..=bins).map(|i| lo + width * i as f64).collect();
        let mut counts = vec![0; bins];
        for v in values {
            let idx = (((v - lo) / width).floor() as usize).min(bins - 1);
            counts[idx] += 1;
        }
        (edges, counts)
    }
}

impl WidgetDescriptor for HistogramWidget {
    fn descriptor() -> WidgetDefinition {
        WidgetDefinition {
            kind: Self::KIND.to_string(),
            label: "Histogram".to_string(),
            description: "Distribution of a numeric column".to_string(),
            category: WidgetCategory::Visualization,
            inputs: vec![PortDefinition::required(Self::PORT_DATA, "Data")],
            outputs: vec![PortDefinition::optional(Self::PORT_PLOT, "Plot")],
        }
    }
}

inventory::submit!(dataflow_engine::DescriptorFn(HistogramWidget::descriptor));
inventory::submit!(dataflow_engine::ExecutorFn {
    kind: HistogramWidget::KIND,
    executor: crate::shared::<HistogramWidget>,
});

#[async_trait]
impl WidgetExecutor for HistogramWidget {
    async fn execute(&self, invocation: WidgetInvocation) -> Result<PortValues, WidgetError> {
        let table = Table::from_input(&invocation, Self::PORT_DATA)?;
        let column = column_name(&invocation, "column")?;
        table.require_columns([&column])?;

        let bins = match invocation.param("bins") {
            None => DEFAULT_BINS,
            Some(value) => value
                .as_u64()
                .filter(|n| (1..=MAX_BINS).contains(n))
                .ok_or_else(|| WidgetError::invalid("bins", "a positive integer up to 10000"))?,
        };
        let bins = usize::try_from(bins)
            .map_err(|_| WidgetError::invalid("bins", "a positive integer up to 10000"))?;

        let values = table.numeric_column(&column);
        if values.is_empty() {
            return Err(WidgetError::failed(format!(
                "Column '{}' has no numeric values",
                column
            )));
        }
        let (edges, counts) = Self::bin(&values, bins);

        let mut outputs = PortValues::new();
        outputs.insert(
            Self::PORT_PLOT.to_string(),
            json!({
                "type": "histogram",
                "title": format!("Distribution of {}", column),
                "column": column,
                "bins": edges.into_iter().map(number).collect::<Vec<Value>>(),
                "frequencies": counts,
            }),
        );
        Ok(outputs)
    }
}
