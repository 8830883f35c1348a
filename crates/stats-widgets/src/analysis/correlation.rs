//! Correlation Analysis Widget

use std::str::FromStr;

use async_trait::async_trait;
use dataflow_engine::{
    PortDefinition, PortValues, WidgetCategory, WidgetDefinition, WidgetDescriptor, WidgetError,
    WidgetExecutor, WidgetInvocation,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::stats;
use crate::table::{column_list, number, Table};

/// Correlation coefficient
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrelationMethod {
    #[default]
    Pearson,
    Spearman,
}

impl CorrelationMethod {
    pub(crate) fn coefficient(self, xs: &[f64], ys: &[f64]) -> Option<f64> {
        match self {
            Self::Pearson => stats::pearson(xs, ys),
            Self::Spearman => stats::spearman(xs, ys),
        }
    }
}

impl FromStr for CorrelationMethod {
    type Err = WidgetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pearson" => Ok(Self::Pearson),
            "spearman" => Ok(Self::Spearman),
            _ => Err(WidgetError::invalid("method", "pearson or spearman")),
        }
    }
}

/// Correlation Analysis Widget
///
/// Pairwise coefficients over rows where both columns are numeric.
///
/// # Inputs
/// - `data` (required) - table to analyze
///
/// # Params
/// - `method` - `pearson` (default) or `spearman`
/// - `columns` - columns to correlate (default: every numeric column)
///
/// # Outputs
/// - `correlation` - `{method, columns, matrix}` where `matrix[a][b]` is the
///   coefficient, or null when a column is constant
#[derive(Debug, Clone, Copy, Default)]
pub struct CorrelationWidget;

impl CorrelationWidget {
    pub const KIND: &'static str = "correlation_analysis";
    /// Port ID for data input
    pub const PORT_DATA: &'static str = "data";
    /// Port ID for correlation output
    pub const PORT_CORRELATION: &'static str = "correlation";
}

impl WidgetDescriptor for CorrelationWidget {
    fn descriptor() -> WidgetDefinition {
        WidgetDefinition {
            kind: Self::KIND.to_string(),
            label: "Correlation Analysis".to_string(),
            description: "Pairwise correlation matrix of numeric columns".to_string(),
            category: WidgetCategory::Analysis,
            inputs: vec![PortDefinition::required(Self::PORT_DATA, "Data")],
            outputs: vec![PortDefinition::optional(Self::PORT_CORRELATION, "Correlation")],
        }
    }
}

inventory::submit!(dataflow_engine::DescriptorFn(CorrelationWidget::descriptor));
inventory::submit!(dataflow_engine::ExecutorFn {
    kind: CorrelationWidget::KIND,
    executor: crate::shared::<CorrelationWidget>,
});

#[async_trait]
impl WidgetExecutor for CorrelationWidget {
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
        if columns.len() < 2 {
            return Err(WidgetError::failed(
                "Correlation needs at least two numeric columns",
            ));
        }

        let mut matrix = Map::new();
        for a in &columns {
            invocation.check_cancelled()?;
            let mut row = Map::new();
            for b in &columns {
                let pairs = table.complete_numeric_rows(&[a.clone(), b.clone()]);
                let xs: Vec<f64> = pairs.iter().map(|p| p[0]).collect();
                let ys: Vec<f64> = pairs.iter().map(|p| p[1]).collect();
                let r = method
                    .coefficient(&xs, &ys)
                    .map_or(Value::Null, number);
                row.insert(b.clone(), r);
            }
            matrix.insert(a.clone(), Value::Object(row));
        }

        let mut outputs = PortValues::new();
        outputs.insert(
            Self::PORT_CORRELATION.to_string(),
            json!({
                "method": method,
                "columns": columns,
                "matrix": matrix,
            }),
        );
        Ok(outputs)
    }
}
