//! Linear Regression Widget

use async_trait::async_trait;
use dataflow_engine::{
    PortDefinition, PortValues, WidgetCategory, WidgetDefinition, WidgetDescriptor, WidgetError,
    WidgetExecutor, WidgetInvocation,
};
use serde_json::{json, Map, Value};

use crate::stats;
use crate::table::{column_list, column_name, number, Table};

/// Linear Regression Widget
///
/// Ordinary least squares fit of `targetColumn` on `featureColumns`, solved
/// through the normal equations. Rows missing any of the involved columns
/// are skipped.
///
/// # Inputs
/// - `data` (required) - training table
///
/// # Params
/// - `targetColumn` (required) - dependent variable
/// - `featureColumns` - regressors (default: every other numeric column)
///
/// # Outputs
/// - `model` - `{target, features, coefficients, intercept, rSquared,
///   adjustedRSquared, observations}`
/// - `predictions` - fitted value for each row used in the fit
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearRegressionWidget;

impl LinearRegressionWidget {
    pub const KIND: &'static str = "linear_regression";
    /// Port ID for data input
    pub const PORT_DATA: &'static str = "data";
    /// Port ID for model output
    pub const PORT_MODEL: &'static str = "model";
    /// Port ID for predictions output
    pub const PORT_PREDICTIONS: &'static str = "predictions";
}

impl WidgetDescriptor for LinearRegressionWidget {
    fn descriptor() -> WidgetDefinition {
        WidgetDefinition {
            kind: Self::KIND.to_string(),
            label: "Linear Regression".to_string(),
            description: "Fits an ordinary least squares model".to_string(),
            category: WidgetCategory::Analysis,
            inputs: vec![PortDefinition::required(Self::PORT_DATA, "Data")],
            outputs: vec![
                PortDefinition::optional(Self::PORT_MODEL, "Model"),
                PortDefinition::optional(Self::PORT_PREDICTIONS, "Predictions"),
            ],
        }
    }
}

inventory::submit!(dataflow_engine::DescriptorFn(LinearRegressionWidget::descriptor));
inventory::submit!(dataflow_engine::ExecutorFn {
    kind: LinearRegressionWidget::KIND,
    executor: crate::shared::<LinearRegressionWidget>,
});

/// Fitted OLS model
#[derive(Debug, Clone, PartialEq)]
pub struct OlsFit {
    pub intercept: f64,
    pub coefficients: Vec<f64>,
    pub r_squared: Option<f64>,
    pub adjusted_r_squared: Option<f64>,
    pub predictions: Vec<f64>,
}

/// Fit `y = b0 + b . x` over rows of `[x1, .., xk, y]`
pub fn fit(rows: &[Vec<f64>], features: usize) -> Result<OlsFit, WidgetError> {
    let n = rows.len();
    let k = features + 1;
    if n <= features {
        return Err(WidgetError::failed(format!(
            "Need more than {} complete rows to fit {} feature(s), found {}",
            features, features, n
        )));
    }

    // X'X and X'y with a leading intercept column
    let mut xtx = vec![vec![0.0; k]; k];
    let mut xty = vec![0.0; k];
    for row in rows {
        let y = row[features];
        let design: Vec<f64> = std::iter::once(1.0).chain(row[..features].iter().copied()).collect();
        for i in 0..k {
            xty[i] += design[i] * y;
            for j in 0..k {
                xtx[i][j] += design[i] * design[j];
            }
        }
    }

    let beta = stats::solve(xtx, xty).ok_or_else(|| {
        WidgetError::failed("Feature columns are collinear; the model cannot be fitted")
    })?;

    let predictions: Vec<f64> = rows
        .iter()
        .map(|row| beta[0] + row[..features].iter().zip(&beta[1..]).map(|(x, b)| x * b).sum::<f64>())
        .collect();

    let ys: Vec<f64> = rows.iter().map(|row| row[features]).collect();
    let y_mean = stats::mean(&ys).unwrap_or(0.0);
    let ss_tot: f64 = ys.iter().map(|y| (y - y_mean).powi(2)).sum();
    let ss_res: f64 = ys.iter().zip(&predictions).map(|(y, p)| (y - p).powi(2)).sum();

    let r_squared = (ss_tot > 0.0).then(|| 1.0 - ss_res / ss_tot);
    let dof = n as f64 - features as f64 - 1.0;
    let adjusted_r_squared = r_squared
        .filter(|_| dof > 0.0)
        .map(|r2| 1.0 - (1.0 - r2) * (n as f64 - 1.0) / dof);

    Ok(OlsFit {
        intercept: beta[0],
        coefficients: beta[1..].to_vec(),
        r_squared,
        adjusted_r_squared,
        predictions,
    })
}

#[async_trait]
impl WidgetExecutor for LinearRegressionWidget {
    async fn execute(&self, invocation: WidgetInvocation) -> Result<PortValues, WidgetError> {
        let table = Table::from_input(&invocation, Self::PORT_DATA)?;
        let target = column_name(&invocation, "targetColumn")?;
        if !table.has_column(&target) {
            return Err(WidgetError::failed(format!(
                "Target column '{}' not found",
                target
            )));
        }

        let features = match column_list(&invocation, "featureColumns")? {
            Some(columns) if !columns.is_empty() => {
                table.require_columns(&columns)?;
                columns
            }
            _ => table
                .numeric_columns()
                .into_iter()
                .filter(|c| *c != target)
                .collect(),
        };
        if features.is_empty() {
            return Err(WidgetError::failed("No feature columns to regress on"));
        }
        if features.contains(&target) {
            return Err(WidgetError::invalid(
                "featureColumns",
                "columns other than the target",
            ));
        }

        let mut involved = features.clone();
        involved.push(target.clone());
        let rows = table.complete_numeric_rows(&involved);
        invocation.check_cancelled()?;

        let fitted = fit(&rows, features.len())?;
        log::debug!(
            "LinearRegressionWidget {}: fitted {} on {} row(s), r2={:?}",
            invocation.node_id,
            target,
            rows.len(),
            fitted.r_squared
        );

        let coefficients: Map<String, Value> = features
            .iter()
            .cloned()
            .zip(fitted.coefficients.iter().map(|b| number(*b)))
            .collect();
        let opt = |v: Option<f64>| v.map_or(Value::Null, number);

        let mut outputs = PortValues::new();
        outputs.insert(
            Self::PORT_MODEL.to_string(),
            json!({
                "target": target,
                "features": features,
                "coefficients": coefficients,
                "intercept": number(fitted.intercept),
                "rSquared": opt(fitted.r_squared),
                "adjustedRSquared": opt(fitted.adjusted_r_squared),
                "observations": rows.len(),
            }),
        );
        outputs.insert(
            Self::PORT_PREDICTIONS.to_string(),
            Value::Array(fitted.predictions.into_iter().map(number).collect()),
        );
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::tests::invocation;

    fn close(a: &Value, b: f64) -> bool {
        (a.as_f64().unwrap() - b).abs() < 1e-9
    }

    #[tokio::test]
    async fn test_fits_exact_line() {
        let data = json!([
            {"x": 0, "y": 1},
            {"x": 1, "y": 3},
            {"x": 2, "y": 5},
            {"x": 3, "y": null},
            {"x": 4, "y": 9}
        ]);
        let out = LinearRegressionWidget
            .execute(invocation("linear_regression", data, json!({"targetColumn": "y"})))
            .await
            .unwrap();

        let model = &out["model"];
        assert!(close(&model["coefficients"]["x"], 2.0));
        assert!(close(&model["intercept"], 1.0));
        assert!(close(&model["rSquared"], 1.0));
        assert_eq!(model["observations"], 4);
        assert_eq!(out["predictions"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn test_fit_two_features() {
        // y = 1 + 2a - b
        let rows: Vec<Vec<f64>> = [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (2.0, 3.0), (3.0, 1.0)]
            .iter()
            .map(|&(a, b)| vec![a, b, 1.0 + 2.0 * a - b])
            .collect();
        let fitted = fit(&rows, 2).unwrap();
        assert!((fitted.intercept - 1.0).abs() < 1e-9);
        assert!((fitted.coefficients[0] - 2.0).abs() < 1e-9);
        assert!((fitted.coefficients[1] + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_collinear_and_short_inputs_fail() {
        let rows = vec![vec![1.0, 2.0, 3.0], vec![2.0, 4.0, 5.0], vec![3.0, 6.0, 7.0]];
        assert!(fit(&rows, 2).unwrap_err().to_string().contains("collinear"));
        assert!(fit(&[vec![1.0, 2.0]], 1).is_err());
    }

    #[tokio::test]
    async fn test_unknown_target_fails() {
        let err = LinearRegressionWidget
            .execute(invocation(
                "linear_regression",
                json!([{"x": 1}]),
                json!({"targetColumn": "y"}),
            ))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Target column 'y' not found"));
    }
}
