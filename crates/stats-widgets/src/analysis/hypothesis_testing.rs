//! Hypothesis Testing Widget

use std::str::FromStr;

use async_trait::async_trait;
use dataflow_engine::{
    PortDefinition, PortValues, WidgetCategory, WidgetDefinition, WidgetDescriptor, WidgetError,
    WidgetExecutor, WidgetInvocation,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::stats;
use crate::table::{column_list, number, Table};

const SIGNIFICANCE: f64 = 0.05;

/// Test family
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestType {
    /// One-sample t against `popmean`, or pooled two-sample t
    #[default]
    Ttest,
    /// Two-sample Mann-Whitney U, normal approximation
    Mannwhitney,
}

impl FromStr for TestType {
    type Err = WidgetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ttest" => Ok(Self::Ttest),
            "mannwhitney" => Ok(Self::Mannwhitney),
            _ => Err(WidgetError::invalid("testType", "ttest or mannwhitney")),
        }
    }
}

/// Outcome of one test
#[derive(Debug, Clone, PartialEq)]
pub struct TestOutcome {
    pub name: &'static str,
    pub statistic: f64,
    pub p_value: f64,
    pub df: Option<f64>,
}

/// One-sample t test of `values` against `popmean`
pub fn one_sample_t(values: &[f64], popmean: f64) -> Result<TestOutcome, WidgetError> {
    let n = values.len();
    let (mean, sd) = match (stats::mean(values), stats::std_dev(values)) {
        (Some(mean), Some(sd)) if sd > 0.0 => (mean, sd),
        _ => {
            return Err(WidgetError::failed(
                "t test needs at least two values with non-zero spread",
            ))
        }
    };
    let df = (n - 1) as f64;
    let t = (mean - popmean) / (sd / (n as f64).sqrt());
    Ok(TestOutcome {
        name: "one_sample_t",
        statistic: t,
        p_value: stats::student_t_p_value(t, df),
        df: Some(df),
    })
}

/// Two-sample t test assuming equal variances
pub fn two_sample_t(a: &[f64], b: &[f64]) -> Result<TestOutcome, WidgetError> {
    let (n1, n2) = (a.len() as f64, b.len() as f64);
    let spreads = stats::std_dev(a).zip(stats::std_dev(b));
    let means = stats::mean(a).zip(stats::mean(b));
    let (Some((s1, s2)), Some((m1, m2))) = (spreads, means) else {
        return Err(WidgetError::failed("t test needs at least two values per sample"));
    };
    let df = n1 + n2 - 2.0;
    let pooled = ((n1 - 1.0) * s1 * s1 + (n2 - 1.0) * s2 * s2) / df;
    if pooled == 0.0 {
        return Err(WidgetError::failed("t test needs samples with non-zero spread"));
    }
    let t = (m1 - m2) / (pooled * (1.0 / n1 + 1.0 / n2)).sqrt();
    Ok(TestOutcome {
        name: "two_sample_t",
        statistic: t,
        p_value: stats::student_t_p_value(t, df),
        df: Some(df),
    })
}

/// Mann-Whitney U of the first sample, two-sided with continuity and tie
/// corrections
pub fn mann_whitney(a: &[f64], b: &[f64]) -> Result<TestOutcome, WidgetError> {
    if a.is_empty() || b.is_empty() {
        return Err(WidgetError::failed("Mann-Whitney test needs two non-empty samples"));
    }
    let (n1, n2) = (a.len() as f64, b.len() as f64);
    let pooled: Vec<f64> = a.iter().chain(b).copied().collect();
    let ranks = stats::ranks(&pooled);
    let rank_sum: f64 = ranks[..a.len()].iter().sum();
    let u = rank_sum - n1 * (n1 + 1.0) / 2.0;

    let n = n1 + n2;
    let sorted = stats::sorted(&pooled);
    let ties: f64 = sorted
        .chunk_by(|x, y| x == y)
        .map(|run| {
            let t = run.len() as f64;
            t * t * t - t
        })
        .sum();
    let sigma = (n1 * n2 / 12.0 * ((n + 1.0) - ties / (n * (n - 1.0)))).sqrt();
    if sigma == 0.0 || !sigma.is_finite() {
        return Err(WidgetError::failed("Mann-Whitney test needs non-identical values"));
    }
    let mu = n1 * n2 / 2.0;
    let z = ((u - mu).abs() - 0.5).max(0.0) / sigma;
    Ok(TestOutcome {
        name: "mann_whitney_u",
        statistic: u,
        p_value: stats::normal_p_value(z),
        df: None,
    })
}

/// Hypothesis Testing Widget
///
/// # Inputs
/// - `data` (required) - table holding the samples
///
/// # Params
/// - `testType` - `ttest` (default) or `mannwhitney`
/// - `columns` (required) - one column (one-sample t) or two columns
/// - `popmean` - hypothesized mean for the one-sample t test (default 0)
///
/// # Outputs
/// - `test_results` - `{testType, test, columns, statistic, pValue, df, conclusion}`
///   judged at the 0.05 level
#[derive(Debug, Clone, Copy, Default)]
pub struct HypothesisTestingWidget;

impl HypothesisTestingWidget {
    pub const KIND: &'static str = "hypothesis_testing";
    /// Port ID for data input
    pub const PORT_DATA: &'static str = "data";
    /// Port ID for test results output
    pub const PORT_RESULTS: &'static str = "test_results";
}

impl WidgetDescriptor for HypothesisTestingWidget {
    fn descriptor() -> WidgetDefinition {
        WidgetDefinition {
            kind: Self::KIND.to_string(),
            label: "Hypothesis Testing".to_string(),
            description: "Performs statistical hypothesis tests".to_string(),
            category: WidgetCategory::Analysis,
            inputs: vec![PortDefinition::required(Self::PORT_DATA, "Data")],
            outputs: vec![PortDefinition::optional(Self::PORT_RESULTS, "Test Results")],
        }
    }
}

inventory::submit!(dataflow_engine::DescriptorFn(HypothesisTestingWidget::descriptor));
inventory::submit!(dataflow_engine::ExecutorFn {
    kind: HypothesisTestingWidget::KIND,
    executor: crate::shared::<HypothesisTestingWidget>,
});

#[async_trait]
impl WidgetExecutor for HypothesisTestingWidget {
    async fn execute(&self, invocation: WidgetInvocation) -> Result<PortValues, WidgetError> {
        let table = Table::from_input(&invocation, Self::PORT_DATA)?;
        let test_type = match invocation.param("testType").and_then(Value::as_str) {
            Some(name) => name.parse()?,
            None => TestType::default(),
        };
        let columns = column_list(&invocation, "columns")?
            .filter(|c| !c.is_empty() && c.len() <= 2)
            .ok_or_else(|| WidgetError::invalid("columns", "one or two column names"))?;
        table.require_columns(&columns)?;

        let samples: Vec<Vec<f64>> = columns.iter().map(|c| table.numeric_column(c)).collect();
        let outcome = match (test_type, samples.as_slice()) {
            (TestType::Ttest, [only]) => {
                let popmean = match invocation.param("popmean") {
                    None => 0.0,
                    Some(value) => value
                        .as_f64()
                        .ok_or_else(|| WidgetError::invalid("popmean", "a number"))?,
                };
                one_sample_t(only, popmean)?
            }
            (TestType::Ttest, [a, b]) => two_sample_t(a, b)?,
            (TestType::Mannwhitney, [a, b]) => mann_whitney(a, b)?,
            (TestType::Mannwhitney, _) => {
                return Err(WidgetError::invalid("columns", "two column names"))
            }
            _ => return Err(WidgetError::invalid("columns", "one or two column names")),
        };

        let significant = outcome.p_value < SIGNIFICANCE;
        let conclusion = match (columns.len(), significant) {
            (1, true) => "Significant",
            (1, false) => "Not Significant",
            (_, true) => "Significant difference",
            (_, false) => "No significant difference",
        };
        log::debug!(
            "HypothesisTestingWidget {}: {} statistic {:.4}, p = {:.4}",
            invocation.node_id,
            outcome.name,
            outcome.statistic,
            outcome.p_value
        );

        let mut outputs = PortValues::new();
        outputs.insert(
            Self::PORT_RESULTS.to_string(),
            json!({
                "testType": test_type,
                "test": outcome.name,
                "columns": columns,
                "statistic": number(outcome.statistic),
                "pValue": number(outcome.p_value),
                "df": outcome.df.map(number),
                "conclusion": conclusion,
            }),
        );
        Ok(outputs)
    }
}
