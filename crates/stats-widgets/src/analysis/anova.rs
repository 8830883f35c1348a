//! ANOVA Widget

use async_trait::async_trait;
use dataflow_engine::{
    PortDefinition, PortValues, WidgetCategory, WidgetDefinition, WidgetDescriptor, WidgetError,
    WidgetExecutor, WidgetInvocation,
};
use serde_json::{json, Value};

use crate::stats;
use crate::table::{as_number, column_name, number, Table};

/// One-way analysis of variance
#[derive(Debug, Clone, PartialEq)]
pub struct OneWayAnova {
    pub f_statistic: f64,
    pub p_value: f64,
    pub df_between: f64,
    pub df_within: f64,
    pub ss_between: f64,
    pub ss_within: f64,
}

impl OneWayAnova {
    pub fn ms_between(&self) -> f64 {
        self.ss_between / self.df_between
    }

    pub fn ms_within(&self) -> f64 {
        self.ss_within / self.df_within
    }
}

/// Split `groups` variance into between- and within-group parts
pub fn one_way_anova(groups: &[Vec<f64>]) -> Result<OneWayAnova, WidgetError> {
    if groups.len() < 2 || groups.iter().any(Vec::is_empty) {
        return Err(WidgetError::failed("ANOVA needs at least two non-empty groups"));
    }
    let all: Vec<f64> = groups.iter().flatten().copied().collect();
    let df_between = (groups.len() - 1) as f64;
    let df_within = (all.len() - groups.len()) as f64;
    if df_within == 0.0 {
        return Err(WidgetError::failed("ANOVA needs more observations than groups"));
    }

    let grand_mean = stats::mean(&all).unwrap_or_default();
    let (mut ss_between, mut ss_within) = (0.0, 0.0);
    for group in groups {
        let m = stats::mean(group).unwrap_or_default();
        ss_between += group.len() as f64 * (m - grand_mean).powi(2);
        ss_within += group.iter().map(|x| (x - m).powi(2)).sum::<f64>();
    }
    if ss_within == 0.0 {
        return Err(WidgetError::failed("ANOVA needs variation within groups"));
    }

    let f_statistic = (ss_between / df_between) / (ss_within / df_within);
    Ok(OneWayAnova {
        f_statistic,
        p_value: stats::f_p_value(f_statistic, df_between, df_within),
        df_between,
        df_within,
        ss_between,
        ss_within,
    })
}

fn group_label(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// ANOVA Widget
///
/// Groups rows by `groupColumn` in first-seen order; rows with a missing
/// group or a non-numeric value are skipped.
///
/// # Inputs
/// - `data` (required) - table to analyze
///
/// # Params
/// - `groupColumn` (required)
/// - `valueColumn` (required)
///
/// # Outputs
/// - `anova_results` - `{fStatistic, pValue, dfBetween, dfWithin, ssBetween,
///   ssWithin, msBetween, msWithin, groups: [{group, count, mean}]}`
#[derive(Debug, Clone, Copy, Default)]
pub struct AnovaWidget;

impl AnovaWidget {
    pub const KIND: &'static str = "anova";
    /// Port ID for data input
    pub const PORT_DATA: &'static str = "data";
    /// Port ID for ANOVA results output
    pub const PORT_RESULTS: &'static str = "anova_results";
}

impl WidgetDescriptor for AnovaWidget {
    fn descriptor() -> WidgetDefinition {
        WidgetDefinition {
            kind: Self::KIND.to_string(),
            label: "ANOVA".to_string(),
            description: "Analysis of variance across groups".to_string(),
            category: WidgetCategory::Analysis,
            inputs: vec![PortDefinition::required(Self::PORT_DATA, "Data")],
            outputs: vec![PortDefinition::optional(Self::PORT_RESULTS, "ANOVA Results")],
        }
    }
}

inventory::submit!(dataflow_engine::DescriptorFn(AnovaWidget::descriptor));
inventory::submit!(dataflow_engine::ExecutorFn {
    kind: AnovaWidget::KIND,
    executor: crate::shared::<AnovaWidget>,
});

#[async_trait]
impl WidgetExecutor for AnovaWidget {
    async fn execute(&self, invocation: WidgetInvocation) -> Result<PortValues, WidgetError> {
        let table = Table::from_input(&invocation, Self::PORT_DATA)?;
        let group_column = column_name(&invocation, "groupColumn")?;
        let value_column = column_name(&invocation, "valueColumn")?;
        table.require_columns([&group_column, &value_column])?;

        let mut labels: Vec<String> = Vec::new();
        let mut groups: Vec<Vec<f64>> = Vec::new();
        for row in table.rows() {
            let label = row.get(&group_column).and_then(group_label);
            let value = row.get(&value_column).and_then(as_number);
            let (Some(label), Some(value)) = (label, value) else {
                continue;
            };
            match labels.iter().position(|l| *l == label) {
                Some(i) => groups[i].push(value),
                None => {
                    labels.push(label);
                    groups.push(vec![value]);
                }
            }
        }

        let anova = one_way_anova(&groups)?;
        let summary: Vec<Value> = labels
            .iter()
            .zip(&groups)
            .map(|(label, values)| {
                json!({
                    "group": label,
                    "count": values.len(),
                    "mean": stats::mean(values).map(number),
                })
            })
            .collect();

        let mut outputs = PortValues::new();
        outputs.insert(
            Self::PORT_RESULTS.to_string(),
            json!({
                "fStatistic": number(anova.f_statistic),
                "pValue": number(anova.p_value),
                "dfBetween": anova.df_between,
                "dfWithin": anova.df_within,
                "ssBetween": number(anova.ss_between),
                "ssWithin": number(anova.ss_within),
                "msBetween": number(anova.ms_between()),
                "msWithin": number(anova.ms_within()),
                "groups": summary,
            }),
        );
        Ok(outputs)
    }
}
