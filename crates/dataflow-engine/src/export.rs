//! Report export
//!
//! Turns an [`ExecutionReport`] into bytes for download: the full report as
//! JSON, or a flat CSV with one row per output port.

use std::str::FromStr;

use csv::WriterBuilder;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{FlowError, Result};
use crate::report::{ExecutionReport, NodeResult};
use crate::types::NodeStatus;

/// Column order of the CSV export
pub const CSV_HEADER: [&str; 7] = [
    "node_id",
    "widget_kind",
    "status",
    "success",
    "error",
    "output_port",
    "output_data",
];

/// Output format of [`export_report`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Json,
    Csv,
}

impl FromStr for ReportFormat {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => Err(FlowError::Config(format!("Unknown report format: {}", other))),
        }
    }
}

/// Serialize `report` in the requested format
pub fn export_report(report: &ExecutionReport, format: ReportFormat) -> Result<Vec<u8>> {
    match format {
        ReportFormat::Json => Ok(serde_json::to_vec_pretty(report)?),
        ReportFormat::Csv => export_csv(report),
    }
}

fn export_csv(report: &ExecutionReport) -> Result<Vec<u8>> {
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;

    let mut rows = 0;
    for node_id in report.execution_order() {
        let Some(result) = report.result(&node_id) else {
            continue;
        };
        let status = status_label(result.status);
        let success = result.success.to_string();
        let error = result.error.as_deref().unwrap_or("");

        match result.outputs.as_ref().filter(|outputs| !outputs.is_empty()) {
            Some(outputs) => {
                for (port, value) in outputs {
                    let data = cell(value)?;
                    writer.write_record([
                        node_id.as_str(),
                        result.widget_kind.as_str(),
                        status,
                        success.as_str(),
                        error,
                        port.as_str(),
                        data.as_str(),
                    ])?;
                    rows += 1;
                }
            }
            None => {
                writer.write_record(bare_row(&node_id, result, status, &success, error))?;
                rows += 1;
            }
        }
    }

    log::debug!(
        "Exported report {} as CSV: {} row(s)",
        report.execution_id,
        rows
    );
    writer.into_inner().map_err(|e| FlowError::Io(e.into_error()))
}

fn bare_row<'a>(
    node_id: &'a str,
    result: &'a NodeResult,
    status: &'a str,
    success: &'a str,
    error: &'a str,
) -> [&'a str; 7] {
    [
        node_id,
        result.widget_kind.as_str(),
        status,
        success,
        error,
        "",
        "",
    ]
}

fn status_label(status: NodeStatus) -> &'static str {
    match status {
        NodeStatus::Idle => "idle",
        NodeStatus::Running => "running",
        NodeStatus::Completed => "completed",
        NodeStatus::Error => "error",
        NodeStatus::Blocked => "blocked",
    }
}

/// Plain strings are written as-is; everything else as compact JSON
fn cell(value: &Value) -> Result<String> {
    Ok(match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => serde_json::to_string(other)?,
    })
}
