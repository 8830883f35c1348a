//! Dataset Widget
//!
//! Reads a table from the run's dataset context.

use async_trait::async_trait;
use dataflow_engine::{
    PortDefinition, PortValues, WidgetCategory, WidgetDefinition, WidgetDescriptor, WidgetError,
    WidgetExecutor, WidgetInvocation, DEFAULT_DATASET,
};

use crate::table::Table;

/// Dataset Widget
///
/// # Params
/// - `dataSetId` - id of the dataset in the run context (default: `"default"`)
///
/// # Outputs
/// - `data` - the dataset's rows
#[derive(Debug, Clone, Copy, Default)]
pub struct DatasetWidget;

impl DatasetWidget {
    pub const KIND: &'static str = "dataset";
    /// Port ID for data output
    pub const PORT_DATA: &'static str = "data";
}

impl WidgetDescriptor for DatasetWidget {
    fn descriptor() -> WidgetDefinition {
        WidgetDefinition {
            kind: Self::KIND.to_string(),
            label: "Dataset".to_string(),
            description: "Loads a dataset supplied with the run".to_string(),
            category: WidgetCategory::DataSource,
            inputs: vec![],
            outputs: vec![PortDefinition::optional(Self::PORT_DATA, "Data")],
        }
    }
}

inventory::submit!(dataflow_engine::DescriptorFn(DatasetWidget::descriptor));
inventory::submit!(dataflow_engine::ExecutorFn {
    kind: DatasetWidget::KIND,
    executor: crate::shared::<DatasetWidget>,
});

#[async_trait]
impl WidgetExecutor for DatasetWidget {
    async fn execute(&self, invocation: WidgetInvocation) -> Result<PortValues, WidgetError> {
        let id = invocation
            .param("dataSetId")
            .and_then(|v| v.as_str())
            .unwrap_or(DEFAULT_DATASET);
        let data = invocation
            .dataset
            .dataset(id)
            .ok_or_else(|| WidgetError::failed(format!("Dataset '{}' not found", id)))?;

        // Reject anything that is not a table before it reaches downstream widgets
        let table = Table::from_value(data, Self::PORT_DATA)?;
        log::debug!(
            "DatasetWidget {}: loaded '{}' with {} row(s)",
            invocation.node_id,
            id,
            table.row_count()
        );

        let mut outputs = PortValues::new();
        outputs.insert(Self::PORT_DATA.to_string(), table.into());
        Ok(outputs)
    }
}
