//! Statistical Widgets
//!
//! Built-in widget implementations for the dataflow engine. Each widget is
//! an atomic building block operating on row-oriented JSON tables (see
//! [`table`]); widgets register themselves at link time, so
//! [`builtin_registry`] picks up every widget in this crate.
//!
//! # Categories
//!
//! - **Data source**: Datasets from the run context, manual rows, CSV and Excel files
//! - **Preprocessing**: Column selection, de-duplication, missing values, data info
//! - **Analysis**: Descriptive statistics, correlation, linear regression,
//!   hypothesis tests, ANOVA, k-means clustering
//! - **Visualization**: Chart specifications (histogram, scatter plot, box plot,
//!   heatmap, line chart)
//! - **Export**: CSV and Excel file export

use std::sync::Arc;

use dataflow_engine::{WidgetExecutor, WidgetRegistry};

pub mod analysis;
pub mod export;
pub mod preprocessing;
pub mod source;
pub mod stats;
pub mod table;
pub mod visualization;
pub mod xlsx;

pub use analysis::*;
pub use export::*;
pub use preprocessing::*;
pub use source::*;
pub use visualization::*;

/// Registry holding every built-in widget with its executor
pub fn builtin_registry() -> WidgetRegistry {
    WidgetRegistry::with_builtins()
}

/// Shared executor instance for link-time registration
pub(crate) fn shared<W>() -> Arc<dyn WidgetExecutor>
where
    W: WidgetExecutor + Default + 'static,
{
    Arc::new(W::default())
}
