//! Visualization widgets
//!
//! These produce chart specifications as JSON; rendering is left to the
//! frontend.

mod box_plot;
mod heatmap;
mod histogram;
mod line_chart;
mod scatter_plot;

pub use box_plot::BoxPlotWidget;
pub use heatmap::HeatmapWidget;
pub use histogram::HistogramWidget;
pub use line_chart::LineChartWidget;
pub use scatter_plot::ScatterPlotWidget;
