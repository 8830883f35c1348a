//! Data source widgets
//!
//! Widgets that bring tables into a workflow. They have no input ports.

mod csv_file;
mod dataset;
mod excel_file;
mod manual_data;

pub use csv_file::CsvFileWidget;
pub(crate) use csv_file::delimiter_param;
pub use dataset::DatasetWidget;
pub use excel_file::ExcelFileWidget;
pub use manual_data::ManualDataWidget;
