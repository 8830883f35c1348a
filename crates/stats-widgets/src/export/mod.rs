//! Export widgets

mod export_csv;
mod export_excel;

pub use export_csv::ExportCsvWidget;
pub use export_excel::ExportExcelWidget;
