//! Preprocessing widgets
//!
//! Widgets that inspect, clean, or reshape tables.

mod data_info;
mod handle_missing;
mod remove_duplicates;
mod select_columns;

pub use data_info::DataInfoWidget;
pub use handle_missing::{HandleMissingWidget, MissingMethod};
pub use remove_duplicates::RemoveDuplicatesWidget;
pub use select_columns::SelectColumnsWidget;
