//! Widget descriptor trait and link-time registration
//!
//! Widgets describe themselves through [`WidgetDescriptor`], so the widget
//! implementation is the single source of truth for both its behavior and
//! its catalog entry. Built-in widgets submit their descriptor and executor
//! via `inventory`; [`WidgetRegistry::with_builtins`](crate::WidgetRegistry::with_builtins)
//! collects them:
//!
//! ```ignore
//! inventory::submit!(dataflow_engine::DescriptorFn(Histogram::descriptor));
//! inventory::submit!(dataflow_engine::ExecutorFn {
//!     kind: "histogram",
//!     executor: || std::sync::Arc::new(Histogram),
//! });
//! ```

use std::sync::Arc;

use crate::registry::WidgetExecutor;
use crate::types::WidgetDefinition;

/// Trait for widgets that can describe their catalog entry
pub trait WidgetDescriptor {
    /// Get the static definition for this widget kind
    fn descriptor() -> WidgetDefinition
    where
        Self: Sized;
}

/// Link-time registration of a widget definition
pub struct DescriptorFn(pub fn() -> WidgetDefinition);

inventory::collect!(DescriptorFn);

/// Link-time registration of a widget operation
pub struct ExecutorFn {
    /// Widget kind this executor handles
    pub kind: &'static str,
    /// Constructor for the shared executor instance
    pub executor: fn() -> Arc<dyn WidgetExecutor>,
}

inventory::collect!(ExecutorFn);

/// Iterate over every definition submitted at link time
pub fn builtin_definitions() -> impl Iterator<Item = WidgetDefinition> {
    inventory::iter::<DescriptorFn>.into_iter().map(|f| (f.0)())
}

/// Iterate over every executor submitted at link time
pub fn builtin_executors() -> impl Iterator<Item = (&'static str, Arc<dyn WidgetExecutor>)> {
    inventory::iter::<ExecutorFn>
        .into_iter()
        .map(|f| (f.kind, (f.executor)()))
}
