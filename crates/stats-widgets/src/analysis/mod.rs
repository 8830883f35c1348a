//! Analysis widgets
//!
//! Widgets that compute statistics, run tests or fit models over numeric
//! columns.

mod anova;
mod clustering;
mod correlation;
mod descriptive_stats;
mod hypothesis_testing;
mod linear_regression;

pub use anova::{one_way_anova, AnovaWidget, OneWayAnova};
pub use clustering::{kmeans, silhouette, ClusteringWidget, KMeans};
pub use correlation::{CorrelationMethod, CorrelationWidget};
pub use descriptive_stats::DescriptiveStatsWidget;
pub use hypothesis_testing::{
    mann_whitney, one_sample_t, two_sample_t, HypothesisTestingWidget, TestOutcome, TestType,
};
pub use linear_regression::{fit as fit_ols, LinearRegressionWidget, OlsFit};
