//! Build metrics

pub mod aggregator;

pub use aggregator::{BuildSummary, MetricsAggregator, MetricsReport};
