//! Utilization metrics for the activity test
//!
//! This module provides:
//! - The lookback window and metric query shapes
//! - Mean and standard deviation per series, with missing samples as infinity
//! - The inactivity test over CPU and network-out variance

mod stats;
mod window;

pub use stats::{mean, sample_stdev, MetricsAggregate, SeriesSummary};
pub use window::{
    samples_for, Aggregation, MetricSeries, TimeRange, INGESTION_LAG_MINUTES, NETWORK_OUT,
    PERCENTAGE_CPU,
};
