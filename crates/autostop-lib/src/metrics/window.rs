//! Lookback window and metric query shapes

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Minutes subtracted from the tick to let metric ingestion catch up
pub const INGESTION_LAG_MINUTES: i64 = 3;

pub const PERCENTAGE_CPU: &str = "Percentage CPU";
pub const NETWORK_OUT: &str = "Network Out";

/// Upper bound on the lookback (one year); the metrics API retains far less
const MAX_LOOKBACK_MINUTES: u64 = 60 * 24 * 366;

/// Closed time range queried for metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Window of `minutes` ending [`INGESTION_LAG_MINUTES`] before `tick`
    pub fn lookback(tick: DateTime<Utc>, minutes: u64) -> Self {
        let end = tick - Duration::minutes(INGESTION_LAG_MINUTES);
        let minutes = minutes.min(MAX_LOOKBACK_MINUTES) as i64;
        Self {
            start: end - Duration::minutes(minutes),
            end,
        }
    }

    /// ISO-8601 interval form, `start/end`
    pub fn to_timespan(&self) -> String {
        format!(
            "{}/{}",
            self.start.format("%Y-%m-%dT%H:%M:%SZ"),
            self.end.format("%Y-%m-%dT%H:%M:%SZ")
        )
    }
}

/// Aggregation applied per sampling interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    Total,
}

impl Aggregation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregation::Total => "Total",
        }
    }
}

/// One metric's samples over the queried range
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSeries {
    pub name: String,
    pub samples: Vec<Option<f64>>,
}

/// Pull the samples for `name` out of a query response
///
/// A metric missing from the response yields an empty series, which the
/// aggregator rejects as having too few samples.
pub fn samples_for(series: &[MetricSeries], name: &str) -> Vec<Option<f64>> {
    series
        .iter()
        .find(|s| s.name == name)
        .map(|s| s.samples.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_lookback_window() {
        let tick = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let range = TimeRange::lookback(tick, 60);

        assert_eq!(range.end, Utc.with_ymd_and_hms(2024, 5, 1, 11, 57, 0).unwrap());
        assert_eq!(range.start, Utc.with_ymd_and_hms(2024, 5, 1, 10, 57, 0).unwrap());
        assert_eq!(range.to_timespan(), "2024-05-01T10:57:00Z/2024-05-01T11:57:00Z");
    }

    #[test]
    fn test_samples_for_missing_metric() {
        let series = vec![MetricSeries {
            name: PERCENTAGE_CPU.to_string(),
            samples: vec![Some(1.0), None],
        }];

        assert_eq!(samples_for(&series, PERCENTAGE_CPU), vec![Some(1.0), None]);
        assert!(samples_for(&series, NETWORK_OUT).is_empty());
    }
}
