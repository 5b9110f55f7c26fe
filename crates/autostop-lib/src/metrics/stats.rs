//! Summary statistics over a metrics window
//!
//! Missing samples are mapped to positive infinity rather than zero: a window
//! with gaps is never mistaken for a flat, idle one.

use serde::Serialize;

use crate::error::{EvaluationError, StatsError};

/// Arithmetic mean; empty input is an error
pub fn mean(values: &[f64]) -> Result<f64, StatsError> {
    if values.is_empty() {
        return Err(StatsError::InsufficientSamples { len: 0 });
    }
    Ok(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (Bessel's correction)
///
/// Undefined below two samples. Any non-finite sample makes the result
/// infinite.
pub fn sample_stdev(values: &[f64]) -> Result<f64, StatsError> {
    if values.len() < 2 {
        return Err(StatsError::InsufficientSamples { len: values.len() });
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Ok(f64::INFINITY);
    }

    // Two-pass for stability
    let mean = mean(values)?;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
        / (values.len() - 1) as f64;

    Ok(variance.sqrt())
}

/// Statistics for one metric series against its baseline
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesSummary {
    /// Raw samples as fetched; `None` marks an interval with no data
    pub samples: Vec<Option<f64>>,
    pub mean: f64,
    pub stdev: f64,
    /// Standard deviation as a percentage of the mean
    pub stdev_pct: f64,
    pub baseline_pct: f64,
    /// Largest standard deviation still considered quiescent
    pub max_allowed_stdev: f64,
}

impl SeriesSummary {
    pub fn from_samples(samples: Vec<Option<f64>>, baseline_pct: f64) -> Result<Self, StatsError> {
        let values: Vec<f64> = samples
            .iter()
            .map(|s| s.unwrap_or(f64::INFINITY))
            .collect();

        if values.len() < 2 {
            return Err(StatsError::InsufficientSamples { len: values.len() });
        }

        let mean = mean(&values)?;
        if mean == 0.0 {
            return Err(StatsError::ZeroMean);
        }
        let stdev = sample_stdev(&values)?;

        let (stdev_pct, max_allowed_stdev) = if mean.is_finite() {
            (stdev / mean * 100.0, mean * baseline_pct / 100.0)
        } else {
            (f64::INFINITY, f64::INFINITY)
        };

        Ok(Self {
            samples,
            mean,
            stdev,
            stdev_pct,
            baseline_pct,
            max_allowed_stdev,
        })
    }

    /// Whether the series varied no more than its baseline allows
    pub fn is_quiescent(&self) -> bool {
        self.stdev.is_finite() && self.stdev <= self.max_allowed_stdev
    }
}

/// CPU and network-out statistics for one VM on one tick
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsAggregate {
    pub percentage_cpu: SeriesSummary,
    pub network_out: SeriesSummary,
}

impl MetricsAggregate {
    pub fn compute(
        cpu_samples: Vec<Option<f64>>,
        network_samples: Vec<Option<f64>>,
        cpu_baseline_pct: f64,
        network_baseline_pct: f64,
    ) -> Result<Self, EvaluationError> {
        let percentage_cpu = SeriesSummary::from_samples(cpu_samples, cpu_baseline_pct)
            .map_err(|source| EvaluationError::Statistics {
                series: "percentage_cpu",
                source,
            })?;
        let network_out = SeriesSummary::from_samples(network_samples, network_baseline_pct)
            .map_err(|source| EvaluationError::Statistics {
                series: "network_out",
                source,
            })?;

        Ok(Self {
            percentage_cpu,
            network_out,
        })
    }

    /// Inactive when neither CPU nor network output varied beyond baseline
    pub fn is_inactive(&self) -> bool {
        self.percentage_cpu.is_quiescent() && self.network_out.is_quiescent()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(values: &[f64]) -> Vec<Option<f64>> {
        values.iter().copied().map(Some).collect()
    }

    #[test]
    fn test_sample_stdev_known_values() {
        // 2, 4, 4, 4, 5, 5, 7, 9 -> sample stdev = sqrt(32 / 7)
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let stdev = sample_stdev(&values).unwrap();
        assert!((stdev - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
        assert!((mean(&values).unwrap() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_stdev_single_sample_is_error() {
        assert_eq!(
            sample_stdev(&[1.0]),
            Err(StatsError::InsufficientSamples { len: 1 })
        );
        assert_eq!(
            SeriesSummary::from_samples(vec![Some(3.0)], 10.0),
            Err(StatsError::InsufficientSamples { len: 1 })
        );
        assert_eq!(
            SeriesSummary::from_samples(vec![], 10.0),
            Err(StatsError::InsufficientSamples { len: 0 })
        );
    }

    #[test]
    fn test_missing_sample_is_infinite_not_zero() {
        let summary = SeriesSummary::from_samples(vec![Some(1.0), None, Some(1.0)], 10.0).unwrap();
        assert!(summary.mean.is_infinite());
        assert!(summary.stdev.is_infinite());
        assert!(!summary.is_quiescent());
    }

    #[test]
    fn test_all_missing_never_quiescent() {
        let summary = SeriesSummary::from_samples(vec![None, None, None], 100.0).unwrap();
        assert!(summary.stdev.is_infinite());
        assert!(summary.max_allowed_stdev.is_infinite());
        assert!(!summary.is_quiescent());
    }

    #[test]
    fn test_zero_mean_is_error() {
        assert_eq!(
            SeriesSummary::from_samples(series(&[0.0, 0.0, 0.0]), 10.0),
            Err(StatsError::ZeroMean)
        );
    }

    #[test]
    fn test_derived_values() {
        // mean 10, stdev 1
        let summary = SeriesSummary::from_samples(series(&[9.0, 10.0, 11.0]), 20.0).unwrap();
        assert!((summary.mean - 10.0).abs() < 1e-12);
        assert!((summary.stdev - 1.0).abs() < 1e-12);
        assert!((summary.stdev_pct - 10.0).abs() < 1e-9);
        assert!((summary.max_allowed_stdev - 2.0).abs() < 1e-12);
        assert!(summary.is_quiescent());
    }

    #[test]
    fn test_constant_load_is_inactive() {
        let aggregate = MetricsAggregate::compute(
            series(&[0.4, 0.4, 0.4, 0.4]),
            series(&[1200.0, 1200.0, 1200.0, 1200.0]),
            10.0,
            10.0,
        )
        .unwrap();
        assert!(aggregate.is_inactive());
    }

    #[test]
    fn test_bursty_network_is_active() {
        let aggregate = MetricsAggregate::compute(
            series(&[1.0, 1.1, 0.9, 1.0]),
            series(&[1000.0, 90_000.0, 500.0, 40_000.0]),
            10.0,
            10.0,
        )
        .unwrap();
        assert!(aggregate.percentage_cpu.is_quiescent());
        assert!(!aggregate.network_out.is_quiescent());
        assert!(!aggregate.is_inactive());
    }

    #[test]
    fn test_compute_labels_failing_series() {
        let err = MetricsAggregate::compute(series(&[1.0, 2.0]), series(&[5.0]), 10.0, 10.0)
            .unwrap_err();
        match err {
            EvaluationError::Statistics { series, source } => {
                assert_eq!(series, "network_out");
                assert_eq!(source, StatsError::InsufficientSamples { len: 1 });
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
