//! Observability for the auto-stop agent
//!
//! Provides:
//! - Prometheus metrics (tick latency, per-action VM counts, errors)
//! - Structured JSON events for every evaluation and tick

use std::sync::OnceLock;

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, Histogram, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};
use tracing::{error, info, warn};

use crate::models::{Action, EvaluationResult, TickReport, VmOutcome};

/// Tick latency buckets in seconds; a tick spans many HTTP round trips
const TICK_LATENCY_BUCKETS: &[f64] = &[0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0];

static GLOBAL_METRICS: OnceLock<AutostopMetricsInner> = OnceLock::new();

struct AutostopMetricsInner {
    tick_duration_seconds: Histogram,
    ticks: IntCounterVec,
    vms_evaluated: IntCounterVec,
    vms_skipped: IntCounter,
    evaluation_errors: IntCounterVec,
    subscription_failures: IntCounter,
    last_tick_timestamp: IntGauge,
}

impl AutostopMetricsInner {
    fn new() -> Self {
        Self {
            tick_duration_seconds: register_histogram!(
                "vm_autostop_tick_duration_seconds",
                "Wall time of one full evaluation tick",
                TICK_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register tick_duration_seconds"),

            ticks: register_int_counter_vec!(
                "vm_autostop_ticks_total",
                "Ticks run, by result",
                &["result"]
            )
            .expect("Failed to register ticks_total"),

            vms_evaluated: register_int_counter_vec!(
                "vm_autostop_vms_evaluated_total",
                "VMs evaluated, by action taken",
                &["action"]
            )
            .expect("Failed to register vms_evaluated_total"),

            vms_skipped: register_int_counter!(
                "vm_autostop_vms_skipped_total",
                "VMs not opted in or with an unreadable policy tag"
            )
            .expect("Failed to register vms_skipped_total"),

            evaluation_errors: register_int_counter_vec!(
                "vm_autostop_evaluation_errors_total",
                "VM evaluations aborted, by error kind",
                &["kind"]
            )
            .expect("Failed to register evaluation_errors_total"),

            subscription_failures: register_int_counter!(
                "vm_autostop_subscription_failures_total",
                "Subscriptions whose VM listing failed"
            )
            .expect("Failed to register subscription_failures_total"),

            last_tick_timestamp: register_int_gauge!(
                "vm_autostop_last_tick_timestamp_seconds",
                "Unix time of the last completed tick"
            )
            .expect("Failed to register last_tick_timestamp_seconds"),
        }
    }
}

/// Handle to the process-wide auto-stop metrics
///
/// Clones share the same registered collectors.
#[derive(Clone)]
pub struct AutostopMetrics {
    _private: (),
}

impl Default for AutostopMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AutostopMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(AutostopMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &AutostopMetricsInner {
        GLOBAL_METRICS.get_or_init(AutostopMetricsInner::new)
    }

    pub fn observe_tick_duration(&self, duration_secs: f64) {
        self.inner().tick_duration_seconds.observe(duration_secs);
    }

    pub fn inc_tick_failed(&self) {
        self.inner().ticks.with_label_values(&["failed"]).inc();
    }

    /// Fold a completed tick into the counters
    pub fn record_report(&self, report: &TickReport) {
        let inner = self.inner();
        inner.ticks.with_label_values(&["ok"]).inc();
        inner.vms_skipped.inc_by(report.vms_skipped as u64);
        inner
            .subscription_failures
            .inc_by(report.subscription_failures.len() as u64);

        for outcome in &report.outcomes {
            match outcome {
                VmOutcome::Evaluated(result) => {
                    let action = result.action.to_string();
                    inner.vms_evaluated.with_label_values(&[action.as_str()]).inc();
                }
                VmOutcome::Failed { error_kind, .. } => inner
                    .evaluation_errors
                    .with_label_values(&[error_kind.as_str()])
                    .inc(),
            }
        }

        inner.last_tick_timestamp.set(report.tick.timestamp());
    }

    pub fn vms_evaluated(&self, action: Action) -> u64 {
        let action = action.to_string();
        self.inner()
            .vms_evaluated
            .with_label_values(&[action.as_str()])
            .get()
    }

    pub fn evaluation_errors(&self, kind: &str) -> u64 {
        self.inner()
            .evaluation_errors
            .with_label_values(&[kind])
            .get()
    }

    pub fn last_tick_timestamp(&self) -> i64 {
        self.inner().last_tick_timestamp.get()
    }

    /// Prometheus text exposition of the default registry
    pub fn render(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
        Ok(buffer)
    }
}

/// Emits the agent's structured events
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_evaluation(&self, result: &EvaluationResult) {
        let (cpu_stdev, network_stdev) = match &result.metrics {
            Some(m) => (Some(m.percentage_cpu.stdev), Some(m.network_out.stdev)),
            None => (None, None),
        };

        info!(
            event = "vm_evaluated",
            instance = %self.instance,
            resource_id = %result.resource_id,
            instance_status = %result.instance_status,
            action = %result.action,
            inactivity_threshold_minutes = result.inactivity_threshold_minutes,
            post_warning_threshold_minutes = result.post_warning_threshold_minutes,
            warning_email_to = ?result.warning_email_to,
            cpu_stdev = ?cpu_stdev,
            network_stdev = ?network_stdev,
            "VM evaluated"
        );
    }

    pub fn log_evaluation_failure(&self, resource_id: &str, kind: &str, error: &str) {
        warn!(
            event = "vm_evaluation_failed",
            instance = %self.instance,
            resource_id = %resource_id,
            error_kind = %kind,
            error = %error,
            "VM evaluation failed"
        );
    }

    /// Summary line plus the full report as JSON
    pub fn log_tick(&self, report: &TickReport, duration_secs: f64) {
        let report_json = serde_json::to_string(report).unwrap_or_default();

        info!(
            event = "tick_completed",
            instance = %self.instance,
            tick = %report.tick.to_rfc3339(),
            duration_secs = duration_secs,
            subscriptions_scanned = report.subscriptions_scanned,
            subscription_failures = report.subscription_failures.len(),
            vms_skipped = report.vms_skipped,
            vms_evaluated = report.outcomes.len() - report.failure_count(),
            vms_failed = report.failure_count(),
            warnings_sent = report.count_action(Action::WarningSent),
            warnings_failed = report.count_action(Action::WarningFailed),
            stops_issued = report.count_action(Action::Stopping),
            report = %report_json,
            "Tick completed"
        );
    }

    pub fn log_tick_failure(&self, error: &str) {
        error!(
            event = "tick_failed",
            instance = %self.instance,
            error = %error,
            "Tick failed before any VM was evaluated"
        );
    }

    pub fn log_startup(&self, version: &str, tick_interval_secs: u64, run_once: bool) {
        info!(
            event = "agent_started",
            instance = %self.instance,
            agent_version = %version,
            tick_interval_secs = tick_interval_secs,
            run_once = run_once,
            "VM auto-stop agent started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            instance = %self.instance,
            reason = %reason,
            "VM auto-stop agent shutting down"
        );
    }
}
