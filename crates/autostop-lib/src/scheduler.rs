//! Periodic tick loop
//!
//! Drives the orchestrator on a fixed interval, publishes each report, and
//! keeps health and metrics current.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, RwLock};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{info, warn};

use crate::error::CloudError;
use crate::health::{Component, HealthRegistry};
use crate::models::{Action, TickReport};
use crate::observability::{AutostopMetrics, StructuredLogger};
use crate::orchestrator::Orchestrator;

/// Most recent tick report, shared with the HTTP API
pub type ReportSlot = Arc<RwLock<Option<TickReport>>>;

#[derive(Debug, Clone)]
pub struct TickLoopConfig {
    pub interval: Duration,
    /// Run a single tick, then return
    pub run_once: bool,
}

impl Default for TickLoopConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            run_once: false,
        }
    }
}

pub struct TickLoop {
    orchestrator: Arc<Orchestrator>,
    config: TickLoopConfig,
    health: HealthRegistry,
    metrics: AutostopMetrics,
    logger: StructuredLogger,
    report: ReportSlot,
}

impl TickLoop {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        config: TickLoopConfig,
        health: HealthRegistry,
        metrics: AutostopMetrics,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            orchestrator,
            config,
            health,
            metrics,
            logger,
            report: Arc::new(RwLock::new(None)),
        }
    }

    pub fn report_slot(&self) -> ReportSlot {
        self.report.clone()
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            run_once = self.config.run_once,
            "Starting tick loop"
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                scheduled = ticker.tick() => {
                    let late = scheduled.elapsed();
                    if late > self.config.interval {
                        warn!(late_secs = late.as_secs(), "Tick is running past due");
                    }

                    // Errors are already reflected in health and metrics
                    let _ = self.run_tick().await;

                    if self.config.run_once {
                        info!("Single tick complete, exiting tick loop");
                        break;
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down tick loop");
                    break;
                }
            }
        }
    }

    /// Run one tick now and publish its outcome
    pub async fn run_tick(&self) -> Result<TickReport, CloudError> {
        let tick = Utc::now();
        let start = Instant::now();
        let result = self.orchestrator.run_tick(tick).await;
        let elapsed = start.elapsed().as_secs_f64();

        self.metrics.observe_tick_duration(elapsed);
        self.health.mark_healthy(Component::Scheduler).await;

        match &result {
            Ok(report) => {
                self.metrics.record_report(report);
                self.logger.log_tick(report, elapsed);
                self.update_health(report).await;
                *self.report.write().await = Some(report.clone());
            }
            Err(e) => {
                self.metrics.inc_tick_failed();
                self.logger.log_tick_failure(&e.to_string());
                self.health
                    .mark_unhealthy(Component::CloudApi, format!("subscription listing failed: {e}"))
                    .await;
            }
        }

        self.health.record_tick(tick).await;
        result
    }

    async fn update_health(&self, report: &TickReport) {
        let listing_failures = report.subscription_failures.len();
        let vm_failures = report.failure_count();
        if listing_failures + vm_failures > 0 {
            self.health
                .mark_degraded(
                    Component::CloudApi,
                    format!(
                        "{listing_failures} subscription listing(s) and {vm_failures} VM evaluation(s) failed"
                    ),
                )
                .await;
        } else {
            self.health.mark_healthy(Component::CloudApi).await;
        }

        let warnings_failed = report.count_action(Action::WarningFailed);
        if warnings_failed > 0 {
            self.health
                .mark_degraded(
                    Component::Notifier,
                    format!("{warnings_failed} warning email(s) failed"),
                )
                .await;
        } else {
            self.health.mark_healthy(Component::Notifier).await;
        }
    }
}
