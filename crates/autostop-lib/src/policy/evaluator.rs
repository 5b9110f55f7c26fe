//! Per-VM decision engine
//!
//! One call to [`PolicyEvaluator::evaluate`] runs the whole state machine for
//! one VM:
//!
//! | power state | activity | warning state      | effect                      |
//! |-------------|----------|--------------------|-----------------------------|
//! | not running | -        | -                  | none                        |
//! | running     | active   | any                | clear warning               |
//! | running     | inactive | none               | send warning, record tick   |
//! | running     | inactive | within grace       | none                        |
//! | running     | inactive | past grace         | clear warning, deallocate   |
//! | running     | inactive | after this tick    | send warning, record tick   |

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::config::VmPolicy;
use crate::cloud::{Deallocator, InstanceStatusReader, MetricsReader};
use crate::error::EvaluationError;
use crate::metrics::{
    samples_for, Aggregation, MetricsAggregate, TimeRange, NETWORK_OUT, PERCENTAGE_CPU,
};
use crate::models::{Action, EvaluationResult, VirtualMachine, RUNNING_POWER_STATE};
use crate::notify::{Notifier, WarningMessage};
use crate::state::WarningStateStore;

/// Decides and applies the auto-stop action for individual VMs
pub struct PolicyEvaluator {
    status: Arc<dyn InstanceStatusReader>,
    metrics: Arc<dyn MetricsReader>,
    deallocator: Arc<dyn Deallocator>,
    notifier: Arc<dyn Notifier>,
}

impl PolicyEvaluator {
    pub fn new(
        status: Arc<dyn InstanceStatusReader>,
        metrics: Arc<dyn MetricsReader>,
        deallocator: Arc<dyn Deallocator>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            status,
            metrics,
            deallocator,
            notifier,
        }
    }

    pub async fn evaluate(
        &self,
        vm: &VirtualMachine,
        policy: &VmPolicy,
        store: &mut dyn WarningStateStore,
        tick: DateTime<Utc>,
    ) -> Result<EvaluationResult, EvaluationError> {
        let instance_status = self
            .status
            .instance_status(vm)
            .await
            .map_err(EvaluationError::Status)?;

        let mut result = EvaluationResult {
            timestamp: tick,
            resource_id: vm.id.clone(),
            instance_status,
            inactivity_threshold_minutes: policy.inactivity_threshold_minutes,
            post_warning_threshold_minutes: policy.post_warning_threshold_minutes,
            warning_email_to: policy
                .warning_email_to
                .clone()
                .or_else(|| self.notifier.default_recipient().map(str::to_string)),
            action: Action::None,
            metrics: None,
        };

        if result.instance_status != RUNNING_POWER_STATE {
            debug!(vm = %vm.name, status = %result.instance_status, "VM not running");
            return Ok(result);
        }

        let range = TimeRange::lookback(tick, policy.inactivity_threshold_minutes);
        let series = self
            .metrics
            .query(&vm.id, &range, &[PERCENTAGE_CPU, NETWORK_OUT], Aggregation::Total)
            .await
            .map_err(EvaluationError::Metrics)?;

        let aggregate = MetricsAggregate::compute(
            samples_for(&series, PERCENTAGE_CPU),
            samples_for(&series, NETWORK_OUT),
            policy.cpu_stdev_baseline_pct,
            policy.network_stdev_baseline_pct,
        )?;
        let inactive = aggregate.is_inactive();
        result.metrics = Some(aggregate);

        // A warning stamped after this tick cannot be aged, so it is re-sent
        let warned_at = store.get().await.filter(|warned_at| {
            let future_dated = *warned_at > tick;
            if future_dated {
                warn!(vm = %vm.name, warned_at = %warned_at, "Warning timestamp is in the future");
            }
            !future_dated
        });

        result.action = match (inactive, warned_at) {
            (false, warned_at) => {
                if warned_at.is_some() {
                    debug!(vm = %vm.name, "VM active again, clearing warning");
                }
                store.delete().await.map_err(EvaluationError::WarningState)?;
                Action::None
            }
            (true, None) => self.warn(vm, policy, store, tick).await?,
            (true, Some(warned_at)) => {
                let elapsed = (tick - warned_at).num_minutes();
                let grace = i64::try_from(policy.post_warning_threshold_minutes).unwrap_or(i64::MAX);

                if elapsed >= grace {
                    store.delete().await.map_err(EvaluationError::WarningState)?;
                    self.deallocator
                        .deallocate(vm)
                        .await
                        .map_err(EvaluationError::Stop)?;
                    info!(vm = %vm.name, elapsed_minutes = elapsed, "Deallocation requested");
                    Action::Stopping
                } else {
                    debug!(
                        vm = %vm.name,
                        elapsed_minutes = elapsed,
                        grace_minutes = grace,
                        "Within grace period"
                    );
                    Action::None
                }
            }
        };

        Ok(result)
    }

    async fn warn(
        &self,
        vm: &VirtualMachine,
        policy: &VmPolicy,
        store: &mut dyn WarningStateStore,
        tick: DateTime<Utc>,
    ) -> Result<Action, EvaluationError> {
        let message = WarningMessage::new(vm, tick, policy.post_warning_threshold_minutes);
        let recipient = policy
            .warning_email_to
            .as_deref()
            .or_else(|| self.notifier.default_recipient());

        if let Err(e) = self
            .notifier
            .send(&message.subject, &message.html_body, recipient)
            .await
        {
            warn!(vm = %vm.name, error = %e, "Failed to send warning email");
            return Ok(Action::WarningFailed);
        }

        store.set(tick).await.map_err(EvaluationError::WarningState)?;
        Ok(Action::WarningSent)
    }
}
