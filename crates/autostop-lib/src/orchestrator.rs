//! One tick over every subscription and opted-in VM
//!
//! Listing and policy resolution run sequentially; evaluation fans out with a
//! bounded number of VMs in flight. Nothing is shared between evaluations
//! except the injected clients.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::cloud::CloudCapabilities;
use crate::error::CloudError;
use crate::models::{SubscriptionFailure, TagSet, TickReport, VirtualMachine, VmOutcome};
use crate::observability::StructuredLogger;
use crate::policy::{
    collect_params, is_opted_in, PolicyDefaults, PolicyEvaluator, VmPolicy,
    DEFAULT_PARAMETER_TAG, DEFAULT_WARNING_TAG,
};
use crate::state::TagWarningStore;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Tag holding the `k=v;k=v` policy blob
    pub parameter_tag: String,
    /// Tag holding the unresolved warning timestamp
    pub warning_tag: String,
    pub max_concurrent_evaluations: usize,
    pub defaults: PolicyDefaults,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            parameter_tag: DEFAULT_PARAMETER_TAG.to_string(),
            warning_tag: DEFAULT_WARNING_TAG.to_string(),
            max_concurrent_evaluations: 8,
            defaults: PolicyDefaults::default(),
        }
    }
}

struct Candidate {
    vm: VirtualMachine,
    policy: VmPolicy,
}

pub struct Orchestrator {
    cloud: CloudCapabilities,
    evaluator: Arc<PolicyEvaluator>,
    config: OrchestratorConfig,
    logger: StructuredLogger,
}

impl Orchestrator {
    pub fn new(
        cloud: CloudCapabilities,
        evaluator: Arc<PolicyEvaluator>,
        config: OrchestratorConfig,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            cloud,
            evaluator,
            config,
            logger,
        }
    }

    /// Evaluate every eligible VM once
    ///
    /// Fails only when the subscription listing fails. Everything below that
    /// is recorded in the report and the tick carries on.
    pub async fn run_tick(&self, tick: DateTime<Utc>) -> Result<TickReport, CloudError> {
        let subscriptions = self.cloud.subscriptions.list_subscriptions().await?;
        info!(subscriptions = subscriptions.len(), tick = %tick, "Starting tick");

        let mut report = TickReport {
            tick,
            subscriptions_scanned: subscriptions.len(),
            vms_skipped: 0,
            outcomes: Vec::new(),
            subscription_failures: Vec::new(),
        };

        let mut candidates = Vec::new();
        for subscription_id in &subscriptions {
            candidates.extend(self.collect_candidates(subscription_id, &mut report).await);
        }

        report.outcomes.extend(self.evaluate_all(candidates, tick).await);
        report
            .outcomes
            .sort_by(|a, b| a.resource_id().cmp(b.resource_id()));

        Ok(report)
    }

    async fn collect_candidates(
        &self,
        subscription_id: &str,
        report: &mut TickReport,
    ) -> Vec<Candidate> {
        let resources = match self.cloud.resources.list_virtual_machines(subscription_id).await {
            Ok(resources) => resources,
            Err(e) => {
                warn!(subscription_id, error = %e, "Failed to list VMs, skipping subscription");
                report.subscription_failures.push(SubscriptionFailure {
                    subscription_id: subscription_id.to_string(),
                    error: e.to_string(),
                });
                return Vec::new();
            }
        };

        let mut group_tags: HashMap<String, Result<TagSet, String>> = HashMap::new();
        let mut candidates = Vec::new();

        for resource in resources {
            let vm = match VirtualMachine::from_resource(
                subscription_id,
                resource.id,
                resource.name,
                resource.tags,
            ) {
                Ok(vm) => vm,
                Err(e) => {
                    warn!(subscription_id, error = %e, "Skipping VM with unusable resource id");
                    report.vms_skipped += 1;
                    continue;
                }
            };

            if !group_tags.contains_key(&vm.resource_group) {
                let tags = self
                    .cloud
                    .resource_groups
                    .resource_group_tags(subscription_id, &vm.resource_group)
                    .await
                    .map_err(|e| e.to_string());
                group_tags.insert(vm.resource_group.clone(), tags);
            }

            let rg_tags = match group_tags.get(&vm.resource_group) {
                Some(Ok(tags)) => tags,
                Some(Err(e)) => {
                    self.logger
                        .log_evaluation_failure(&vm.id, "resource_group", e);
                    report.outcomes.push(VmOutcome::Failed {
                        resource_id: vm.id.clone(),
                        error_kind: "resource_group".to_string(),
                        error: e.clone(),
                    });
                    continue;
                }
                None => continue,
            };

            let params = match collect_params(rg_tags, &vm.tags, &self.config.parameter_tag) {
                Ok(params) => params,
                Err(e) => {
                    warn!(vm = %vm.name, resource_id = %vm.id, error = %e, "Unreadable auto-stop tag, skipping VM");
                    report.vms_skipped += 1;
                    continue;
                }
            };

            if !is_opted_in(&params) {
                debug!(vm = %vm.name, "VM not opted in");
                report.vms_skipped += 1;
                continue;
            }

            let (policy, errors) = VmPolicy::resolve(&params, &self.config.defaults);
            for e in errors {
                warn!(vm = %vm.name, resource_id = %vm.id, error = %e, "Invalid policy value, using default");
            }

            candidates.push(Candidate { vm, policy });
        }

        candidates
    }

    async fn evaluate_all(&self, candidates: Vec<Candidate>, tick: DateTime<Utc>) -> Vec<VmOutcome> {
        let permits = Arc::new(Semaphore::new(self.config.max_concurrent_evaluations.max(1)));
        let mut tasks = JoinSet::new();

        for Candidate { vm, policy } in candidates {
            let permits = permits.clone();
            let evaluator = self.evaluator.clone();
            let writer = self.cloud.tag_writer.clone();
            let warning_tag = self.config.warning_tag.clone();

            tasks.spawn(async move {
                // The semaphore is never closed
                let _permit = permits.acquire_owned().await.ok();

                let resource_id = vm.id.clone();
                // Inner task so a panic still maps back to its VM
                let evaluation = tokio::spawn(async move {
                    let mut store =
                        TagWarningStore::new(writer, vm.id.clone(), vm.tags.clone(), warning_tag);
                    evaluator.evaluate(&vm, &policy, &mut store, tick).await
                });

                match evaluation.await {
                    Ok(Ok(result)) => VmOutcome::Evaluated(result),
                    Ok(Err(e)) => VmOutcome::Failed {
                        resource_id,
                        error_kind: e.kind().to_string(),
                        error: e.to_string(),
                    },
                    Err(e) => VmOutcome::Failed {
                        resource_id,
                        error_kind: "panic".to_string(),
                        error: e.to_string(),
                    },
                }
            });
        }

        let mut outcomes = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => {
                    match &outcome {
                        VmOutcome::Evaluated(result) => self.logger.log_evaluation(result),
                        VmOutcome::Failed {
                            resource_id,
                            error_kind,
                            error,
                        } => self
                            .logger
                            .log_evaluation_failure(resource_id, error_kind, error),
                    }
                    outcomes.push(outcome);
                }
                Err(e) => error!(error = %e, "Evaluation task did not complete"),
            }
        }

        outcomes
    }
}
