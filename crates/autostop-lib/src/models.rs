//! Core data models for the auto-stop agent

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CloudError;
use crate::metrics::MetricsAggregate;

/// Power state reported for a VM that is up and billing
pub const RUNNING_POWER_STATE: &str = "PowerState/running";

/// Tag set attached to a resource (name -> value)
pub type TagSet = BTreeMap<String, String>;

/// A virtual machine as returned by the resource listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualMachine {
    pub id: String,
    pub name: String,
    pub subscription_id: String,
    pub resource_group: String,
    #[serde(default)]
    pub tags: TagSet,
}

impl VirtualMachine {
    /// Build a VM from a listed resource, deriving its resource group from the id
    pub fn from_resource(
        subscription_id: impl Into<String>,
        id: impl Into<String>,
        name: impl Into<String>,
        tags: TagSet,
    ) -> Result<Self, CloudError> {
        let id = id.into();
        let resource_group = resource_group_from_id(&id)
            .ok_or_else(|| CloudError::InvalidResourceId(id.clone()))?
            .to_string();

        Ok(Self {
            id,
            name: name.into(),
            subscription_id: subscription_id.into(),
            resource_group,
            tags,
        })
    }
}

/// Extract the resource group segment of an ARM resource id
///
/// `/subscriptions/s/resourceGroups/rg/providers/...` yields `rg`. The
/// segment name is matched case-insensitively since ARM is inconsistent about it.
pub fn resource_group_from_id(id: &str) -> Option<&str> {
    let mut segments = id.split('/').filter(|s| !s.is_empty());
    while let Some(segment) = segments.next() {
        if segment.eq_ignore_ascii_case("resourceGroups") {
            return segments.next();
        }
    }
    None
}

/// What the evaluator did to a VM on this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    None,
    WarningSent,
    WarningFailed,
    Stopping,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::None => write!(f, "none"),
            Action::WarningSent => write!(f, "warning-sent"),
            Action::WarningFailed => write!(f, "warning-failed"),
            Action::Stopping => write!(f, "stopping"),
        }
    }
}

/// Outcome record for one VM on one tick, used for logging only
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationResult {
    pub timestamp: DateTime<Utc>,
    pub resource_id: String,
    pub instance_status: String,
    pub inactivity_threshold_minutes: u64,
    pub post_warning_threshold_minutes: u64,
    pub warning_email_to: Option<String>,
    pub action: Action,
    /// Absent when the VM was not running and no metrics were fetched
    pub metrics: Option<MetricsAggregate>,
}

/// Per-VM entry in a tick report
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VmOutcome {
    Evaluated(EvaluationResult),
    Failed {
        resource_id: String,
        error_kind: String,
        error: String,
    },
}

impl VmOutcome {
    pub fn resource_id(&self) -> &str {
        match self {
            VmOutcome::Evaluated(result) => &result.resource_id,
            VmOutcome::Failed { resource_id, .. } => resource_id,
        }
    }

    pub fn action(&self) -> Option<Action> {
        match self {
            VmOutcome::Evaluated(result) => Some(result.action),
            VmOutcome::Failed { .. } => None,
        }
    }
}

/// A subscription that could not be scanned during a tick
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionFailure {
    pub subscription_id: String,
    pub error: String,
}

/// Everything one tick did, logged as a batch
#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    pub tick: DateTime<Utc>,
    pub subscriptions_scanned: usize,
    /// VMs listed but not opted in, or with an unparsable policy blob
    pub vms_skipped: usize,
    pub outcomes: Vec<VmOutcome>,
    pub subscription_failures: Vec<SubscriptionFailure>,
}

impl TickReport {
    pub fn count_action(&self, action: Action) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.action() == Some(action))
            .count()
    }

    pub fn failure_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, VmOutcome::Failed { .. }))
            .count()
    }
}
