//! Cloud management capabilities consumed by the auto-stop core
//!
//! Each trait is a narrow seam over one external operation. [`ArmClient`]
//! implements all of them against the Azure Resource Manager REST API; tests
//! substitute in-memory fakes.

mod arm;

pub use arm::{ArmClient, ArmCredential, DEFAULT_ARM_ENDPOINT};

use std::sync::Arc;

pub use async_trait::async_trait;

use crate::error::CloudError;
use crate::metrics::{Aggregation, MetricSeries, TimeRange};
use crate::models::{TagSet, VirtualMachine};

/// Resource type filter for virtual machines
pub const VIRTUAL_MACHINE_TYPE: &str = "Microsoft.Compute/virtualMachines";

/// A listed resource before any policy is applied
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub id: String,
    pub name: String,
    pub tags: TagSet,
}

#[async_trait]
pub trait SubscriptionLister: Send + Sync {
    async fn list_subscriptions(&self) -> Result<Vec<String>, CloudError>;
}

#[async_trait]
pub trait ResourceLister: Send + Sync {
    /// List resources of `resource_type` in a subscription
    async fn list_resources(
        &self,
        subscription_id: &str,
        resource_type: &str,
    ) -> Result<Vec<Resource>, CloudError>;

    async fn list_virtual_machines(&self, subscription_id: &str) -> Result<Vec<Resource>, CloudError> {
        self.list_resources(subscription_id, VIRTUAL_MACHINE_TYPE).await
    }
}

#[async_trait]
pub trait ResourceGroupTagReader: Send + Sync {
    async fn resource_group_tags(
        &self,
        subscription_id: &str,
        resource_group: &str,
    ) -> Result<TagSet, CloudError>;
}

#[async_trait]
pub trait ResourceTagWriter: Send + Sync {
    /// Replace the full tag set of a resource
    async fn update_tags(&self, resource_id: &str, tags: &TagSet) -> Result<(), CloudError>;
}

#[async_trait]
pub trait InstanceStatusReader: Send + Sync {
    /// Most recent power state code, e.g. `PowerState/running`
    async fn instance_status(&self, vm: &VirtualMachine) -> Result<String, CloudError>;
}

#[async_trait]
pub trait MetricsReader: Send + Sync {
    async fn query(
        &self,
        resource_id: &str,
        range: &TimeRange,
        metric_names: &[&str],
        aggregation: Aggregation,
    ) -> Result<Vec<MetricSeries>, CloudError>;
}

#[async_trait]
pub trait Deallocator: Send + Sync {
    /// Request deallocation; returns once the request is accepted
    async fn deallocate(&self, vm: &VirtualMachine) -> Result<(), CloudError>;
}

/// The full set of cloud capabilities, injected into the orchestrator
#[derive(Clone)]
pub struct CloudCapabilities {
    pub subscriptions: Arc<dyn SubscriptionLister>,
    pub resources: Arc<dyn ResourceLister>,
    pub resource_groups: Arc<dyn ResourceGroupTagReader>,
    pub tag_writer: Arc<dyn ResourceTagWriter>,
    pub status: Arc<dyn InstanceStatusReader>,
    pub metrics: Arc<dyn MetricsReader>,
    pub deallocator: Arc<dyn Deallocator>,
}

impl CloudCapabilities {
    /// Use one client for every capability
    pub fn from_client<C>(client: Arc<C>) -> Self
    where
        C: SubscriptionLister
            + ResourceLister
            + ResourceGroupTagReader
            + ResourceTagWriter
            + InstanceStatusReader
            + MetricsReader
            + Deallocator
            + 'static,
    {
        Self {
            subscriptions: client.clone(),
            resources: client.clone(),
            resource_groups: client.clone(),
            tag_writer: client.clone(),
            status: client.clone(),
            metrics: client.clone(),
            deallocator: client,
        }
    }
}
