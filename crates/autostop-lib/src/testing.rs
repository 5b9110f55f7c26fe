//! In-memory fakes for the cloud and notifier seams

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::cloud::{
    Deallocator, InstanceStatusReader, MetricsReader, Resource, ResourceGroupTagReader,
    ResourceLister, ResourceTagWriter, SubscriptionLister,
};
use crate::error::{CloudError, NotifyError};
use crate::metrics::{Aggregation, MetricSeries, TimeRange, NETWORK_OUT, PERCENTAGE_CPU};
use crate::models::{TagSet, VirtualMachine, RUNNING_POWER_STATE};
use crate::notify::Notifier;

fn injected(what: &str) -> CloudError {
    CloudError::Http {
        status: 500,
        message: format!("injected {what} failure"),
    }
}

#[derive(Default)]
struct CloudState {
    subscriptions: Vec<String>,
    fail_subscriptions: bool,
    resources: HashMap<String, Vec<Resource>>,
    failing_listings: HashSet<String>,
    group_tags: HashMap<(String, String), TagSet>,
    failing_groups: HashSet<(String, String)>,
    statuses: HashMap<String, String>,
    failing_status: HashSet<String>,
    panicking_status: HashSet<String>,
    metrics: HashMap<String, (Vec<Option<f64>>, Vec<Option<f64>>)>,
    failing_metrics: HashSet<String>,
    metric_queries: Vec<(String, TimeRange)>,
    tag_updates: Vec<(String, TagSet)>,
    fail_tag_updates: bool,
    deallocated: Vec<String>,
    fail_deallocate: bool,
}

/// Scriptable stand-in for the whole ARM surface
///
/// VMs default to running. A VM with no scripted metrics returns no series.
#[derive(Default)]
pub struct FakeCloud {
    state: Mutex<CloudState>,
}

impl FakeCloud {
    pub fn with_subscription(self, subscription_id: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .subscriptions
            .push(subscription_id.to_string());
        self
    }

    pub fn add_vm(&self, subscription_id: &str, resource: Resource) {
        self.state
            .lock()
            .unwrap()
            .resources
            .entry(subscription_id.to_string())
            .or_default()
            .push(resource);
    }

    pub fn set_group_tags(&self, subscription_id: &str, group: &str, tags: TagSet) {
        self.state
            .lock()
            .unwrap()
            .group_tags
            .insert((subscription_id.to_string(), group.to_string()), tags);
    }

    pub fn set_status(&self, resource_id: &str, status: &str) {
        self.state
            .lock()
            .unwrap()
            .statuses
            .insert(resource_id.to_string(), status.to_string());
    }

    pub fn set_metrics(&self, resource_id: &str, cpu: Vec<Option<f64>>, network: Vec<Option<f64>>) {
        self.state
            .lock()
            .unwrap()
            .metrics
            .insert(resource_id.to_string(), (cpu, network));
    }

    pub fn fail_subscriptions(&self, fail: bool) {
        self.state.lock().unwrap().fail_subscriptions = fail;
    }

    pub fn fail_listing(&self, subscription_id: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_listings
            .insert(subscription_id.to_string());
    }

    pub fn fail_group(&self, subscription_id: &str, group: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_groups
            .insert((subscription_id.to_string(), group.to_string()));
    }

    pub fn fail_status(&self, resource_id: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_status
            .insert(resource_id.to_string());
    }

    /// The status read for this VM panics instead of returning
    pub fn panic_on_status(&self, resource_id: &str) {
        self.state
            .lock()
            .unwrap()
            .panicking_status
            .insert(resource_id.to_string());
    }

    pub fn fail_metrics(&self, resource_id: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_metrics
            .insert(resource_id.to_string());
    }

    pub fn fail_tag_updates(&self, fail: bool) {
        self.state.lock().unwrap().fail_tag_updates = fail;
    }

    pub fn fail_deallocate(&self, fail: bool) {
        self.state.lock().unwrap().fail_deallocate = fail;
    }

    pub fn tag_updates(&self) -> Vec<(String, TagSet)> {
        self.state.lock().unwrap().tag_updates.clone()
    }

    pub fn deallocated(&self) -> Vec<String> {
        self.state.lock().unwrap().deallocated.clone()
    }

    pub fn metric_queries(&self) -> Vec<(String, TimeRange)> {
        self.state.lock().unwrap().metric_queries.clone()
    }
}

#[async_trait]
impl SubscriptionLister for FakeCloud {
    async fn list_subscriptions(&self) -> Result<Vec<String>, CloudError> {
        let state = self.state.lock().unwrap();
        if state.fail_subscriptions {
            return Err(injected("subscription listing"));
        }
        Ok(state.subscriptions.clone())
    }
}

#[async_trait]
impl ResourceLister for FakeCloud {
    async fn list_resources(
        &self,
        subscription_id: &str,
        _resource_type: &str,
    ) -> Result<Vec<Resource>, CloudError> {
        let state = self.state.lock().unwrap();
        if state.failing_listings.contains(subscription_id) {
            return Err(injected("resource listing"));
        }
        Ok(state
            .resources
            .get(subscription_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl ResourceGroupTagReader for FakeCloud {
    async fn resource_group_tags(
        &self,
        subscription_id: &str,
        resource_group: &str,
    ) -> Result<TagSet, CloudError> {
        let state = self.state.lock().unwrap();
        let key = (subscription_id.to_string(), resource_group.to_string());
        if state.failing_groups.contains(&key) {
            return Err(injected("resource group"));
        }
        Ok(state.group_tags.get(&key).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl ResourceTagWriter for FakeCloud {
    async fn update_tags(&self, resource_id: &str, tags: &TagSet) -> Result<(), CloudError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_tag_updates {
            return Err(injected("tag update"));
        }
        state
            .tag_updates
            .push((resource_id.to_string(), tags.clone()));
        Ok(())
    }
}

#[async_trait]
impl InstanceStatusReader for FakeCloud {
    async fn instance_status(&self, vm: &VirtualMachine) -> Result<String, CloudError> {
        // Checked before locking so the panic does not poison the state
        let panics = self.state.lock().unwrap().panicking_status.contains(&vm.id);
        if panics {
            panic!("injected instance view panic");
        }
        let state = self.state.lock().unwrap();
        if state.failing_status.contains(&vm.id) {
            return Err(injected("instance view"));
        }
        Ok(state
            .statuses
            .get(&vm.id)
            .cloned()
            .unwrap_or_else(|| RUNNING_POWER_STATE.to_string()))
    }
}

#[async_trait]
impl MetricsReader for FakeCloud {
    async fn query(
        &self,
        resource_id: &str,
        range: &TimeRange,
        _metric_names: &[&str],
        _aggregation: Aggregation,
    ) -> Result<Vec<MetricSeries>, CloudError> {
        let mut state = self.state.lock().unwrap();
        state
            .metric_queries
            .push((resource_id.to_string(), range.clone()));
        if state.failing_metrics.contains(resource_id) {
            return Err(injected("metrics"));
        }

        Ok(match state.metrics.get(resource_id) {
            Some((cpu, network)) => vec![
                MetricSeries {
                    name: PERCENTAGE_CPU.to_string(),
                    samples: cpu.clone(),
                },
                MetricSeries {
                    name: NETWORK_OUT.to_string(),
                    samples: network.clone(),
                },
            ],
            None => Vec::new(),
        })
    }
}

#[async_trait]
impl Deallocator for FakeCloud {
    async fn deallocate(&self, vm: &VirtualMachine) -> Result<(), CloudError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_deallocate {
            return Err(injected("deallocate"));
        }
        state.deallocated.push(vm.id.clone());
        Ok(())
    }
}

/// A message captured by [`RecordingNotifier`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub subject: String,
    pub html_body: String,
    pub recipient: String,
}

#[derive(Default)]
pub struct RecordingNotifier {
    default_to: Option<String>,
    fail: Mutex<bool>,
    sent: Mutex<Vec<SentMessage>>,
}

impl RecordingNotifier {
    pub fn new(default_to: Option<&str>) -> Self {
        Self {
            default_to: default_to.map(str::to_string),
            ..Default::default()
        }
    }

    pub fn fail(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(
        &self,
        subject: &str,
        html_body: &str,
        recipient: Option<&str>,
    ) -> Result<(), NotifyError> {
        if *self.fail.lock().unwrap() {
            return Err(NotifyError::Transport("injected send failure".to_string()));
        }
        let recipient = recipient
            .or(self.default_to.as_deref())
            .ok_or(NotifyError::NoRecipient)?;

        self.sent.lock().unwrap().push(SentMessage {
            subject: subject.to_string(),
            html_body: html_body.to_string(),
            recipient: recipient.to_string(),
        });
        Ok(())
    }

    fn default_recipient(&self) -> Option<&str> {
        self.default_to.as_deref()
    }
}

/// A VM resource under `sub-1/rg-1` with the given tags
pub fn vm_resource(name: &str, tags: &[(&str, &str)]) -> Resource {
    Resource {
        id: format!(
            "/subscriptions/sub-1/resourceGroups/rg-1/providers/Microsoft.Compute/virtualMachines/{name}"
        ),
        name: name.to_string(),
        tags: tags
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    }
}

/// Samples with essentially no variation
pub fn flat(value: f64, len: usize) -> Vec<Option<f64>> {
    vec![Some(value); len]
}

/// Samples that swing well past any sane baseline
pub fn bursty(len: usize) -> Vec<Option<f64>> {
    (0..len)
        .map(|i| Some(if i % 2 == 0 { 5.0 } else { 95.0 }))
        .collect()
}
