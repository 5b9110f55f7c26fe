//! Azure Resource Manager REST client
//!
//! A thin adapter: each capability trait maps onto one ARM endpoint. Token
//! acquisition is not handled here; the client is either given a bearer token
//! or a file that some external refresher keeps current.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::{
    async_trait, Deallocator, InstanceStatusReader, MetricsReader, Resource,
    ResourceGroupTagReader, ResourceLister, ResourceTagWriter, SubscriptionLister,
};
use crate::error::CloudError;
use crate::metrics::{Aggregation, MetricSeries, TimeRange};
use crate::models::{TagSet, VirtualMachine};

pub const DEFAULT_ARM_ENDPOINT: &str = "https://management.azure.com";

const SUBSCRIPTIONS_API_VERSION: &str = "2020-01-01";
const RESOURCES_API_VERSION: &str = "2019-07-01";
const COMPUTE_API_VERSION: &str = "2019-07-01";
const METRICS_API_VERSION: &str = "2018-01-01";

/// Where the bearer token comes from
#[derive(Debug, Clone)]
pub enum ArmCredential {
    Static(String),
    /// Re-read on every request
    TokenFile(PathBuf),
}

impl ArmCredential {
    async fn bearer(&self) -> Result<String, CloudError> {
        match self {
            ArmCredential::Static(token) => Ok(token.clone()),
            ArmCredential::TokenFile(path) => {
                let token = tokio::fs::read_to_string(path).await.map_err(|e| {
                    CloudError::Credential(format!("failed to read {}: {}", path.display(), e))
                })?;
                let token = token.trim();
                if token.is_empty() {
                    return Err(CloudError::Credential(format!(
                        "token file {} is empty",
                        path.display()
                    )));
                }
                Ok(token.to_string())
            }
        }
    }
}

/// Client for the ARM management plane
pub struct ArmClient {
    http: Client,
    base_url: Url,
    credential: ArmCredential,
}

impl ArmClient {
    pub fn new(
        endpoint: &str,
        credential: ArmCredential,
        request_timeout: Duration,
    ) -> Result<Self, CloudError> {
        let http = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| CloudError::Config(format!("failed to create HTTP client: {e}")))?;

        let base_url = Url::parse(endpoint)
            .map_err(|e| CloudError::Config(format!("invalid endpoint {endpoint}: {e}")))?;

        Ok(Self {
            http,
            base_url,
            credential,
        })
    }

    fn url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, CloudError> {
        let mut url = self
            .base_url
            .join(path)
            .map_err(|e| CloudError::InvalidResourceId(format!("{path}: {e}")))?;
        url.query_pairs_mut().extend_pairs(query);
        Ok(url)
    }

    fn vm_path(vm: &VirtualMachine, suffix: &str) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Compute/virtualMachines/{}/{}",
            vm.subscription_id, vm.resource_group, vm.name, suffix
        )
    }

    async fn execute(&self, request: RequestBuilder) -> Result<reqwest::Response, CloudError> {
        let token = self.credential.bearer().await?;
        let response = request.bearer_auth(token).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CloudError::Http {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, CloudError> {
        let response = self.execute(self.http.get(url)).await?;
        response
            .json()
            .await
            .map_err(|e| CloudError::InvalidResponse(e.to_string()))
    }

    /// Follow `nextLink` until the listing is exhausted
    async fn get_paged<T: DeserializeOwned>(&self, first: Url) -> Result<Vec<T>, CloudError> {
        let mut items = Vec::new();
        let mut next = Some(first);

        while let Some(url) = next.take() {
            let page: Page<T> = self.get_json(url).await?;
            items.extend(page.value);

            if let Some(link) = page.next_link {
                let url = Url::parse(&link)
                    .map_err(|e| CloudError::InvalidResponse(format!("bad nextLink {link}: {e}")))?;
                next = Some(url);
            }
        }

        Ok(items)
    }
}

#[derive(Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
    #[serde(rename = "nextLink")]
    next_link: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionEntry {
    subscription_id: String,
}

#[derive(Deserialize)]
struct ResourceEntry {
    id: String,
    name: String,
    tags: Option<TagSet>,
}

#[derive(Deserialize)]
struct ResourceGroupEntry {
    tags: Option<TagSet>,
}

#[derive(Serialize)]
struct TagsPatch<'a> {
    tags: &'a TagSet,
}

#[derive(Deserialize)]
struct InstanceView {
    #[serde(default)]
    statuses: Vec<InstanceViewStatus>,
}

#[derive(Deserialize)]
struct InstanceViewStatus {
    code: String,
}

#[derive(Deserialize)]
struct MetricsResponse {
    #[serde(default)]
    value: Vec<MetricEntry>,
}

#[derive(Deserialize)]
struct MetricEntry {
    name: LocalizableName,
    #[serde(default)]
    timeseries: Vec<TimeSeriesEntry>,
}

#[derive(Deserialize)]
struct LocalizableName {
    value: String,
}

#[derive(Deserialize)]
struct TimeSeriesEntry {
    #[serde(default)]
    data: Vec<MetricValue>,
}

#[derive(Deserialize)]
struct MetricValue {
    total: Option<f64>,
}

#[async_trait]
impl SubscriptionLister for ArmClient {
    async fn list_subscriptions(&self) -> Result<Vec<String>, CloudError> {
        let url = self.url("/subscriptions", &[("api-version", SUBSCRIPTIONS_API_VERSION)])?;
        let entries: Vec<SubscriptionEntry> = self.get_paged(url).await?;
        Ok(entries.into_iter().map(|e| e.subscription_id).collect())
    }
}

#[async_trait]
impl ResourceLister for ArmClient {
    async fn list_resources(
        &self,
        subscription_id: &str,
        resource_type: &str,
    ) -> Result<Vec<Resource>, CloudError> {
        let filter = format!("resourceType eq '{resource_type}'");
        let url = self.url(
            &format!("/subscriptions/{subscription_id}/resources"),
            &[("$filter", filter.as_str()), ("api-version", RESOURCES_API_VERSION)],
        )?;

        let entries: Vec<ResourceEntry> = self.get_paged(url).await?;
        debug!(subscription_id = %subscription_id, count = entries.len(), "Listed resources");

        Ok(entries
            .into_iter()
            .map(|e| Resource {
                id: e.id,
                name: e.name,
                tags: e.tags.unwrap_or_default(),
            })
            .collect())
    }
}

#[async_trait]
impl ResourceGroupTagReader for ArmClient {
    async fn resource_group_tags(
        &self,
        subscription_id: &str,
        resource_group: &str,
    ) -> Result<TagSet, CloudError> {
        let url = self.url(
            &format!("/subscriptions/{subscription_id}/resourcegroups/{resource_group}"),
            &[("api-version", RESOURCES_API_VERSION)],
        )?;
        let group: ResourceGroupEntry = self.get_json(url).await?;
        Ok(group.tags.unwrap_or_default())
    }
}

#[async_trait]
impl ResourceTagWriter for ArmClient {
    async fn update_tags(&self, resource_id: &str, tags: &TagSet) -> Result<(), CloudError> {
        let url = self.url(resource_id, &[("api-version", COMPUTE_API_VERSION)])?;
        self.execute(self.http.patch(url).json(&TagsPatch { tags }))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl InstanceStatusReader for ArmClient {
    async fn instance_status(&self, vm: &VirtualMachine) -> Result<String, CloudError> {
        let url = self.url(
            &Self::vm_path(vm, "instanceView"),
            &[("api-version", COMPUTE_API_VERSION)],
        )?;
        let view: InstanceView = self.get_json(url).await?;

        view.statuses
            .into_iter()
            .last()
            .map(|s| s.code)
            .ok_or_else(|| {
                CloudError::InvalidResponse(format!("instance view of {} has no statuses", vm.id))
            })
    }
}

#[async_trait]
impl MetricsReader for ArmClient {
    async fn query(
        &self,
        resource_id: &str,
        range: &TimeRange,
        metric_names: &[&str],
        aggregation: Aggregation,
    ) -> Result<Vec<MetricSeries>, CloudError> {
        let timespan = range.to_timespan();
        let names = metric_names.join(",");
        let url = self.url(
            &format!("{resource_id}/providers/microsoft.insights/metrics"),
            &[
                ("timespan", timespan.as_str()),
                ("metricnames", names.as_str()),
                ("aggregation", aggregation.as_str()),
                ("api-version", METRICS_API_VERSION),
            ],
        )?;

        let response: MetricsResponse = self.get_json(url).await?;

        Ok(response
            .value
            .into_iter()
            .map(|metric| MetricSeries {
                name: metric.name.value,
                samples: metric
                    .timeseries
                    .into_iter()
                    .next()
                    .map(|ts| ts.data.into_iter().map(|d| d.total).collect())
                    .unwrap_or_default(),
            })
            .collect())
    }
}

#[async_trait]
impl Deallocator for ArmClient {
    async fn deallocate(&self, vm: &VirtualMachine) -> Result<(), CloudError> {
        let url = self.url(
            &Self::vm_path(vm, "deallocate"),
            &[("api-version", COMPUTE_API_VERSION)],
        )?;
        self.execute(self.http.post(url).body(Vec::new())).await?;
        Ok(())
    }
}
