//! HTTP client for the running agent's endpoints

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use url::Url;

pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid agent URL")?;

        Ok(Self { client, base_url })
    }

    /// GET and decode a JSON body; any non-2xx status is an error
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let (status, body) = self.get_with_status(path).await?;
        if !status.is_success() {
            anyhow::bail!("Agent returned {}: {}", status, body);
        }
        serde_json::from_str(&body).context("Failed to parse response")
    }

    /// GET a JSON body that is meaningful on 503 as well
    pub async fn get_probe<T: DeserializeOwned>(&self, path: &str) -> Result<(StatusCode, T)> {
        let (status, body) = self.get_with_status(path).await?;
        if !status.is_success() && status != StatusCode::SERVICE_UNAVAILABLE {
            anyhow::bail!("Agent returned {}: {}", status, body);
        }
        let decoded = serde_json::from_str(&body).context("Failed to parse response")?;
        Ok((status, decoded))
    }

    async fn get_with_status(&self, path: &str) -> Result<(StatusCode, String)> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to reach agent")?;

        let status = response.status();
        let body = response.text().await.context("Failed to read response")?;
        Ok((status, body))
    }
}

// Agent response views. Non-finite statistics arrive as `null`.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickReportView {
    pub tick: String,
    pub subscriptions_scanned: usize,
    pub vms_skipped: usize,
    pub outcomes: Vec<OutcomeView>,
    #[serde(default)]
    pub subscription_failures: Vec<SubscriptionFailureView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum OutcomeView {
    Evaluated(EvaluationView),
    Failed {
        resource_id: String,
        error_kind: String,
        error: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationView {
    pub resource_id: String,
    pub instance_status: String,
    pub action: String,
    pub inactivity_threshold_minutes: u64,
    pub post_warning_threshold_minutes: u64,
    pub warning_email_to: Option<String>,
    pub metrics: Option<MetricsView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsView {
    pub percentage_cpu: SeriesView,
    pub network_out: SeriesView,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesView {
    pub mean: Option<f64>,
    pub stdev: Option<f64>,
    pub max_allowed_stdev: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionFailureView {
    pub subscription_id: String,
    pub error: String,
}
