//! Component health and readiness for the agent's probe endpoints
//!
//! The scheduler updates components after every tick. The agent reports ready
//! once a first tick has finished, whatever its outcome.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Ordered from best to worst so the overall status is the maximum
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Working, but some calls failed on the last tick
    Degraded,
    Unhealthy,
}

impl fmt::Display for ComponentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentStatus::Healthy => write!(f, "healthy"),
            ComponentStatus::Degraded => write!(f, "degraded"),
            ComponentStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Parts of the agent that report health
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    /// The tick loop itself
    Scheduler,
    /// Resource Manager and metrics calls
    CloudApi,
    /// Warning email delivery
    Notifier,
}

impl Component {
    pub const ALL: [Component; 3] = [Component::Scheduler, Component::CloudApi, Component::Notifier];

    pub fn name(&self) -> &'static str {
        match self {
            Component::Scheduler => "scheduler",
            Component::CloudApi => "cloud_api",
            Component::Notifier => "notifier",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub checked_at: DateTime<Utc>,
}

/// Body of `/healthz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub last_tick: Option<DateTime<Utc>>,
    pub components: BTreeMap<String, ComponentHealth>,
}

/// Body of `/readyz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug)]
struct Snapshot {
    components: BTreeMap<String, ComponentHealth>,
    last_tick: Option<DateTime<Utc>>,
}

/// Shared, cloneable health registry, starting with every component healthy
#[derive(Debug, Clone)]
pub struct HealthRegistry {
    inner: Arc<RwLock<Snapshot>>,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    pub fn new() -> Self {
        let now = Utc::now();
        let components = Component::ALL
            .iter()
            .map(|c| {
                let health = ComponentHealth {
                    status: ComponentStatus::Healthy,
                    message: None,
                    checked_at: now,
                };
                (c.name().to_string(), health)
            })
            .collect();

        Self {
            inner: Arc::new(RwLock::new(Snapshot {
                components,
                last_tick: None,
            })),
        }
    }

    pub async fn mark(&self, component: Component, status: ComponentStatus, message: Option<String>) {
        let health = ComponentHealth {
            status,
            message,
            checked_at: Utc::now(),
        };
        self.inner
            .write()
            .await
            .components
            .insert(component.name().to_string(), health);
    }

    pub async fn mark_healthy(&self, component: Component) {
        self.mark(component, ComponentStatus::Healthy, None).await;
    }

    pub async fn mark_degraded(&self, component: Component, message: impl Into<String>) {
        self.mark(component, ComponentStatus::Degraded, Some(message.into()))
            .await;
    }

    pub async fn mark_unhealthy(&self, component: Component, message: impl Into<String>) {
        self.mark(component, ComponentStatus::Unhealthy, Some(message.into()))
            .await;
    }

    /// Record that a tick finished; the first call makes the agent ready
    pub async fn record_tick(&self, tick: DateTime<Utc>) {
        self.inner.write().await.last_tick = Some(tick);
    }

    pub async fn health(&self) -> HealthResponse {
        let snapshot = self.inner.read().await;
        let status = snapshot
            .components
            .values()
            .map(|c| c.status)
            .max()
            .unwrap_or(ComponentStatus::Healthy);

        HealthResponse {
            status,
            last_tick: snapshot.last_tick,
            components: snapshot.components.clone(),
        }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        let health = self.health().await;

        let reason = match (health.last_tick, health.status) {
            (None, _) => Some("no tick has completed yet"),
            (Some(_), ComponentStatus::Unhealthy) => Some("a component is unhealthy"),
            _ => None,
        };

        ReadinessResponse {
            ready: reason.is_none(),
            reason: reason.map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_registry_lists_every_component() {
        let health = HealthRegistry::new().health().await;

        assert_eq!(health.status, ComponentStatus::Healthy);
        assert!(health.last_tick.is_none());
        for component in Component::ALL {
            assert_eq!(health.components[component.name()].status, ComponentStatus::Healthy);
        }
    }

    #[tokio::test]
    async fn test_worst_component_sets_overall_status() {
        let registry = HealthRegistry::new();
        registry
            .mark_degraded(Component::Notifier, "1 warning email failed")
            .await;
        assert_eq!(registry.health().await.status, ComponentStatus::Degraded);

        registry
            .mark_unhealthy(Component::CloudApi, "subscription listing failed")
            .await;
        assert_eq!(registry.health().await.status, ComponentStatus::Unhealthy);

        registry.mark_healthy(Component::CloudApi).await;
        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Degraded);
        assert!(health.components["cloud_api"].message.is_none());
    }

    #[tokio::test]
    async fn test_readiness_waits_for_first_tick() {
        let registry = HealthRegistry::new();
        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(readiness.reason.as_deref(), Some("no tick has completed yet"));

        registry.record_tick(Utc::now()).await;
        let readiness = registry.readiness().await;
        assert!(readiness.ready);
        assert!(readiness.reason.is_none());
    }

    #[tokio::test]
    async fn test_degraded_agent_stays_ready() {
        let registry = HealthRegistry::new();
        registry.record_tick(Utc::now()).await;
        registry.mark_degraded(Component::CloudApi, "2 VM evaluation(s) failed").await;

        assert!(registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_unhealthy_component_blocks_readiness() {
        let registry = HealthRegistry::new();
        registry.record_tick(Utc::now()).await;
        registry.mark_unhealthy(Component::Scheduler, "tick failed").await;

        assert!(!registry.readiness().await.ready);
    }

    #[test]
    fn test_response_decodes_without_last_tick() {
        let body = r#"{"status":"degraded","last_tick":null,"components":{}}"#;
        let health: HealthResponse = serde_json::from_str(body).unwrap();
        assert_eq!(health.status, ComponentStatus::Degraded);
    }
}
