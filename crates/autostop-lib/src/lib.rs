//! Core library for the VM auto-stop agent
//!
//! This crate provides:
//! - Tag-driven auto-stop policy and the per-VM decision engine
//! - Activity statistics over CPU and network-out metrics
//! - Azure Resource Manager and SendGrid clients behind capability traits
//! - The tick orchestrator, scheduler, health checks and observability

pub mod cloud;
pub mod error;
pub mod health;
pub mod metrics;
pub mod models;
pub mod notify;
pub mod observability;
pub mod orchestrator;
pub mod policy;
pub mod scheduler;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use health::{
    Component, ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{AutostopMetrics, StructuredLogger};
pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use scheduler::{ReportSlot, TickLoop, TickLoopConfig};
