//! VM auto-stop agent
//!
//! Periodically scans every visible subscription for opted-in virtual
//! machines, warns owners about idle ones and deallocates them once the grace
//! period has passed.

use std::sync::Arc;

use anyhow::Result;
use autostop_lib::{
    cloud::{ArmClient, CloudCapabilities},
    health::HealthRegistry,
    notify::SendGridNotifier,
    observability::{AutostopMetrics, StructuredLogger},
    policy::PolicyEvaluator,
    Orchestrator, TickLoop,
};
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting vm-autostop");

    let config = config::AgentConfig::load()?;
    info!(
        instance = %config.instance_name,
        arm_endpoint = %config.arm_endpoint,
        parameter_tag = %config.parameter_tag,
        "Agent configured"
    );

    let health_registry = HealthRegistry::new();
    let metrics = AutostopMetrics::new();
    let logger = StructuredLogger::new(&config.instance_name);
    logger.log_startup(AGENT_VERSION, config.tick_interval_secs, config.run_once);

    let arm = Arc::new(ArmClient::new(
        &config.arm_endpoint,
        config.credential()?,
        config.request_timeout(),
    )?);
    let notifier = Arc::new(SendGridNotifier::new(
        &config.sendgrid_endpoint,
        config.sendgrid_api_key.clone().unwrap_or_default(),
        config.warning_email_from.clone().unwrap_or_default(),
        config.warning_email_to.clone(),
        config.request_timeout(),
    )?);

    let cloud = CloudCapabilities::from_client(arm);
    let evaluator = Arc::new(PolicyEvaluator::new(
        cloud.status.clone(),
        cloud.metrics.clone(),
        cloud.deallocator.clone(),
        notifier,
    ));
    let orchestrator = Arc::new(Orchestrator::new(
        cloud,
        evaluator,
        config.orchestrator_config(),
        logger.clone(),
    ));

    let tick_loop = TickLoop::new(
        orchestrator,
        config.tick_loop_config(),
        health_registry.clone(),
        metrics.clone(),
        logger.clone(),
    );

    let app_state = Arc::new(api::AppState {
        health_registry,
        metrics,
        report: tick_loop.report_slot(),
    });
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let loop_handle = tokio::spawn(tick_loop.run(shutdown_rx));

    let reason = if config.run_once {
        loop_handle.await?;
        "single tick complete"
    } else {
        tokio::signal::ctrl_c().await?;
        let _ = shutdown_tx.send(());
        loop_handle.await?;
        "SIGINT received"
    };

    logger.log_shutdown(reason);
    api_handle.abort();

    Ok(())
}
