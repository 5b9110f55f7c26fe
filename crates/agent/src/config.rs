//! Agent configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use autostop_lib::cloud::{ArmCredential, DEFAULT_ARM_ENDPOINT};
use autostop_lib::notify::DEFAULT_SENDGRID_ENDPOINT;
use autostop_lib::policy::{PolicyDefaults, DEFAULT_PARAMETER_TAG, DEFAULT_WARNING_TAG};
use autostop_lib::{OrchestratorConfig, TickLoopConfig};
use serde::Deserialize;

/// Prefix for environment overrides, e.g. `AUTOSTOP_TICK_INTERVAL_SECS`
const ENV_PREFIX: &str = "AUTOSTOP";

/// Optional config file, overlaid by the environment
const CONFIG_FILE_VAR: &str = "AUTOSTOP_CONFIG_FILE";

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Name attached to every structured event
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,

    /// Run a single tick and exit, for cron-style deployments
    #[serde(default)]
    pub run_once: bool,

    /// Port for health, metrics and report endpoints
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_evaluations: usize,

    /// Timeout applied to every outbound HTTP request
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_inactivity_threshold")]
    pub default_inactivity_threshold_minutes: u64,

    #[serde(default = "default_post_warning_threshold")]
    pub default_post_warning_threshold_minutes: u64,

    #[serde(default = "default_baseline_pct")]
    pub default_cpu_stdev_baseline_pct: f64,

    #[serde(default = "default_baseline_pct")]
    pub default_network_stdev_baseline_pct: f64,

    #[serde(default = "default_parameter_tag")]
    pub parameter_tag: String,

    #[serde(default = "default_warning_tag")]
    pub warning_tag: String,

    #[serde(default = "default_arm_endpoint")]
    pub arm_endpoint: String,

    #[serde(default)]
    pub arm_token: Option<String>,

    /// Token file kept fresh by an external refresher; wins over `arm_token`
    #[serde(default)]
    pub arm_token_file: Option<PathBuf>,

    #[serde(default)]
    pub sendgrid_api_key: Option<String>,

    #[serde(default = "default_sendgrid_endpoint")]
    pub sendgrid_endpoint: String,

    #[serde(default)]
    pub warning_email_from: Option<String>,

    /// Recipient for VMs that do not set `WARN_EMAIL_TO`
    #[serde(default)]
    pub warning_email_to: Option<String>,
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "vm-autostop".to_string())
}

fn default_tick_interval() -> u64 {
    300
}

fn default_api_port() -> u16 {
    8080
}

fn default_max_concurrent() -> usize {
    8
}

fn default_request_timeout() -> u64 {
    30
}

fn default_inactivity_threshold() -> u64 {
    60
}

fn default_post_warning_threshold() -> u64 {
    30
}

fn default_baseline_pct() -> f64 {
    10.0
}

fn default_parameter_tag() -> String {
    DEFAULT_PARAMETER_TAG.to_string()
}

fn default_warning_tag() -> String {
    DEFAULT_WARNING_TAG.to_string()
}

fn default_arm_endpoint() -> String {
    DEFAULT_ARM_ENDPOINT.to_string()
}

fn default_sendgrid_endpoint() -> String {
    DEFAULT_SENDGRID_ENDPOINT.to_string()
}

impl AgentConfig {
    /// Load from `AUTOSTOP_CONFIG_FILE` (if set) and `AUTOSTOP_*` variables
    pub fn load() -> Result<Self> {
        let file = std::env::var(CONFIG_FILE_VAR).ok().map(PathBuf::from);
        Self::from_sources(file.as_deref(), environment())
    }

    fn from_sources(file: Option<&Path>, env: config::Environment) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path));
        }

        let config: AgentConfig = builder
            .add_source(env)
            .build()
            .context("failed to read configuration")?
            .try_deserialize()
            .context("invalid configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the loop cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_secs == 0 {
            bail!("tick_interval_secs must be greater than zero");
        }
        if self.request_timeout_secs == 0 {
            bail!("request_timeout_secs must be greater than zero");
        }
        if self.max_concurrent_evaluations == 0 {
            bail!("max_concurrent_evaluations must be greater than zero");
        }
        if self.default_inactivity_threshold_minutes == 0 {
            bail!("default_inactivity_threshold_minutes must be greater than zero");
        }
        for (key, pct) in [
            ("default_cpu_stdev_baseline_pct", self.default_cpu_stdev_baseline_pct),
            ("default_network_stdev_baseline_pct", self.default_network_stdev_baseline_pct),
        ] {
            if !pct.is_finite() || pct < 0.0 {
                bail!("{key} must be a finite, non-negative percentage, got {pct}");
            }
        }
        if self.parameter_tag.trim().is_empty() || self.warning_tag.trim().is_empty() {
            bail!("parameter_tag and warning_tag must not be empty");
        }
        if self.parameter_tag == self.warning_tag {
            bail!("parameter_tag and warning_tag must differ");
        }
        if self.arm_token.is_none() && self.arm_token_file.is_none() {
            bail!("one of arm_token or arm_token_file is required");
        }
        if is_blank(&self.sendgrid_api_key) {
            bail!("sendgrid_api_key is required");
        }
        if is_blank(&self.warning_email_from) {
            bail!("warning_email_from is required");
        }
        Ok(())
    }

    pub fn credential(&self) -> Result<ArmCredential> {
        match (&self.arm_token_file, &self.arm_token) {
            (Some(path), _) => Ok(ArmCredential::TokenFile(path.clone())),
            (None, Some(token)) => Ok(ArmCredential::Static(token.clone())),
            (None, None) => bail!("no management API credential configured"),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            parameter_tag: self.parameter_tag.clone(),
            warning_tag: self.warning_tag.clone(),
            max_concurrent_evaluations: self.max_concurrent_evaluations,
            defaults: PolicyDefaults {
                inactivity_threshold_minutes: self.default_inactivity_threshold_minutes,
                post_warning_threshold_minutes: self.default_post_warning_threshold_minutes,
                cpu_stdev_baseline_pct: self.default_cpu_stdev_baseline_pct,
                network_stdev_baseline_pct: self.default_network_stdev_baseline_pct,
            },
        }
    }

    pub fn tick_loop_config(&self) -> TickLoopConfig {
        TickLoopConfig {
            interval: Duration::from_secs(self.tick_interval_secs),
            run_once: self.run_once,
        }
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX).try_parsing(true)
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}
