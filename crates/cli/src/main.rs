//! VM auto-stop CLI
//!
//! Checks policy tags and activity samples offline, and inspects a running
//! agent's health and last tick report.

mod client;
mod commands;
mod output;

use anyhow::Result;
use autostop_lib::policy::DEFAULT_PARAMETER_TAG;
use clap::{Parser, Subcommand};
use commands::{agent, policy};

/// VM auto-stop CLI
#[derive(Parser)]
#[command(name = "vmstop")]
#[command(author, version, about = "CLI for the VM auto-stop agent", long_about = None)]
pub struct Cli {
    /// Agent API URL (can also be set via VMSTOP_AGENT_URL env var)
    #[arg(long, env = "VMSTOP_AGENT_URL", default_value = "http://localhost:8080")]
    pub agent_url: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve the policy a VM would get from its parameter tags
    Tags {
        /// Parameter blob set on the VM, e.g. "AUTO_STOP=Y;INACTIVITY_TH_MIN=90"
        #[arg(long)]
        vm_tags: String,

        /// Parameter blob set on the VM's resource group
        #[arg(long)]
        group_tags: Option<String>,

        /// Tag name holding the blob
        #[arg(long, default_value = DEFAULT_PARAMETER_TAG)]
        parameter_tag: String,
    },

    /// Apply the inactivity test to comma-separated samples ("null" for gaps)
    Stats {
        /// Percentage CPU samples
        #[arg(long)]
        cpu: String,

        /// Network Out samples
        #[arg(long)]
        network: String,

        #[arg(long, default_value_t = 10.0)]
        cpu_baseline_pct: f64,

        #[arg(long, default_value_t = 10.0)]
        network_baseline_pct: f64,
    },

    /// Show the agent's last tick report
    Report,

    /// Show the agent's component health
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Tags {
            vm_tags,
            group_tags,
            parameter_tag,
        } => {
            policy::check_tags(&vm_tags, group_tags.as_deref(), &parameter_tag, cli.format)?;
        }
        Commands::Stats {
            cpu,
            network,
            cpu_baseline_pct,
            network_baseline_pct,
        } => {
            policy::check_stats(&cpu, &network, cpu_baseline_pct, network_baseline_pct, cli.format)?;
        }
        Commands::Report => {
            let client = client::ApiClient::new(&cli.agent_url)?;
            agent::show_report(&client, cli.format).await?;
        }
        Commands::Health => {
            let client = client::ApiClient::new(&cli.agent_url)?;
            agent::show_health(&client, cli.format).await?;
        }
    }

    Ok(())
}
