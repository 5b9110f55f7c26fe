//! Commands that query a running agent

use anyhow::Result;
use autostop_lib::HealthResponse;
use colored::Colorize;
use reqwest::StatusCode;
use tabled::Tabled;

use crate::client::{ApiClient, OutcomeView, TickReportView};
use crate::output::{
    color_status, format_stat, print_info, print_json, print_success, print_table, print_warning,
    short_resource_name, OutputFormat,
};

#[derive(Tabled)]
struct OutcomeRow {
    #[tabled(rename = "VM")]
    vm: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "CPU Stdev")]
    cpu_stdev: String,
    #[tabled(rename = "Net Stdev")]
    network_stdev: String,
}

impl From<&OutcomeView> for OutcomeRow {
    fn from(outcome: &OutcomeView) -> Self {
        match outcome {
            OutcomeView::Evaluated(result) => {
                let (cpu, net) = match &result.metrics {
                    Some(m) => (
                        format!(
                            "{} / {}",
                            format_stat(m.percentage_cpu.stdev),
                            format_stat(m.percentage_cpu.max_allowed_stdev)
                        ),
                        format!(
                            "{} / {}",
                            format_stat(m.network_out.stdev),
                            format_stat(m.network_out.max_allowed_stdev)
                        ),
                    ),
                    None => ("-".to_string(), "-".to_string()),
                };
                Self {
                    vm: short_resource_name(&result.resource_id).to_string(),
                    status: result.instance_status.clone(),
                    action: color_status(&result.action),
                    cpu_stdev: cpu,
                    network_stdev: net,
                }
            }
            OutcomeView::Failed {
                resource_id,
                error_kind,
                ..
            } => Self {
                vm: short_resource_name(resource_id).to_string(),
                status: "-".to_string(),
                action: color_status("failed") + &format!(" ({})", error_kind),
                cpu_stdev: "-".to_string(),
                network_stdev: "-".to_string(),
            },
        }
    }
}

#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
}

/// Show the last tick report
pub async fn show_report(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let report: TickReportView = client.get("report").await?;

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => {
            println!("{} {}", "Tick:".bold(), report.tick.cyan());
            println!(
                "Subscriptions scanned: {}   VMs skipped: {}",
                report.subscriptions_scanned, report.vms_skipped
            );
            println!();

            let rows: Vec<OutcomeRow> = report.outcomes.iter().map(OutcomeRow::from).collect();
            print_table(&rows);

            for outcome in &report.outcomes {
                if let OutcomeView::Failed {
                    resource_id, error, ..
                } = outcome
                {
                    print_warning(&format!("{}: {}", short_resource_name(resource_id), error));
                }
            }
            for failure in &report.subscription_failures {
                print_warning(&format!(
                    "subscription {} not scanned: {}",
                    failure.subscription_id, failure.error
                ));
            }
        }
    }

    Ok(())
}

/// Show agent health; a 503 still carries the component breakdown
pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let (status, health): (StatusCode, HealthResponse) = client.get_probe("healthz").await?;

    match format {
        OutputFormat::Json => print_json(&health)?,
        OutputFormat::Table => {
            if status.is_success() {
                print_success(&format!("Agent is {}", color_status(&health.status.to_string())));
            } else {
                print_warning(&format!("Agent is {}", color_status(&health.status.to_string())));
            }
            match &health.last_tick {
                Some(tick) => print_info(&format!("Last tick: {}", tick.to_rfc3339())),
                None => print_info("No tick has completed yet"),
            }
            println!();

            let rows: Vec<ComponentRow> = health
                .components
                .iter()
                .map(|(name, c)| ComponentRow {
                    name: name.clone(),
                    status: color_status(&c.status.to_string()),
                    message: c.message.clone().unwrap_or_default(),
                })
                .collect();
            print_table(&rows);
        }
    }

    if !status.is_success() {
        anyhow::bail!("agent reported {}", health.status);
    }

    Ok(())
}
