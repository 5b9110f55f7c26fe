//! Offline checks of tag blobs and activity samples
//!
//! These run the same parsing and statistics the agent uses, without
//! touching the cloud, so an operator can see what a tag will do before
//! setting it.

use anyhow::{Context, Result};
use autostop_lib::metrics::{MetricsAggregate, SeriesSummary};
use autostop_lib::models::TagSet;
use autostop_lib::policy::{collect_params, is_opted_in, PolicyDefaults, VmPolicy};
use colored::Colorize;
use serde::Serialize;
use tabled::Tabled;

use crate::output::{color_status, format_samples, format_stat, print_json, print_table, print_warning, OutputFormat};

#[derive(Debug, Serialize)]
struct TagCheck {
    opted_in: bool,
    params: std::collections::BTreeMap<String, String>,
    policy: VmPolicy,
    errors: Vec<String>,
}

#[derive(Tabled)]
struct PolicyRow {
    #[tabled(rename = "Setting")]
    setting: String,
    #[tabled(rename = "Value")]
    value: String,
}

#[derive(Tabled)]
struct SeriesRow {
    #[tabled(rename = "Series")]
    series: String,
    #[tabled(rename = "Mean")]
    mean: String,
    #[tabled(rename = "Stdev")]
    stdev: String,
    #[tabled(rename = "Stdev %")]
    stdev_pct: String,
    #[tabled(rename = "Max Allowed")]
    max_allowed: String,
    #[tabled(rename = "Quiescent")]
    quiescent: String,
}

impl SeriesRow {
    fn new(name: &str, summary: &SeriesSummary) -> Self {
        Self {
            series: name.to_string(),
            mean: format_stat(Some(summary.mean)),
            stdev: format_stat(Some(summary.stdev)),
            stdev_pct: format_stat(Some(summary.stdev_pct)),
            max_allowed: format_stat(Some(summary.max_allowed_stdev)),
            quiescent: if summary.is_quiescent() { "yes" } else { "no" }.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct StatsCheck {
    verdict: &'static str,
    percentage_cpu: SeriesOutput,
    network_out: SeriesOutput,
}

#[derive(Debug, Serialize)]
struct SeriesOutput {
    samples: Vec<Option<f64>>,
    mean: Option<f64>,
    stdev: Option<f64>,
    stdev_pct: Option<f64>,
    max_allowed_stdev: Option<f64>,
    quiescent: bool,
}

impl From<&SeriesSummary> for SeriesOutput {
    fn from(summary: &SeriesSummary) -> Self {
        let finite = |v: f64| v.is_finite().then_some(v);
        Self {
            samples: summary.samples.clone(),
            mean: finite(summary.mean),
            stdev: finite(summary.stdev),
            stdev_pct: finite(summary.stdev_pct),
            max_allowed_stdev: finite(summary.max_allowed_stdev),
            quiescent: summary.is_quiescent(),
        }
    }
}

fn tag_set(parameter_tag: &str, blob: Option<&str>) -> TagSet {
    blob.map(|b| TagSet::from([(parameter_tag.to_string(), b.to_string())]))
        .unwrap_or_default()
}

/// Resolve the policy a VM would get from its own and its group's blob
pub fn check_tags(
    vm_blob: &str,
    group_blob: Option<&str>,
    parameter_tag: &str,
    format: OutputFormat,
) -> Result<()> {
    let vm_tags = tag_set(parameter_tag, Some(vm_blob));
    let group_tags = tag_set(parameter_tag, group_blob);

    let params = collect_params(&group_tags, &vm_tags, parameter_tag)
        .context("Parameter blob could not be parsed; the agent would skip this VM")?;
    let opted_in = is_opted_in(&params);
    let (policy, errors) = VmPolicy::resolve(&params, &PolicyDefaults::default());

    let check = TagCheck {
        opted_in,
        params,
        policy,
        errors: errors.iter().map(ToString::to_string).collect(),
    };

    match format {
        OutputFormat::Json => print_json(&check)?,
        OutputFormat::Table => {
            let eligibility = if check.opted_in { "eligible" } else { "not opted in" };
            println!("{} {}", "Auto-stop:".bold(), color_status(eligibility));
            println!();

            let p = &check.policy;
            let rows = vec![
                PolicyRow {
                    setting: "Inactivity window (min)".to_string(),
                    value: p.inactivity_threshold_minutes.to_string(),
                },
                PolicyRow {
                    setting: "Grace after warning (min)".to_string(),
                    value: p.post_warning_threshold_minutes.to_string(),
                },
                PolicyRow {
                    setting: "CPU stdev baseline %".to_string(),
                    value: p.cpu_stdev_baseline_pct.to_string(),
                },
                PolicyRow {
                    setting: "Network stdev baseline %".to_string(),
                    value: p.network_stdev_baseline_pct.to_string(),
                },
                PolicyRow {
                    setting: "Warning recipient".to_string(),
                    value: p
                        .warning_email_to
                        .clone()
                        .unwrap_or_else(|| "(agent default)".to_string()),
                },
            ];
            print_table(&rows);

            for error in &check.errors {
                print_warning(&format!("{} (default used)", error));
            }
        }
    }

    Ok(())
}

/// Parse `1.5,null,2` into samples; blank or `null` entries are missing data
pub fn parse_samples(raw: &str) -> Result<Vec<Option<f64>>> {
    raw.split(',')
        .map(str::trim)
        .map(|s| {
            if s.is_empty() || s.eq_ignore_ascii_case("null") {
                Ok(None)
            } else {
                s.parse::<f64>()
                    .map(Some)
                    .with_context(|| format!("Invalid sample '{}'", s))
            }
        })
        .collect()
}

/// Run the activity test over hand-supplied samples
pub fn check_stats(
    cpu: &str,
    network: &str,
    cpu_baseline_pct: f64,
    network_baseline_pct: f64,
    format: OutputFormat,
) -> Result<()> {
    let aggregate = MetricsAggregate::compute(
        parse_samples(cpu)?,
        parse_samples(network)?,
        cpu_baseline_pct,
        network_baseline_pct,
    )?;
    let verdict = if aggregate.is_inactive() { "inactive" } else { "active" };

    match format {
        OutputFormat::Json => print_json(&StatsCheck {
            verdict,
            percentage_cpu: (&aggregate.percentage_cpu).into(),
            network_out: (&aggregate.network_out).into(),
        })?,
        OutputFormat::Table => {
            println!("CPU samples:     {}", format_samples(&aggregate.percentage_cpu.samples));
            println!("Network samples: {}", format_samples(&aggregate.network_out.samples));
            println!();
            print_table(&[
                SeriesRow::new("Percentage CPU", &aggregate.percentage_cpu),
                SeriesRow::new("Network Out", &aggregate.network_out),
            ]);
            println!();
            println!(
                "{} {}",
                "Verdict:".bold(),
                color_status(&verdict.to_uppercase())
            );
        }
    }

    Ok(())
}
