//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

pub fn print_table<T: Tabled>(items: &[T]) {
    if items.is_empty() {
        println!("{}", "No items found".yellow());
        return;
    }
    println!("{}", Table::new(items).with(Style::rounded()));
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Render a statistic; `None` and non-finite values print as infinity
pub fn format_stat(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{:.3}", v),
        _ => "∞".to_string(),
    }
}

pub fn format_samples(samples: &[Option<f64>]) -> String {
    samples
        .iter()
        .map(|s| match s {
            Some(v) => format!("{}", v),
            None => "null".to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Last segment of an ARM resource id
pub fn short_resource_name(resource_id: &str) -> &str {
    resource_id.rsplit('/').next().unwrap_or(resource_id)
}

pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "healthy" | "none" | "active" | "eligible" => status.green().to_string(),
        "degraded" | "warning-sent" | "inactive" => status.yellow().to_string(),
        "unhealthy" | "warning-failed" | "failed" | "stopping" => status.red().to_string(),
        _ => status.to_string(),
    }
}
