//! Warning notifications sent before a VM is stopped

mod sendgrid;

pub use sendgrid::{SendGridNotifier, DEFAULT_SENDGRID_ENDPOINT};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::NotifyError;
use crate::models::VirtualMachine;

/// Sends an HTML email to one or more recipients
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a message; `None` means use [`Notifier::default_recipient`]
    async fn send(
        &self,
        subject: &str,
        html_body: &str,
        recipient: Option<&str>,
    ) -> Result<(), NotifyError>;

    /// Recipient used when a VM does not override it
    fn default_recipient(&self) -> Option<&str>;
}

/// A rendered warning email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarningMessage {
    pub subject: String,
    pub html_body: String,
}

impl WarningMessage {
    pub fn new(vm: &VirtualMachine, tick: DateTime<Utc>, grace_minutes: u64) -> Self {
        Self {
            subject: format!(
                "VM Auto Stop Warning: {} - {}",
                tick.format("%Y-%m-%dT%H:%M:%SZ"),
                vm.name
            ),
            html_body: format!(
                "Virtual Machine - <strong>{}</strong> is inactive and will be stopped in {} mins",
                vm.id, grace_minutes
            ),
        }
    }
}

/// Split a comma-separated recipient list, dropping blanks
pub fn split_recipients(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
        .collect()
}
