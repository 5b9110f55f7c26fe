//! SendGrid v3 mail-send adapter

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use tracing::debug;
use url::Url;

use super::{async_trait, split_recipients, Notifier};
use crate::error::NotifyError;

pub const DEFAULT_SENDGRID_ENDPOINT: &str = "https://api.sendgrid.com";

#[derive(Debug, Serialize)]
struct MailSend<'a> {
    personalizations: Vec<Personalization<'a>>,
    from: Address<'a>,
    subject: &'a str,
    content: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Personalization<'a> {
    to: Vec<Address<'a>>,
}

#[derive(Debug, Serialize)]
struct Address<'a> {
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(rename = "type")]
    content_type: &'a str,
    value: &'a str,
}

/// Sends warning emails through the SendGrid HTTP API
pub struct SendGridNotifier {
    http: Client,
    send_url: Url,
    api_key: String,
    from: String,
    default_to: Option<String>,
}

impl SendGridNotifier {
    pub fn new(
        endpoint: &str,
        api_key: impl Into<String>,
        from: impl Into<String>,
        default_to: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self, NotifyError> {
        let http = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| NotifyError::Transport(format!("failed to create HTTP client: {e}")))?;

        let send_url = Url::parse(endpoint)
            .and_then(|base| base.join("/v3/mail/send"))
            .map_err(|e| NotifyError::Transport(format!("invalid endpoint {endpoint}: {e}")))?;

        Ok(Self {
            http,
            send_url,
            api_key: api_key.into(),
            from: from.into(),
            default_to: default_to.filter(|to| !to.trim().is_empty()),
        })
    }
}

#[async_trait]
impl Notifier for SendGridNotifier {
    async fn send(
        &self,
        subject: &str,
        html_body: &str,
        recipient: Option<&str>,
    ) -> Result<(), NotifyError> {
        let raw = recipient
            .or(self.default_to.as_deref())
            .ok_or(NotifyError::NoRecipient)?;
        let recipients = split_recipients(raw);
        if recipients.is_empty() {
            return Err(NotifyError::NoRecipient);
        }

        let body = MailSend {
            personalizations: vec![Personalization {
                to: recipients.iter().map(|email| Address { email }).collect(),
            }],
            from: Address { email: &self.from },
            subject,
            content: vec![Content {
                content_type: "text/html",
                value: html_body,
            }],
        };

        let response = self
            .http
            .post(self.send_url.clone())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        debug!(recipients = recipients.len(), subject, "Warning email accepted");
        Ok(())
    }

    fn default_recipient(&self) -> Option<&str> {
        self.default_to.as_deref()
    }
}
