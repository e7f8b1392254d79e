use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Serialize;

use super::{BaseEmailService, EmailMessage};

const EMAIL_API_URL: &str = "https://api.resend.com/emails";

/// Transactional email over a REST API.
pub struct HttpEmailService {
    api_key: String,
    from: String,
    endpoint: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    text: &'a str,
}

impl HttpEmailService {
    pub fn new(api_key: String, from: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key,
            from,
            endpoint: EMAIL_API_URL.to_string(),
            client,
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl BaseEmailService for HttpEmailService {
    async fn send(&self, message: EmailMessage) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&SendRequest {
                from: &self.from,
                to: [&message.to],
                subject: &message.subject,
                text: &message.text,
            })
            .send()
            .await
            .context("Failed to send email request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("email API returned {}: {}", status, body);
        }

        tracing::debug!(to = %message.to, subject = %message.subject, "email sent");
        Ok(())
    }
}

/// Used when no email provider is configured.
pub struct DisabledEmailService;

#[async_trait]
impl BaseEmailService for DisabledEmailService {
    async fn send(&self, message: EmailMessage) -> Result<()> {
        tracing::debug!(to = %message.to, subject = %message.subject, "email disabled, skipping");
        Ok(())
    }
}
