use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use url::Url;

use super::{BaseProfileScraper, ScrapeError};
use crate::domains::audits::models::ScrapedProfile;

/// Scraping runs headless browsers; a profile can take a while.
const SCRAPE_TIMEOUT: Duration = Duration::from_secs(120);

/// Client for the profile scraping service.
///
/// The service takes a public profile URL and answers with the salon's
/// categories and services as JSON.
pub struct HttpProfileScraper {
    endpoint: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ScrapeRequest<'a> {
    url: &'a str,
}

impl HttpProfileScraper {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(SCRAPE_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            endpoint: endpoint.into(),
            api_key,
            client,
        })
    }
}

/// Accepts absolute http(s) URLs with a host.
pub fn validate_profile_url(profile_url: &str) -> Result<Url, ScrapeError> {
    let url = Url::parse(profile_url.trim())
        .map_err(|e| ScrapeError::InvalidUrl(format!("{}: {}", profile_url, e)))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(ScrapeError::InvalidUrl(profile_url.to_string()));
    }
    Ok(url)
}

fn classify_status(status: reqwest::StatusCode, body: String) -> ScrapeError {
    match status.as_u16() {
        404 | 410 => ScrapeError::ProfileNotFound(body),
        400 | 422 => ScrapeError::InvalidUrl(body),
        429 => ScrapeError::RateLimited,
        408 | 504 => ScrapeError::Timeout,
        _ => ScrapeError::Unavailable(format!("HTTP {}: {}", status, body)),
    }
}

#[async_trait]
impl BaseProfileScraper for HttpProfileScraper {
    async fn scrape(&self, profile_url: &str) -> Result<ScrapedProfile, ScrapeError> {
        let url = validate_profile_url(profile_url)?;

        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&ScrapeRequest { url: url.as_str() });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ScrapeError::Timeout
            } else {
                ScrapeError::Unavailable(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, url = %url, "scraper returned an error");
            return Err(classify_status(status, body));
        }

        let profile: ScrapedProfile = response
            .json()
            .await
            .map_err(|e| ScrapeError::Malformed(e.to_string()))?;

        tracing::debug!(
            url = %url,
            categories = profile.categories.len(),
            services = profile.services_count(),
            "profile scraped"
        );

        Ok(profile)
    }
}
