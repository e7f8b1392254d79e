// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only. What to ask the model, what to do with
// a scraped profile and which emails to send are domain decisions.
//
// Naming convention: Base* for trait names (e.g., BaseAI, BaseProfileScraper)

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

use crate::domains::audits::models::ScrapedProfile;

/// Whether repeating a failed collaborator call later may succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transient,
    Permanent,
}

// =============================================================================
// Scraper Trait
// =============================================================================

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("Scraper timed out")]
    Timeout,

    #[error("Scraper unavailable: {0}")]
    Unavailable(String),

    #[error("Scraper rate limited")]
    RateLimited,

    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    #[error("Invalid profile URL: {0}")]
    InvalidUrl(String),

    #[error("Scraper returned an unreadable profile: {0}")]
    Malformed(String),
}

impl ScrapeError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ScrapeError::Timeout | ScrapeError::Unavailable(_) | ScrapeError::RateLimited => {
                ErrorClass::Transient
            }
            ScrapeError::ProfileNotFound(_)
            | ScrapeError::InvalidUrl(_)
            | ScrapeError::Malformed(_) => ErrorClass::Permanent,
        }
    }
}

#[async_trait]
pub trait BaseProfileScraper: Send + Sync {
    /// Fetch the categories and services of a public salon profile.
    async fn scrape(&self, profile_url: &str) -> std::result::Result<ScrapedProfile, ScrapeError>;
}

// =============================================================================
// AI Trait
// =============================================================================

#[derive(Debug, Error)]
pub enum AiError {
    #[error("Model rate limited: {0}")]
    RateLimited(String),

    #[error("Model overloaded: {0}")]
    Overloaded(String),

    #[error("Model request timed out")]
    Timeout,

    #[error("Model unreachable: {0}")]
    Network(String),

    /// The answer arrived but could not be used (bad JSON, wrong shape,
    /// wrong number of entries, truncated).
    #[error("Malformed model output: {0}")]
    MalformedOutput(String),

    /// The provider refused the request (bad request, auth, content policy).
    #[error("Model request rejected: {0}")]
    Rejected(String),
}

impl AiError {
    pub fn class(&self) -> ErrorClass {
        match self {
            AiError::RateLimited(_)
            | AiError::Overloaded(_)
            | AiError::Timeout
            | AiError::Network(_) => ErrorClass::Transient,
            AiError::MalformedOutput(_) | AiError::Rejected(_) => ErrorClass::Permanent,
        }
    }
}

/// Per-call sampling settings.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    /// Overrides the adapter's default model.
    pub model: Option<String>,
    pub system: Option<String>,
    /// Ask the provider for a JSON object response.
    pub json: bool,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: 0.4,
            max_tokens: 8000,
            model: None,
            system: None,
            json: true,
        }
    }
}

#[async_trait]
pub trait BaseAI: Send + Sync {
    /// Complete a prompt with an LLM (returns raw text response)
    async fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> std::result::Result<String, AiError>;
}

// =============================================================================
// Email Trait
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub text: String,
}

#[async_trait]
pub trait BaseEmailService: Send + Sync {
    async fn send(&self, message: EmailMessage) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scrape_error_classes() {
        assert_eq!(ScrapeError::Timeout.class(), ErrorClass::Transient);
        assert_eq!(ScrapeError::RateLimited.class(), ErrorClass::Transient);
        assert_eq!(
            ScrapeError::ProfileNotFound("x".into()).class(),
            ErrorClass::Permanent
        );
    }

    #[test]
    fn test_ai_error_classes() {
        assert_eq!(AiError::Overloaded("529".into()).class(), ErrorClass::Transient);
        assert_eq!(
            AiError::MalformedOutput("eof".into()).class(),
            ErrorClass::Permanent
        );
    }
}
