// TestDependencies - mock implementations for testing
//
// Provides mock collaborators that can be injected into ServerDeps for tests.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;

use super::jobs::JobQueue;
use super::store::Store;
use super::{
    AiError, BaseAI, BaseEmailService, BaseProfileScraper, CompletionOptions, EmailMessage,
    ScrapeError, ServerDeps,
};
use crate::domains::audits::models::ScrapedProfile;

// =============================================================================
// Mock Profile Scraper
// =============================================================================

pub struct MockScraper {
    responses: Arc<Mutex<Vec<std::result::Result<ScrapedProfile, ScrapeError>>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockScraper {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue a successful scrape
    pub fn with_profile(self, profile: ScrapedProfile) -> Self {
        self.responses.lock().unwrap().push(Ok(profile));
        self
    }

    /// Queue a failed scrape
    pub fn with_error(self, error: ScrapeError) -> Self {
        self.responses.lock().unwrap().push(Err(error));
        self
    }

    /// Queue a profile after construction (for handles shared with ServerDeps)
    pub fn push_profile(&self, profile: ScrapedProfile) {
        self.responses.lock().unwrap().push(Ok(profile));
    }

    pub fn push_error(&self, error: ScrapeError) {
        self.responses.lock().unwrap().push(Err(error));
    }

    /// Get all URLs that were scraped
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Default for MockScraper {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseProfileScraper for MockScraper {
    async fn scrape(&self, profile_url: &str) -> std::result::Result<ScrapedProfile, ScrapeError> {
        self.calls.lock().unwrap().push(profile_url.to_string());

        let mut responses = self.responses.lock().unwrap();
        if !responses.is_empty() {
            responses.remove(0)
        } else {
            Ok(ScrapedProfile {
                salon_name: Some("Mock Salon".to_string()),
                ..Default::default()
            })
        }
    }
}

// =============================================================================
// Mock AI
// =============================================================================

#[derive(Debug, Clone)]
pub struct AiCall {
    pub prompt: String,
    pub options: CompletionOptions,
}

pub struct MockAI {
    responses: Arc<Mutex<Vec<std::result::Result<String, AiError>>>>,
    calls: Arc<Mutex<Vec<AiCall>>>,
}

impl MockAI {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Add a text response to the queue
    pub fn with_response(self, response: impl Into<String>) -> Self {
        self.push_response(response);
        self
    }

    /// Add a JSON response to the queue (will be serialized)
    pub fn with_json_response<T: serde::Serialize>(self, data: &T) -> Self {
        let json = serde_json::to_string(data).expect("Failed to serialize mock response");
        self.push_response(json);
        self
    }

    pub fn with_error(self, error: AiError) -> Self {
        self.push_error(error);
        self
    }

    pub fn push_response(&self, response: impl Into<String>) {
        self.responses.lock().unwrap().push(Ok(response.into()));
    }

    pub fn push_error(&self, error: AiError) {
        self.responses.lock().unwrap().push(Err(error));
    }

    pub fn calls(&self) -> Vec<AiCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Get the last prompt sent to the AI
    pub fn last_prompt(&self) -> Option<String> {
        self.calls.lock().unwrap().last().map(|c| c.prompt.clone())
    }

    /// Check if a prompt containing the given text was sent
    pub fn was_called_with(&self, text: &str) -> bool {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .any(|c| c.prompt.contains(text))
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Default for MockAI {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseAI for MockAI {
    async fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> std::result::Result<String, AiError> {
        self.calls.lock().unwrap().push(AiCall {
            prompt: prompt.to_string(),
            options: options.clone(),
        });

        let mut responses = self.responses.lock().unwrap();
        if !responses.is_empty() {
            responses.remove(0)
        } else {
            Ok("{}".to_string())
        }
    }
}

// =============================================================================
// Mock Email Service
// =============================================================================

pub struct MockEmailService {
    sent: Arc<Mutex<Vec<EmailMessage>>>,
    failing: bool,
}

impl MockEmailService {
    pub fn new() -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            failing: false,
        }
    }

    /// Every send fails (after being recorded).
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::new()
        }
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn was_sent_with_subject(&self, subject: &str) -> bool {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .any(|m| m.subject.contains(subject))
    }
}

impl Default for MockEmailService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseEmailService for MockEmailService {
    async fn send(&self, message: EmailMessage) -> Result<()> {
        self.sent.lock().unwrap().push(message);
        if self.failing {
            anyhow::bail!("mock email provider is down");
        }
        Ok(())
    }
}

// =============================================================================
// TestDependencies - Builder for test dependencies
// =============================================================================

#[derive(Clone)]
pub struct TestDependencies {
    pub scraper: Arc<MockScraper>,
    pub ai: Arc<MockAI>,
    pub email: Arc<MockEmailService>,
}

impl TestDependencies {
    pub fn new() -> Self {
        Self {
            scraper: Arc::new(MockScraper::new()),
            ai: Arc::new(MockAI::new()),
            email: Arc::new(MockEmailService::new()),
        }
    }

    /// Set a mock scraper
    pub fn mock_scraper(mut self, scraper: MockScraper) -> Self {
        self.scraper = Arc::new(scraper);
        self
    }

    /// Set a mock AI
    pub fn mock_ai(mut self, ai: MockAI) -> Self {
        self.ai = Arc::new(ai);
        self
    }

    /// Set a mock email service
    pub fn mock_email(mut self, email: MockEmailService) -> Self {
        self.email = Arc::new(email);
        self
    }

    /// Convert into ServerDeps for testing. The mocks stay reachable through
    /// `self` for assertions.
    pub fn into_deps(&self, store: Arc<dyn Store>, jobs: Arc<dyn JobQueue>) -> Arc<ServerDeps> {
        Arc::new(ServerDeps::new(
            store,
            jobs,
            self.ai.clone(),
            self.scraper.clone(),
            self.email.clone(),
            "https://app.test",
        ))
    }
}

impl Default for TestDependencies {
    fn default() -> Self {
        Self::new()
    }
}
