use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

use crate::kernel::jobs::JobRunnerConfig;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub openai_api_key: String,
    pub openai_model: String,
    pub scraper_url: String,
    pub scraper_api_key: Option<String>,
    /// Email is disabled unless both key and sender are set.
    pub email_api_key: Option<String>,
    pub email_from: Option<String>,
    pub app_base_url: String,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub purchase_secret: String,
    pub worker_batch_size: i64,
    pub worker_poll_interval: Duration,
    pub embedded_worker: bool,
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            openai_api_key: env::var("OPENAI_API_KEY").context("OPENAI_API_KEY must be set")?,
            openai_model: optional("OPENAI_MODEL")
                .unwrap_or_else(|| crate::kernel::DEFAULT_MODEL.to_string()),
            scraper_url: env::var("SCRAPER_URL").context("SCRAPER_URL must be set")?,
            scraper_api_key: optional("SCRAPER_API_KEY"),
            email_api_key: optional("EMAIL_API_KEY"),
            email_from: optional("EMAIL_FROM"),
            app_base_url: optional("APP_BASE_URL")
                .unwrap_or_else(|| "http://localhost:3000".to_string()),
            jwt_secret: env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            jwt_issuer: env::var("JWT_ISSUER").context("JWT_ISSUER must be set")?,
            purchase_secret: env::var("PURCHASE_SECRET").context("PURCHASE_SECRET must be set")?,
            worker_batch_size: env::var("WORKER_BATCH_SIZE")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("WORKER_BATCH_SIZE must be a valid number")?,
            worker_poll_interval: Duration::from_millis(
                env::var("WORKER_POLL_INTERVAL_MS")
                    .unwrap_or_else(|_| "1000".to_string())
                    .parse()
                    .context("WORKER_POLL_INTERVAL_MS must be a valid number")?,
            ),
            embedded_worker: env::var("EMBEDDED_WORKER")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .context("EMBEDDED_WORKER must be true or false")?,
        })
    }

    /// Runner settings for a worker named `role` plus a random suffix.
    pub fn runner_config(&self, role: &str) -> JobRunnerConfig {
        JobRunnerConfig {
            batch_size: self.worker_batch_size,
            poll_interval: self.worker_poll_interval,
            worker_id: format!("{}-{}", role, uuid::Uuid::new_v4()),
            ..JobRunnerConfig::default()
        }
    }

    /// Sender settings when email delivery is configured.
    pub fn email(&self) -> Option<(&str, &str)> {
        match (&self.email_api_key, &self.email_from) {
            (Some(key), Some(from)) => Some((key.as_str(), from.as_str())),
            _ => None,
        }
    }
}
