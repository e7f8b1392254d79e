// AI implementation using the OpenAI chat completions client
//
// This is the infrastructure implementation of BaseAI.
// Business logic (what to prompt for) lives in domain layers.

use std::sync::OnceLock;

use async_trait::async_trait;
use openai_client::{ChatRequest, Message, OpenAIClient, OpenAIError};
use regex::Regex;
use serde::de::DeserializeOwned;

use super::{AiError, BaseAI, CompletionOptions};

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// OpenAI implementation of [`BaseAI`].
#[derive(Clone)]
pub struct OpenAiAdapter {
    client: OpenAIClient,
    default_model: String,
}

impl OpenAiAdapter {
    pub fn new(client: OpenAIClient, default_model: impl Into<String>) -> Self {
        Self {
            client,
            default_model: default_model.into(),
        }
    }

    fn request(&self, prompt: &str, options: &CompletionOptions) -> ChatRequest {
        let model = options.model.as_deref().unwrap_or(&self.default_model);
        let mut request = ChatRequest::new(model);
        if let Some(system) = &options.system {
            request = request.message(Message::system(system.clone()));
        }
        request = request
            .message(Message::user(prompt))
            .temperature(options.temperature)
            .token_budget(options.max_tokens);
        if options.json {
            request = request.json_object();
        }
        request
    }
}

fn code_fence() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)^\s*```[a-zA-Z]*\s*(.*?)\s*```\s*$").expect("valid fence regex")
    })
}

/// Parse a model's JSON answer, tolerating a surrounding markdown code fence.
pub fn parse_model_json<T: DeserializeOwned>(text: &str) -> Result<T, AiError> {
    let body = code_fence()
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or_else(|| text.trim());

    serde_json::from_str(body).map_err(|e| {
        AiError::MalformedOutput(format!("model output is not the expected JSON: {}", e))
    })
}

impl From<OpenAIError> for AiError {
    fn from(err: OpenAIError) -> Self {
        match err {
            OpenAIError::RateLimited(message) => AiError::RateLimited(message),
            OpenAIError::Overloaded { status, message } => {
                AiError::Overloaded(format!("HTTP {}: {}", status, message))
            }
            OpenAIError::Timeout => AiError::Timeout,
            OpenAIError::Network(message) => AiError::Network(message),
            OpenAIError::Parse(message) => AiError::MalformedOutput(message),
            OpenAIError::Config(message) => AiError::Rejected(message),
            OpenAIError::Api { status, message } => {
                AiError::Rejected(format!("HTTP {}: {}", status, message))
            }
        }
    }
}

#[async_trait]
impl BaseAI for OpenAiAdapter {
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String, AiError> {
        let request = self.request(prompt, options);
        let model = request.model.clone();

        tracing::debug!(
            prompt_length = prompt.len(),
            model = %model,
            temperature = options.temperature,
            max_tokens = options.max_tokens,
            "calling OpenAI"
        );

        let response = self.client.chat_completion(request).await.map_err(|e| {
            tracing::warn!(error = %e, model = %model, "OpenAI call failed");
            AiError::from(e)
        })?;

        if response.is_truncated() {
            return Err(AiError::MalformedOutput(format!(
                "response truncated at {} tokens",
                options.max_tokens
            )));
        }

        tracing::debug!(
            response_length = response.content.len(),
            total_tokens = response.usage.as_ref().map(|u| u.total_tokens),
            "OpenAI call succeeded"
        );

        Ok(response.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::ErrorClass;

    #[test]
    fn test_provider_errors_keep_their_class() {
        let overloaded: AiError = OpenAIError::from_status(529, "busy".into()).into();
        assert_eq!(overloaded.class(), ErrorClass::Transient);

        let rejected: AiError = OpenAIError::from_status(400, "bad".into()).into();
        assert_eq!(rejected.class(), ErrorClass::Permanent);

        let unparseable: AiError = OpenAIError::Parse("eof".into()).into();
        assert!(matches!(unparseable, AiError::MalformedOutput(_)));
    }

    #[test]
    fn test_parse_model_json_strips_fence() {
        let fenced = "```json\n{\"a\": 1}\n```";
        let value: serde_json::Value = parse_model_json(fenced).unwrap();
        assert_eq!(value["a"], 1);

        let bare: serde_json::Value = parse_model_json("  {\"a\": 2} ").unwrap();
        assert_eq!(bare["a"], 2);

        let err = parse_model_json::<serde_json::Value>("Sorry, I cannot help").unwrap_err();
        assert!(matches!(err, AiError::MalformedOutput(_)));
    }

    #[test]
    fn test_request_uses_override_model() {
        let adapter = OpenAiAdapter::new(OpenAIClient::new("key"), DEFAULT_MODEL);
        let options = CompletionOptions {
            model: Some("gpt-4o".into()),
            ..Default::default()
        };
        assert_eq!(adapter.request("hi", &options).model, "gpt-4o");
        assert_eq!(
            adapter.request("hi", &CompletionOptions::default()).model,
            DEFAULT_MODEL
        );
    }
}
