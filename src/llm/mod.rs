//! Language model access.
//!
//! Agents talk to an [`LlmClient`]; the shipped implementation speaks the
//! OpenAI-compatible chat-completions protocol.

pub mod mock;
pub mod openai;

pub use mock::MockLlmClient;
pub use openai::OpenAiClient;

use crate::error::Result;
use async_trait::async_trait;

/// One single-turn completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Sent as the only user message.
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Asks the provider for a JSON object response.
    pub json_response: bool,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            temperature: 1.0,
            max_tokens: 500,
            json_response: false,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_json_response(mut self) -> Self {
        self.json_response = true;
        self
    }
}

/// A chat-completion backend.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Returns the trimmed text content of the first choice.
    async fn complete(&self, request: CompletionRequest) -> Result<String>;

    /// Model name for logging.
    fn model(&self) -> &str;
}

/// Strips Markdown code fences and a leading `json` language tag.
pub fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim().trim_matches('`').trim();
    trimmed.strip_prefix("json").unwrap_or(trimmed).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_fenced_json() {
        let content = "```json\n{\"need_response\": true}\n```";
        assert_eq!(strip_code_fence(content), "{\"need_response\": true}");
    }

    #[test]
    fn test_strip_plain_json_unchanged() {
        assert_eq!(strip_code_fence("  {\"a\": 1}\n"), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_bare_fence() {
        assert_eq!(strip_code_fence("```\n{}\n```"), "{}");
    }

    #[test]
    fn test_request_builder() {
        let request = CompletionRequest::new("hi")
            .with_temperature(0.2)
            .with_max_tokens(1000)
            .with_json_response();
        assert_eq!(request.prompt, "hi");
        assert_eq!(request.temperature, 0.2);
        assert_eq!(request.max_tokens, 1000);
        assert!(request.json_response);
    }
}
