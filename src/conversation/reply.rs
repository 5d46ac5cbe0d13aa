use crate::conversation::BotIdentity;
use crate::conversation::prompt::{format_message, render_template};
use crate::conversation::state::StateSnapshot;
use crate::defaults;
use crate::error::{CohostError, Result};
use crate::llm::{CompletionRequest, LlmClient};
use crate::queue::Event;
use chrono::{DateTime, Local};
use std::sync::Arc;

const REPLY_TEMPLATE: &str = include_str!("templates/reply.txt");

/// Reply tier: writes the chat message.
pub struct ReplyAgent {
    llm: Arc<dyn LlmClient>,
    identity: BotIdentity,
    temperature: f32,
    max_tokens: u32,
    max_chars: usize,
}

impl ReplyAgent {
    pub fn new(llm: Arc<dyn LlmClient>, identity: BotIdentity) -> Self {
        Self {
            llm,
            identity,
            temperature: defaults::REPLY_TEMPERATURE,
            max_tokens: defaults::REPLY_MAX_TOKENS,
            max_chars: defaults::MAX_REPLY_CHARS,
        }
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn identity(&self) -> &BotIdentity {
        &self.identity
    }

    pub fn render_prompt(
        &self,
        event: &Event,
        snapshot: &StateSnapshot,
        wall: &DateTime<Local>,
    ) -> String {
        let last_message = format_message(wall, &event.username, &event.text);
        render_template(
            REPLY_TEMPLATE,
            &[
                ("last_message", last_message.as_str()),
                ("channel", self.identity.channel.as_str()),
                ("username", self.identity.username.as_str()),
                ("chat_history", snapshot.history.as_str()),
                ("summary", snapshot.summary.as_str()),
                ("facts", snapshot.facts.as_str()),
            ],
        )
    }

    /// Generates a reply to `event`.
    ///
    /// Replies longer than the chat limit are rejected, not truncated.
    pub async fn reply(
        &self,
        event: &Event,
        snapshot: &StateSnapshot,
        wall: &DateTime<Local>,
    ) -> Result<String> {
        let request = CompletionRequest::new(self.render_prompt(event, snapshot, wall))
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);

        let text = self.llm.complete(request).await?;
        validate_reply(text.trim(), self.max_chars).map(str::to_string)
    }
}

/// Checks a reply against the chat length limit.
pub fn validate_reply(text: &str, max_chars: usize) -> Result<&str> {
    if text.is_empty() {
        return Err(CohostError::Validation {
            message: "reply is empty".to_string(),
        });
    }

    let chars = text.chars().count();
    if chars > max_chars {
        return Err(CohostError::Validation {
            message: format!("reply is too long ({} > {})", chars, max_chars),
        });
    }
    Ok(text)
}
