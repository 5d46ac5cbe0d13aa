use crate::conversation::BotIdentity;
use crate::conversation::prompt::{format_message, format_time, last_reply_text, render_template};
use crate::conversation::state::StateSnapshot;
use crate::defaults;
use crate::error::{CohostError, Result};
use crate::llm::{CompletionRequest, LlmClient, strip_code_fence};
use crate::queue::Event;
use chrono::{DateTime, Local};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;

const DECISION_TEMPLATE: &str = include_str!("templates/decision.txt");

/// What the decision tier wants done after one event.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DecisionResult {
    /// Replacement summary, applied as is. Absent or `null` clears it.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub new_summary: String,
    #[serde(default)]
    pub add_facts: Vec<String>,
    /// 1-based positions from the fact listing in the prompt.
    #[serde(default)]
    pub remove_facts: Vec<i64>,
    #[serde(default)]
    pub need_response: bool,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl DecisionResult {
    /// Parses the model output, tolerating Markdown code fences.
    pub fn parse(content: &str) -> Result<Self> {
        serde_json::from_str(strip_code_fence(content)).map_err(|e| CohostError::Provider {
            message: format!("malformed decision response: {}", e),
        })
    }

    /// Converts the 1-based removal positions to 0-based indices.
    ///
    /// Positions below 1 reject the whole batch.
    pub fn removal_indices(&self) -> Result<Vec<usize>> {
        self.remove_facts
            .iter()
            .map(|&position| {
                usize::try_from(position)
                    .ok()
                    .and_then(|p| p.checked_sub(1))
                    .ok_or_else(|| CohostError::Validation {
                        message: format!("invalid fact position {}", position),
                    })
            })
            .collect()
    }
}

/// Decision tier: updates summary and facts, and gates replies.
pub struct DecisionAgent {
    llm: Arc<dyn LlmClient>,
    identity: BotIdentity,
    temperature: f32,
    max_tokens: u32,
}

impl DecisionAgent {
    pub fn new(llm: Arc<dyn LlmClient>, identity: BotIdentity) -> Self {
        Self {
            llm,
            identity,
            temperature: defaults::DECISION_TEMPERATURE,
            max_tokens: defaults::DECISION_MAX_TOKENS,
        }
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn render_prompt(
        &self,
        event: &Event,
        snapshot: &StateSnapshot,
        now: Instant,
        wall: &DateTime<Local>,
    ) -> String {
        let last_message = format_message(wall, &event.username, &event.text);
        let last_reply = last_reply_text(snapshot.last_reply_time, now);
        let now_text = format_time(Some(wall));

        render_template(
            DECISION_TEMPLATE,
            &[
                ("last_message", last_message.as_str()),
                ("last_reply", last_reply.as_str()),
                ("now", now_text.as_str()),
                ("channel", self.identity.channel.as_str()),
                ("username", self.identity.username.as_str()),
                ("chat_history", snapshot.history.as_str()),
                ("summary", snapshot.summary.as_str()),
                ("facts", snapshot.facts.as_str()),
            ],
        )
    }

    /// One decision call. Fails on transport errors and malformed JSON.
    pub async fn decide(
        &self,
        event: &Event,
        snapshot: &StateSnapshot,
        now: Instant,
        wall: &DateTime<Local>,
    ) -> Result<DecisionResult> {
        let prompt = self.render_prompt(event, snapshot, now, wall);
        let request = CompletionRequest::new(prompt)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens)
            .with_json_response();

        let content = self.llm.complete(request).await?;
        DecisionResult::parse(&content)
    }
}
