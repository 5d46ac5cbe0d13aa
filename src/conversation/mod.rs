//! Conversation pipeline: decision tier, reply tier and their shared state.

pub mod decision;
pub mod orchestrator;
pub mod prompt;
pub mod reply;
pub mod state;

pub use decision::{DecisionAgent, DecisionResult};
pub use orchestrator::{ConversationOrchestrator, EventOutcome};
pub use reply::ReplyAgent;
pub use state::{ChatHistory, ConversationState, SharedState, StateSnapshot};

/// Who the bot is and where it talks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotIdentity {
    /// Channel the bot co-hosts.
    pub channel: String,
    /// The bot's own chat name.
    pub username: String,
}

impl BotIdentity {
    pub fn new(channel: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            username: username.into(),
        }
    }
}
