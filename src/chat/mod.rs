//! Chat boundary.
//!
//! A [`ChatSource`] delivers viewer messages to a [`ChatListener`]; a
//! [`ChatSink`] posts the bot's replies.

pub mod sink;
pub mod source;

pub use sink::{CollectorSink, LogSink, StdoutSink};
pub use source::{LineChatSource, SilentChatSource};

use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// One message from the stream chat.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChatMessage {
    pub username: String,
    pub text: String,
    pub message_id: String,
    /// Protocol-specific metadata (badges, colors, ...).
    pub tags: HashMap<String, String>,
}

impl ChatMessage {
    pub fn new(username: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = message_id.into();
        self
    }
}

/// Receives chat messages as they arrive. Must not block.
pub trait ChatListener: Send + Sync {
    fn on_message(&self, message: ChatMessage);
}

impl<F> ChatListener for F
where
    F: Fn(ChatMessage) + Send + Sync,
{
    fn on_message(&self, message: ChatMessage) {
        self(message)
    }
}

/// Source of incoming chat messages.
#[async_trait]
pub trait ChatSource: Send + Sync {
    /// Delivers messages until `cancel` fires or the source fails.
    ///
    /// Returning before cancellation means the chat connection is gone.
    async fn run(&self, listener: &dyn ChatListener, cancel: CancellationToken) -> Result<()>;

    fn name(&self) -> &str {
        "chat"
    }
}

/// Destination for the bot's replies.
#[async_trait]
pub trait ChatSink: Send + Sync {
    async fn send(&self, text: &str) -> Result<()>;

    fn name(&self) -> &str {
        "sink"
    }
}
