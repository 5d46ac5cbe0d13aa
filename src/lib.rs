//! cohost - AI co-host for live streams
//!
//! Listens to a broadcast, transcribes the streamer's speech, merges it with
//! chat and lets a two-tier LLM pipeline decide when to chime in.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
pub mod chat;
#[cfg(feature = "cli")]
pub mod cli;
pub mod clock;
pub mod config;
pub mod conversation;
pub mod defaults;
pub mod engine;
pub mod error;
pub mod llm;
pub mod memory;
pub mod queue;
pub mod stt;
pub mod transcribe;

// Seams (source → process → sink)
pub use audio::AudioDecoder;
pub use chat::{ChatSink, ChatSource};
pub use llm::LlmClient;
pub use stt::{RecognitionSession, Recognizer};

// Core services
pub use conversation::ConversationOrchestrator;
pub use engine::Engine;
pub use memory::FactStore;
pub use queue::{Event, EventQueue};
pub use transcribe::{TerminationCause, TranscriptionSupervisor};

// Error handling
pub use error::{CohostError, Result};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
