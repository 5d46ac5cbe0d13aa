//! Default configuration constants for cohost.
//!
//! Shared by the config types and the components that fall back to them
//! when constructed without a config.

use std::time::Duration;

/// Sample rate of the PCM stream fed to the recognizer, in Hz.
pub const SAMPLE_RATE: u32 = 16000;

/// Size of one audio read forwarded to the recognition session.
pub const AUDIO_CHUNK_BYTES: usize = 4096;

/// Capacity of the per-run phrase queue.
pub const PHRASE_QUEUE_CAPACITY: usize = 32;

/// Capacity of the merged chat/phrase event queue.
pub const EVENT_QUEUE_CAPACITY: usize = 64;

/// Number of chat history records kept for prompts.
pub const HISTORY_SIZE: usize = 20;

/// Deadline for a single LLM call.
pub const LLM_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest reply (in characters) allowed into the chat.
pub const MAX_REPLY_CHARS: usize = 500;

/// Minimum time between two sent replies, in seconds.
pub const REPLY_COOLDOWN_SECS: u64 = 30;

/// Pause before a terminated run is restarted, in seconds.
pub const RESTART_BACKOFF_SECS: u64 = 5;

/// Decoder executable.
pub const FFMPEG_PROGRAM: &str = "ffmpeg";

/// Recognition language (single-entry whitelist).
pub const STT_LANGUAGE: &str = "ru-RU";

/// Recognition model name.
pub const STT_MODEL: &str = "general";

/// Longest pause between words before the classifier closes an utterance.
pub const EOU_MAX_PAUSE_MS: u32 = 500;

/// Decision tier sampling temperature (kept low for stable JSON).
pub const DECISION_TEMPERATURE: f32 = 0.2;

/// Decision tier completion budget.
pub const DECISION_MAX_TOKENS: u32 = 1000;

/// Reply tier sampling temperature.
pub const REPLY_TEMPERATURE: f32 = 1.0;

/// Reply tier completion budget.
pub const REPLY_MAX_TOKENS: u32 = 500;

/// Default OpenAI-compatible endpoint.
pub const LLM_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Default location of the fact file, relative to the working directory.
pub const FACTS_PATH: &str = "data/facts.json";
