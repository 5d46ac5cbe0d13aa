use crate::defaults;
use async_trait::async_trait;
use std::fmt;
use tokio_util::sync::CancellationToken;

/// Errors surfaced by a recognition session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The provider closed the exchange normally. A new session may be opened.
    StreamEnded,
    /// Network or provider failure.
    Transport(String),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::StreamEnded => write!(f, "recognition stream ended"),
            SessionError::Transport(msg) => write!(f, "recognition transport error: {}", msg),
        }
    }
}

impl std::error::Error for SessionError {}

/// End-of-utterance classifier sensitivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EouSensitivity {
    Default,
    High,
}

impl EouSensitivity {
    pub fn as_str(&self) -> &'static str {
        match self {
            EouSensitivity::Default => "DEFAULT",
            EouSensitivity::High => "HIGH",
        }
    }
}

/// Settings sent as the first message of every session.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionConfig {
    pub model: String,
    /// The only language the provider may detect.
    pub language: String,
    pub sample_rate: u32,
    pub channels: u32,
    pub eou_sensitivity: EouSensitivity,
    pub eou_max_pause_ms: u32,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            model: defaults::STT_MODEL.to_string(),
            language: defaults::STT_LANGUAGE.to_string(),
            sample_rate: defaults::SAMPLE_RATE,
            channels: 1,
            eou_sensitivity: EouSensitivity::High,
            eou_max_pause_ms: defaults::EOU_MAX_PAUSE_MS,
        }
    }
}

/// One bidirectional streaming exchange with a recognition provider.
///
/// Methods take `&self` so the audio send-loop and the event receive-loop
/// can drive the same session concurrently.
#[async_trait]
pub trait RecognitionSession: Send + Sync {
    /// Sends the session configuration. Must be called once, before any audio.
    async fn send_config(&self) -> Result<(), SessionError>;

    /// Forwards one chunk of raw PCM audio.
    async fn send(&self, chunk: &[u8]) -> Result<(), SessionError>;

    /// Waits for the next recognition event.
    ///
    /// Returns the finalized alternatives of a final event (trimmed, empty
    /// ones removed), or an empty list for partial and empty events.
    async fn recv(&self) -> Result<Vec<String>, SessionError>;

    /// Cancels the underlying exchange.
    async fn close(&self);
}

/// Opens recognition sessions.
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Opens a session. The session is torn down when `cancel` fires.
    async fn open(
        &self,
        cancel: CancellationToken,
    ) -> Result<Box<dyn RecognitionSession>, SessionError>;

    /// Name for logging.
    fn name(&self) -> &str {
        "recognizer"
    }
}

/// Trims alternatives and drops the empty ones.
pub fn final_alternatives<I, S>(alternatives: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    alternatives
        .into_iter()
        .filter_map(|alt| {
            let text = alt.as_ref().trim();
            (!text.is_empty()).then(|| text.to_string())
        })
        .collect()
}
