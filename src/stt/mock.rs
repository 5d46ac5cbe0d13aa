//! Scripted recognizer for tests.

use crate::stt::session::{RecognitionSession, Recognizer, SessionError, final_alternatives};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// What one scripted session does, in order.
#[derive(Debug, Clone, Default)]
pub struct SessionScript {
    open_error: Option<SessionError>,
    events: Vec<Result<Vec<String>, SessionError>>,
    event_delay: Duration,
}

impl SessionScript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emits one final event carrying `alternatives`.
    pub fn phrases(mut self, alternatives: &[&str]) -> Self {
        self.events.push(Ok(final_alternatives(alternatives)));
        self
    }

    /// Emits a partial (empty) event.
    pub fn partial(mut self) -> Self {
        self.events.push(Ok(Vec::new()));
        self
    }

    /// Ends the exchange normally.
    pub fn end(mut self) -> Self {
        self.events.push(Err(SessionError::StreamEnded));
        self
    }

    /// Fails with a transport error.
    pub fn fail(mut self, message: &str) -> Self {
        self.events.push(Err(SessionError::Transport(message.to_string())));
        self
    }

    /// Makes `open()` itself fail.
    pub fn refuse(mut self, error: SessionError) -> Self {
        self.open_error = Some(error);
        self
    }

    /// Waits before each event.
    pub fn with_event_delay(mut self, delay: Duration) -> Self {
        self.event_delay = delay;
        self
    }
}

#[derive(Debug, Default)]
struct Counters {
    opens: AtomicUsize,
    bytes_sent: AtomicUsize,
    audio_before_config: AtomicUsize,
}

/// Recognizer that plays back [`SessionScript`]s, one per `open()`.
///
/// Once the scripts run out, further sessions emit nothing and stay open
/// until cancelled.
#[derive(Debug, Clone, Default)]
pub struct ScriptedRecognizer {
    scripts: Arc<Mutex<VecDeque<SessionScript>>>,
    counters: Arc<Counters>,
}

impl ScriptedRecognizer {
    pub fn new(scripts: Vec<SessionScript>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts.into())),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Number of `open()` calls so far.
    pub fn opens(&self) -> usize {
        self.counters.opens.load(Ordering::SeqCst)
    }

    /// Audio bytes forwarded across all sessions.
    pub fn bytes_sent(&self) -> usize {
        self.counters.bytes_sent.load(Ordering::SeqCst)
    }

    /// Audio chunks sent before the session configuration.
    pub fn audio_before_config(&self) -> usize {
        self.counters.audio_before_config.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Recognizer for ScriptedRecognizer {
    async fn open(
        &self,
        cancel: CancellationToken,
    ) -> Result<Box<dyn RecognitionSession>, SessionError> {
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        let script = self.scripts.lock().await.pop_front().unwrap_or_default();

        if let Some(error) = script.open_error {
            return Err(error);
        }

        Ok(Box::new(ScriptedSession {
            events: Mutex::new(script.events.into()),
            event_delay: script.event_delay,
            config_sent: AtomicBool::new(false),
            counters: self.counters.clone(),
            cancel,
        }))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

struct ScriptedSession {
    events: Mutex<VecDeque<Result<Vec<String>, SessionError>>>,
    event_delay: Duration,
    config_sent: AtomicBool,
    counters: Arc<Counters>,
    cancel: CancellationToken,
}

#[async_trait]
impl RecognitionSession for ScriptedSession {
    async fn send_config(&self) -> Result<(), SessionError> {
        self.config_sent.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&self, chunk: &[u8]) -> Result<(), SessionError> {
        if self.cancel.is_cancelled() {
            return Err(SessionError::Transport("session closed".to_string()));
        }
        if !self.config_sent.load(Ordering::SeqCst) {
            self.counters
                .audio_before_config
                .fetch_add(1, Ordering::SeqCst);
        }
        self.counters
            .bytes_sent
            .fetch_add(chunk.len(), Ordering::SeqCst);
        Ok(())
    }

    async fn recv(&self) -> Result<Vec<String>, SessionError> {
        if !self.event_delay.is_zero() {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    return Err(SessionError::Transport("session closed".to_string()));
                }
                _ = tokio::time::sleep(self.event_delay) => {}
            }
        }

        let next = self.events.lock().await.pop_front();
        match next {
            Some(event) => event,
            None => {
                self.cancel.cancelled().await;
                Err(SessionError::Transport("session closed".to_string()))
            }
        }
    }

    async fn close(&self) {
        self.cancel.cancel();
    }
}
