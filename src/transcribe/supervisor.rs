//! Transcription supervisor.
//!
//! Owns one run: starts the decoder, then opens recognition sessions over
//! its output one after another. A session that ends normally is replaced
//! by a fresh one on the same audio; any other failure, or the decoder
//! exiting, terminates the run.
//!
//! ```text
//! Init ──spawn──▶ Connecting ──open──▶ Streaming ──stream ended──▶ Reconnecting
//!   │                                     │    ▲                       │
//!   │                                     │    └───────────────────────┘
//!   └──────────────▶ Terminated(cause) ◀──┘ (error, decoder exit, cancel)
//! ```

use crate::audio::{AudioDecoder, DecodedAudio};
use crate::defaults;
use crate::stt::{RecognitionSession, Recognizer, SessionError};
use crate::transcribe::context::{TerminationCause, TranscriptionContext};
use log::{debug, info, warn};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;

/// Supervisor lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Init,
    Connecting,
    Streaming,
    Reconnecting,
    Terminated,
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SupervisorState::Init => "init",
            SupervisorState::Connecting => "connecting",
            SupervisorState::Streaming => "streaming",
            SupervisorState::Reconnecting => "reconnecting",
            SupervisorState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Result of one recognition session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The provider ended the stream normally; open a new session.
    Retryable,
    /// The run must stop.
    Fatal(TerminationCause),
}

impl SessionOutcome {
    pub fn from_error(error: &SessionError) -> Self {
        match error {
            SessionError::StreamEnded => SessionOutcome::Retryable,
            SessionError::Transport(msg) => {
                SessionOutcome::Fatal(TerminationCause::Stream(msg.clone()))
            }
        }
    }
}

/// Failure inside a session's send or receive loop.
#[derive(Debug)]
enum LoopError {
    Session(SessionError),
    Audio(String),
}

impl From<SessionError> for LoopError {
    fn from(error: SessionError) -> Self {
        LoopError::Session(error)
    }
}

/// Drives the decoder and recognition sessions of one run.
pub struct TranscriptionSupervisor {
    decoder: Arc<dyn AudioDecoder>,
    recognizer: Arc<dyn Recognizer>,
    state: RwLock<SupervisorState>,
    reconnects: AtomicU64,
}

impl TranscriptionSupervisor {
    pub fn new(decoder: Arc<dyn AudioDecoder>, recognizer: Arc<dyn Recognizer>) -> Self {
        Self {
            decoder,
            recognizer,
            state: RwLock::new(SupervisorState::Init),
            reconnects: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
            .read()
            .map(|state| *state)
            .unwrap_or(SupervisorState::Terminated)
    }

    /// Sessions replaced after a normal stream end.
    pub fn reconnects(&self) -> u64 {
        self.reconnects.load(Ordering::SeqCst)
    }

    fn set_state(&self, next: SupervisorState) {
        if let Ok(mut state) = self.state.write()
            && *state != next
        {
            debug!("Transcription state {} -> {}", *state, next);
            *state = next;
        }
    }

    /// Runs until the run terminates and returns its cause.
    ///
    /// The cause is also recorded on `ctx`, which is cancelled on return.
    pub async fn run(&self, ctx: Arc<TranscriptionContext>, url: &str) -> TerminationCause {
        self.set_state(SupervisorState::Init);

        let DecodedAudio { mut stream, exit } = match self.decoder.spawn(url) {
            Ok(audio) => audio,
            Err(e) => {
                warn!("Decoder failed to start: {}", e);
                return self.terminate(&ctx, TerminationCause::Spawn(e.to_string()));
            }
        };
        info!("Transcription started url={}", url);

        let cause = tokio::select! {
            biased;
            _ = ctx.cancelled() => TerminationCause::Shutdown,
            status = exit => TerminationCause::Decoder(status.to_string()),
            cause = self.run_sessions(&ctx, stream.as_mut()) => cause,
        };

        // Dropping the exit future above kills the decoder.
        self.terminate(&ctx, cause)
    }

    fn terminate(&self, ctx: &TranscriptionContext, cause: TerminationCause) -> TerminationCause {
        ctx.cancel(cause);
        self.set_state(SupervisorState::Terminated);
        let cause = ctx.cause().unwrap_or(TerminationCause::Shutdown);
        info!(
            "Transcription terminated cause={} reconnects={}",
            cause,
            self.reconnects()
        );
        cause
    }

    async fn run_sessions(
        &self,
        ctx: &TranscriptionContext,
        stream: &mut (dyn AsyncRead + Send + Unpin),
    ) -> TerminationCause {
        loop {
            self.set_state(SupervisorState::Connecting);
            match self.run_session(ctx, stream).await {
                SessionOutcome::Retryable => {
                    let count = self.reconnects.fetch_add(1, Ordering::SeqCst) + 1;
                    self.set_state(SupervisorState::Reconnecting);
                    info!("Recognition stream ended, reconnecting reconnects={}", count);
                }
                SessionOutcome::Fatal(cause) => return cause,
            }
        }
    }

    async fn run_session(
        &self,
        ctx: &TranscriptionContext,
        stream: &mut (dyn AsyncRead + Send + Unpin),
    ) -> SessionOutcome {
        let token = ctx.child_token();
        let session = match self.recognizer.open(token.clone()).await {
            Ok(session) => session,
            Err(e) => {
                warn!("Failed to open {} session: {}", self.recognizer.name(), e);
                return SessionOutcome::from_error(&e);
            }
        };
        self.set_state(SupervisorState::Streaming);

        let result = tokio::try_join!(
            send_audio(session.as_ref(), stream, &token),
            receive_phrases(session.as_ref(), ctx),
        );

        token.cancel();
        session.close().await;

        if ctx.is_cancelled() {
            return SessionOutcome::Fatal(ctx.cause().unwrap_or(TerminationCause::Shutdown));
        }

        match result {
            Ok(_) => SessionOutcome::Retryable,
            Err(LoopError::Session(e)) => {
                if e != SessionError::StreamEnded {
                    warn!("Recognition session failed: {}", e);
                }
                SessionOutcome::from_error(&e)
            }
            Err(LoopError::Audio(msg)) => {
                warn!("Audio read failed: {}", msg);
                SessionOutcome::Fatal(TerminationCause::Decoder(msg))
            }
        }
    }
}

/// Sends the session config, then forwards audio until something fails.
async fn send_audio(
    session: &dyn RecognitionSession,
    stream: &mut (dyn AsyncRead + Send + Unpin),
    token: &CancellationToken,
) -> Result<(), LoopError> {
    session.send_config().await?;

    let mut buf = vec![0u8; defaults::AUDIO_CHUNK_BYTES];
    loop {
        let read = tokio::select! {
            _ = token.cancelled() => {
                return Err(SessionError::Transport("session cancelled".to_string()).into());
            }
            read = stream.read(&mut buf) => read,
        };

        match read {
            Ok(0) => return Err(LoopError::Audio("audio stream ended".to_string())),
            Ok(n) => session.send(&buf[..n]).await?,
            Err(e) => return Err(LoopError::Audio(e.to_string())),
        }
    }
}

/// Forwards finalized phrases to the run's phrase queue.
async fn receive_phrases(
    session: &dyn RecognitionSession,
    ctx: &TranscriptionContext,
) -> Result<(), LoopError> {
    loop {
        for phrase in session.recv().await? {
            debug!("Phrase recognized text={:?}", phrase);
            if !ctx.send_phrase(phrase).await {
                return Err(SessionError::Transport("run cancelled".to_string()).into());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{DecoderExit, MockDecoder};
    use crate::error::CohostError;
    use crate::stt::{ScriptedRecognizer, SessionScript};
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    async fn wait_for(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    fn supervisor(
        decoder: MockDecoder,
        recognizer: &ScriptedRecognizer,
    ) -> Arc<TranscriptionSupervisor> {
        Arc::new(TranscriptionSupervisor::new(
            Arc::new(decoder),
            Arc::new(recognizer.clone()),
        ))
    }

    #[test]
    fn test_outcome_classification() {
        assert_eq!(
            SessionOutcome::from_error(&SessionError::StreamEnded),
            SessionOutcome::Retryable
        );
        assert_eq!(
            SessionOutcome::from_error(&SessionError::Transport("reset".to_string())),
            SessionOutcome::Fatal(TerminationCause::Stream("reset".to_string()))
        );
    }

    #[tokio::test]
    async fn test_stream_end_reconnects_once() {
        let (decoder, _handle) = MockDecoder::new();
        let recognizer = ScriptedRecognizer::new(vec![
            SessionScript::new().phrases(&["привет всем"]).end(),
        ]);
        let sup = supervisor(decoder, &recognizer);
        let parent = CancellationToken::new();
        let ctx = TranscriptionContext::new(&parent);
        let mut phrases = ctx.take_phrases().unwrap();

        let run = {
            let sup = sup.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move { sup.run(ctx, "mock://").await })
        };

        assert_eq!(phrases.recv().await.as_deref(), Some("привет всем"));
        wait_for(|| recognizer.opens() == 2).await;
        wait_for(|| sup.state() == SupervisorState::Streaming).await;
        assert_eq!(sup.reconnects(), 1);
        assert!(!ctx.is_cancelled());

        parent.cancel();
        assert_eq!(run.await.unwrap(), TerminationCause::Shutdown);
        assert_eq!(sup.state(), SupervisorState::Terminated);
        assert_eq!(recognizer.opens(), 2);
    }

    #[tokio::test]
    async fn test_partial_events_forward_nothing() {
        let (decoder, _handle) = MockDecoder::new();
        let recognizer = ScriptedRecognizer::new(vec![
            SessionScript::new()
                .partial()
                .partial()
                .phrases(&["во что играем"])
                .with_event_delay(Duration::from_millis(5)),
        ]);
        let sup = supervisor(decoder, &recognizer);
        let parent = CancellationToken::new();
        let ctx = TranscriptionContext::new(&parent);
        let mut phrases = ctx.take_phrases().unwrap();

        let run = {
            let sup = sup.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move { sup.run(ctx, "mock://").await })
        };

        assert_eq!(phrases.recv().await.as_deref(), Some("во что играем"));
        assert!(phrases.try_recv().is_err());
        assert!(!ctx.is_cancelled());

        parent.cancel();
        assert_eq!(run.await.unwrap(), TerminationCause::Shutdown);
        assert_eq!(recognizer.opens(), 1);
    }

    #[tokio::test]
    async fn test_transport_error_terminates_run() {
        let (decoder, _handle) = MockDecoder::new();
        let recognizer =
            ScriptedRecognizer::new(vec![SessionScript::new().fail("connection reset")]);
        let sup = supervisor(decoder, &recognizer);
        let ctx = TranscriptionContext::new(&CancellationToken::new());

        let cause = sup.run(ctx.clone(), "mock://").await;

        assert_eq!(
            cause,
            TerminationCause::Stream("connection reset".to_string())
        );
        assert_eq!(ctx.cause(), Some(cause));
        assert_eq!(recognizer.opens(), 1);
        assert_eq!(sup.reconnects(), 0);
    }

    #[tokio::test]
    async fn test_refused_open_terminates_run() {
        let (decoder, _handle) = MockDecoder::new();
        let recognizer = ScriptedRecognizer::new(vec![
            SessionScript::new().refuse(SessionError::Transport("401 unauthorized".to_string())),
        ]);
        let sup = supervisor(decoder, &recognizer);
        let ctx = TranscriptionContext::new(&CancellationToken::new());

        let cause = sup.run(ctx, "mock://").await;
        assert_eq!(
            cause,
            TerminationCause::Stream("401 unauthorized".to_string())
        );
    }

    #[tokio::test]
    async fn test_spawn_failure_terminates_run() {
        let recognizer = ScriptedRecognizer::new(Vec::new());
        let sup = supervisor(MockDecoder::failing("ffmpeg not found"), &recognizer);
        let ctx = TranscriptionContext::new(&CancellationToken::new());

        let cause = sup.run(ctx.clone(), "mock://").await;

        assert!(matches!(cause, TerminationCause::Spawn(_)));
        assert!(ctx.is_cancelled());
        assert_eq!(recognizer.opens(), 0);
    }

    #[tokio::test]
    async fn test_decoder_exit_terminates_run() {
        let (decoder, handle) = MockDecoder::new();
        let recognizer = ScriptedRecognizer::new(Vec::new());
        let sup = supervisor(decoder, &recognizer);
        let ctx = TranscriptionContext::new(&CancellationToken::new());

        let run = {
            let sup = sup.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move { sup.run(ctx, "mock://").await })
        };

        wait_for(|| recognizer.opens() == 1).await;
        let _audio = handle.exit(DecoderExit::Status(Some(0)));

        let cause = run.await.unwrap();
        assert_eq!(
            cause,
            TerminationCause::Decoder("decoder exited with code 0".to_string())
        );
    }

    #[tokio::test]
    async fn test_audio_eof_terminates_run() {
        let (decoder, handle) = MockDecoder::new();
        let recognizer = ScriptedRecognizer::new(Vec::new());
        let sup = supervisor(decoder, &recognizer);
        let ctx = TranscriptionContext::new(&CancellationToken::new());

        drop(handle.audio);
        let cause = sup.run(ctx, "mock://").await;
        assert_eq!(
            cause,
            TerminationCause::Decoder("audio stream ended".to_string())
        );
    }

    #[tokio::test]
    async fn test_audio_is_forwarded_after_config() {
        let (decoder, mut handle) = MockDecoder::new();
        let recognizer = ScriptedRecognizer::new(Vec::new());
        let sup = supervisor(decoder, &recognizer);
        let parent = CancellationToken::new();
        let ctx = TranscriptionContext::new(&parent);

        let run = {
            let sup = sup.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move { sup.run(ctx, "mock://").await })
        };

        handle.audio.write_all(&vec![0u8; 10_000]).await.unwrap();
        wait_for(|| recognizer.bytes_sent() == 10_000).await;
        assert_eq!(recognizer.audio_before_config(), 0);

        parent.cancel();
        assert_eq!(run.await.unwrap(), TerminationCause::Shutdown);
    }

    #[tokio::test]
    async fn test_spawn_error_message_is_kept() {
        let recognizer = ScriptedRecognizer::new(Vec::new());
        let sup = supervisor(MockDecoder::failing("boom"), &recognizer);
        let ctx = TranscriptionContext::new(&CancellationToken::new());

        let cause = sup.run(ctx, "mock://").await;
        let expected = CohostError::Spawn {
            message: "boom".to_string(),
        }
        .to_string();
        assert_eq!(cause, TerminationCause::Spawn(expected));
    }
}
