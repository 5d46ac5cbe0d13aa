use crate::defaults;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Why a transcription run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationCause {
    /// The decode process could not be started.
    Spawn(String),
    /// The decode process exited or its output broke.
    Decoder(String),
    /// A recognition session failed with something other than a normal end.
    Stream(String),
    /// The chat source stopped.
    Chat(String),
    /// Cancelled from outside.
    Shutdown,
}

impl TerminationCause {
    pub fn is_shutdown(&self) -> bool {
        matches!(self, TerminationCause::Shutdown)
    }
}

impl fmt::Display for TerminationCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationCause::Spawn(msg) => write!(f, "decoder spawn failed: {}", msg),
            TerminationCause::Decoder(msg) => write!(f, "decoder stopped: {}", msg),
            TerminationCause::Stream(msg) => write!(f, "recognition failed: {}", msg),
            TerminationCause::Chat(msg) => write!(f, "chat stopped: {}", msg),
            TerminationCause::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// Shared state of one transcription run.
///
/// Holds the run's cancellation token and the cause it was cancelled with.
/// The first recorded cause is kept; later ones are ignored. Recognized
/// phrases flow through a bounded queue owned by the context.
pub struct TranscriptionContext {
    token: CancellationToken,
    cause: OnceLock<TerminationCause>,
    phrases_tx: mpsc::Sender<String>,
    phrases_rx: Mutex<Option<mpsc::Receiver<String>>>,
}

impl TranscriptionContext {
    /// Creates a context cancelled together with `parent`.
    pub fn new(parent: &CancellationToken) -> Arc<Self> {
        Self::with_phrase_capacity(parent, defaults::PHRASE_QUEUE_CAPACITY)
    }

    pub fn with_phrase_capacity(parent: &CancellationToken, capacity: usize) -> Arc<Self> {
        let (phrases_tx, phrases_rx) = mpsc::channel(capacity.max(1));
        Arc::new(Self {
            token: parent.child_token(),
            cause: OnceLock::new(),
            phrases_tx,
            phrases_rx: Mutex::new(Some(phrases_rx)),
        })
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Token for one session attempt; fires when the run is cancelled.
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Cancels the run. Returns true if `cause` became the run's cause.
    pub fn cancel(&self, cause: TerminationCause) -> bool {
        if self.token.is_cancelled() {
            // Cancelled through the parent without a cause.
            self.cause.get_or_init(|| TerminationCause::Shutdown);
        }
        let recorded = self.cause.set(cause).is_ok();
        self.token.cancel();
        recorded
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// The run's cause, once cancelled.
    ///
    /// A run cancelled through its parent token without an explicit cause
    /// reports [`TerminationCause::Shutdown`].
    pub fn cause(&self) -> Option<TerminationCause> {
        if let Some(cause) = self.cause.get() {
            return Some(cause.clone());
        }
        if self.token.is_cancelled() {
            return Some(self.cause.get_or_init(|| TerminationCause::Shutdown).clone());
        }
        None
    }

    /// Takes the phrase receiver. Only the first call gets it.
    pub fn take_phrases(&self) -> Option<mpsc::Receiver<String>> {
        self.phrases_rx.lock().ok().and_then(|mut rx| rx.take())
    }

    /// Queues a phrase, waiting for room. Returns false if the run was
    /// cancelled or the receiver is gone.
    pub async fn send_phrase(&self, phrase: String) -> bool {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => false,
            result = self.phrases_tx.send(phrase) => result.is_ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_cause_wins() {
        let parent = CancellationToken::new();
        let ctx = TranscriptionContext::new(&parent);

        assert!(ctx.cancel(TerminationCause::Stream("reset".to_string())));
        assert!(!ctx.cancel(TerminationCause::Decoder("exit 1".to_string())));

        assert!(ctx.is_cancelled());
        assert_eq!(
            ctx.cause(),
            Some(TerminationCause::Stream("reset".to_string()))
        );
        assert!(!parent.is_cancelled());
    }

    #[test]
    fn test_parent_cancel_is_shutdown() {
        let parent = CancellationToken::new();
        let ctx = TranscriptionContext::new(&parent);
        assert_eq!(ctx.cause(), None);

        parent.cancel();
        assert!(ctx.is_cancelled());
        assert_eq!(ctx.cause(), Some(TerminationCause::Shutdown));

        // Too late: the shutdown cause is already fixed.
        assert!(!ctx.cancel(TerminationCause::Chat("gone".to_string())));
        assert_eq!(ctx.cause(), Some(TerminationCause::Shutdown));
    }

    #[test]
    fn test_cause_after_parent_cancel_is_ignored() {
        let parent = CancellationToken::new();
        let ctx = TranscriptionContext::new(&parent);

        parent.cancel();
        assert!(!ctx.cancel(TerminationCause::Chat("late".to_string())));
        assert_eq!(ctx.cause(), Some(TerminationCause::Shutdown));
    }

    #[test]
    fn test_child_tokens_follow_run() {
        let ctx = TranscriptionContext::new(&CancellationToken::new());
        let child = ctx.child_token();
        child.cancel();
        assert!(!ctx.is_cancelled());

        let child = ctx.child_token();
        ctx.cancel(TerminationCause::Shutdown);
        assert!(child.is_cancelled());
    }

    #[tokio::test]
    async fn test_phrases_flow_until_cancel() {
        let ctx = TranscriptionContext::new(&CancellationToken::new());
        let mut rx = ctx.take_phrases().unwrap();
        assert!(ctx.take_phrases().is_none());

        assert!(ctx.send_phrase("привет".to_string()).await);
        assert_eq!(rx.recv().await.as_deref(), Some("привет"));

        ctx.cancel(TerminationCause::Shutdown);
        assert!(!ctx.send_phrase("late".to_string()).await);
    }

    #[tokio::test]
    async fn test_full_phrase_queue_unblocks_on_cancel() {
        let ctx = TranscriptionContext::with_phrase_capacity(&CancellationToken::new(), 1);
        let _rx = ctx.take_phrases().unwrap();
        assert!(ctx.send_phrase("one".to_string()).await);

        let waiter = {
            let ctx = ctx.clone();
            tokio::spawn(async move { ctx.send_phrase("two".to_string()).await })
        };
        ctx.cancel(TerminationCause::Shutdown);
        assert!(!waiter.await.unwrap());
    }

    #[test]
    fn test_cause_display() {
        assert_eq!(
            TerminationCause::Spawn("not found".to_string()).to_string(),
            "decoder spawn failed: not found"
        );
        assert_eq!(TerminationCause::Shutdown.to_string(), "shutdown");
    }
}
