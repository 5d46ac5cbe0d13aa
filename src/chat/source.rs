use crate::chat::{ChatListener, ChatMessage, ChatSource};
use crate::error::{CohostError, Result};
use async_trait::async_trait;
use log::{debug, info};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Username used for lines without a `name:` prefix.
pub const DEFAULT_USERNAME: &str = "viewer";

/// Reads chat messages from lines of text, `name: message` or just `message`.
///
/// Reaching the end of input is not an error: the source stays idle until
/// cancelled.
pub struct LineChatSource<R> {
    lines: Mutex<Lines<R>>,
    next_id: AtomicU64,
}

impl<R: AsyncBufRead + Unpin + Send> LineChatSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: Mutex::new(reader.lines()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl LineChatSource<BufReader<Stdin>> {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

/// Parses one input line. Blank lines yield nothing.
pub fn parse_line(line: &str) -> Option<ChatMessage> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    if let Some((name, text)) = line.split_once(':')
        && !name.is_empty()
        && !name.contains(char::is_whitespace)
        && !text.trim().is_empty()
    {
        return Some(ChatMessage::new(name, text.trim()));
    }

    Some(ChatMessage::new(DEFAULT_USERNAME, line))
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> ChatSource for LineChatSource<R> {
    async fn run(&self, listener: &dyn ChatListener, cancel: CancellationToken) -> Result<()> {
        let mut lines = self.lines.lock().await;
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                next = lines.next_line() => next,
            };

            match next {
                Ok(Some(line)) => {
                    if let Some(message) = parse_line(&line) {
                        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                        debug!("Chat message user={} id={}", message.username, id);
                        listener.on_message(message.with_id(id.to_string()));
                    }
                }
                Ok(None) => {
                    info!("Chat input closed");
                    cancel.cancelled().await;
                    return Ok(());
                }
                Err(e) => {
                    return Err(CohostError::Chat {
                        message: format!("failed to read chat input: {}", e),
                    });
                }
            }
        }
    }

    fn name(&self) -> &str {
        "lines"
    }
}

/// A chat source that never delivers anything.
pub struct SilentChatSource;

#[async_trait]
impl ChatSource for SilentChatSource {
    async fn run(&self, _listener: &dyn ChatListener, cancel: CancellationToken) -> Result<()> {
        cancel.cancelled().await;
        Ok(())
    }

    fn name(&self) -> &str {
        "silent"
    }
}
