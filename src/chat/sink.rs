use crate::chat::ChatSink;
use crate::error::{CohostError, Result};
use async_trait::async_trait;
use log::info;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

/// Logs replies instead of posting them.
pub struct LogSink;

#[async_trait]
impl ChatSink for LogSink {
    async fn send(&self, text: &str) -> Result<()> {
        info!("Reply (notifications disabled) text={:?}", text);
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Writes replies to stdout, one per line.
pub struct StdoutSink;

#[async_trait]
impl ChatSink for StdoutSink {
    async fn send(&self, text: &str) -> Result<()> {
        println!("{}", text);
        Ok(())
    }

    fn name(&self) -> &str {
        "stdout"
    }
}

/// Collects replies in memory for tests.
#[derive(Debug, Clone, Default)]
pub struct CollectorSink {
    collected: Arc<Mutex<Vec<String>>>,
    fail: Arc<AtomicBool>,
}

impl CollectorSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following `send` fail.
    pub fn fail_sends(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub async fn messages(&self) -> Vec<String> {
        self.collected.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.collected.lock().await.len()
    }
}

#[async_trait]
impl ChatSink for CollectorSink {
    async fn send(&self, text: &str) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CohostError::Chat {
                message: "send rejected".to_string(),
            });
        }
        self.collected.lock().await.push(text.to_string());
        Ok(())
    }

    fn name(&self) -> &str {
        "collector"
    }
}
