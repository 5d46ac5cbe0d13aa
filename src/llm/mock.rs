use crate::error::{CohostError, Result};
use crate::llm::{CompletionRequest, LlmClient};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Mock LLM for testing: replays queued responses and records requests.
#[derive(Debug, Clone, Default)]
pub struct MockLlmClient {
    responses: Arc<Mutex<VecDeque<Result<String>>>>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
    delay: Duration,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a successful response.
    pub fn with_response(self, content: &str) -> Self {
        self.push(Ok(content.to_string()));
        self
    }

    /// Queues a provider failure.
    pub fn with_failure(self, message: &str) -> Self {
        self.push(Err(CohostError::Provider {
            message: message.to_string(),
        }));
        self
    }

    /// Waits before answering each request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn push(&self, response: Result<String>) {
        // Only contended once requests are running.
        if let Ok(mut responses) = self.responses.try_lock() {
            responses.push_back(response);
        }
    }

    /// Queues a response while the mock is in use.
    pub async fn push_response(&self, content: &str) {
        self.responses
            .lock()
            .await
            .push_back(Ok(content.to_string()));
    }

    /// Requests received so far.
    pub async fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.requests.lock().await.len()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        self.requests.lock().await.push(request);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.responses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| {
                Err(CohostError::Provider {
                    message: "no scripted response".to_string(),
                })
            })
    }

    fn model(&self) -> &str {
        "mock"
    }
}
