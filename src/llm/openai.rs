use crate::defaults;
use crate::error::{CohostError, Result};
use crate::llm::{CompletionRequest, LlmClient};
use async_trait::async_trait;
use log::debug;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiClient {
    client: reqwest::Client,
    url: String,
    model: String,
    timeout: Duration,
}

impl OpenAiClient {
    /// Creates a client. An empty `token` sends no authorization header.
    pub fn new(base_url: &str, token: &str, model: impl Into<String>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if !token.is_empty() {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|e| {
                    CohostError::ConfigInvalidValue {
                        key: "llm.token".to_string(),
                        message: format!("invalid authorization header value: {}", e),
                    }
                })?,
            );
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| CohostError::Provider {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            url: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.into(),
            timeout: defaults::LLM_TIMEOUT,
        })
    }

    /// Overrides the per-call deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn send(&self, request: &CompletionRequest) -> Result<String> {
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &request.prompt,
            }],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format: request
                .json_response
                .then_some(ResponseFormat { kind: "json_object" }),
        };

        debug!(
            "Sending chat completion model={} url={} prompt_chars={}",
            self.model,
            self.url,
            request.prompt.chars().count()
        );

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| CohostError::Provider {
                message: format!("HTTP request failed: {}", e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            return Err(CohostError::Provider {
                message: format!("API request failed with status {}: {}", status, error_text),
            });
        }

        let completion: ChatCompletionResponse =
            response.json().await.map_err(|e| CohostError::Provider {
                message: format!("Failed to parse API response: {}", e),
            })?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| CohostError::Provider {
                message: "API response has no content".to_string(),
            })
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        tokio::time::timeout(self.timeout, self.send(&request))
            .await
            .map_err(|_| CohostError::Provider {
                message: format!("request timed out after {:?}", self.timeout),
            })?
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    /// Serves one HTTP exchange and hands back the request body.
    async fn serve_once(
        status: &'static str,
        body: String,
    ) -> (String, oneshot::Receiver<(String, String)>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            let body_start = loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                if let Some(pos) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
            };
            let head = String::from_utf8_lossy(&request[..body_start]).to_lowercase();
            let content_length: usize = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .map(|v| v.trim().parse().unwrap())
                .unwrap_or(0);
            while request.len() < body_start + content_length {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
            }
            let request_body = String::from_utf8_lossy(&request[body_start..]).to_string();
            tx.send((head, request_body)).ok();

            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });

        (format!("http://{}/v1", addr), rx)
    }

    #[tokio::test]
    async fn test_complete_sends_openai_request() {
        let reply = r#"{"choices":[{"message":{"role":"assistant","content":"  привет  "}}]}"#;
        let (base_url, seen) = serve_once("200 OK", reply.to_string()).await;

        let client = OpenAiClient::new(&base_url, "secret", "test-model").unwrap();
        let content = client
            .complete(
                CompletionRequest::new("hello")
                    .with_temperature(0.2)
                    .with_max_tokens(1000)
                    .with_json_response(),
            )
            .await
            .unwrap();
        assert_eq!(content, "привет");

        let (head, body) = seen.await.unwrap();
        assert!(head.starts_with("post /v1/chat/completions"));
        assert!(head.contains("authorization: bearer secret"));

        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["model"], "test-model");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "hello");
        assert_eq!(json["max_tokens"], 1000);
        assert_eq!(json["response_format"]["type"], "json_object");
    }

    #[tokio::test]
    async fn test_error_status_is_provider_error() {
        let (base_url, _seen) =
            serve_once("429 Too Many Requests", r#"{"error":"quota"}"#.to_string()).await;
        let client = OpenAiClient::new(&base_url, "", "m").unwrap();

        let err = client
            .complete(CompletionRequest::new("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, CohostError::Provider { .. }));
        assert!(err.to_string().contains("429"));
    }

    #[tokio::test]
    async fn test_empty_choices_is_provider_error() {
        let (base_url, _seen) = serve_once("200 OK", r#"{"choices":[]}"#.to_string()).await;
        let client = OpenAiClient::new(&base_url, "", "m").unwrap();

        let err = client
            .complete(CompletionRequest::new("hi"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no content"));
    }

    #[tokio::test]
    async fn test_timeout_is_provider_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let client = OpenAiClient::new(&format!("http://{}", addr), "", "m")
            .unwrap()
            .with_timeout(Duration::from_millis(100));
        let err = client
            .complete(CompletionRequest::new("hi"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn test_url_joins_base() {
        let client = OpenAiClient::new("https://openrouter.ai/api/v1/", "", "m").unwrap();
        assert_eq!(client.url(), "https://openrouter.ai/api/v1/chat/completions");
    }

    #[test]
    fn test_plain_request_has_no_response_format() {
        let body = ChatCompletionRequest {
            model: "m",
            messages: vec![ChatMessage {
                role: "user",
                content: "hi",
            }],
            temperature: 1.0,
            max_tokens: 500,
            response_format: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("response_format").is_none());
    }
}
