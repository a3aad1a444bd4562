//! Model interaction: build the multimodal request and call the provider.
//!
//! One request per page, one attempt per request. The payload is a single
//! user turn holding the instruction text followed by the page image as a
//! data URI, with temperature pinned to zero:
//!
//! ```json
//! {"model":"gpt-4o-mini","messages":[{"role":"user","content":[
//!   {"type":"text","text":"..."},
//!   {"type":"image_url","image_url":{"url":"data:image/png;base64,..."}}]}],
//!  "temperature":0}
//! ```
//!
//! Providers sit behind [`ExtractionProvider`] so the orchestrator can be
//! driven by [`OpenAiProvider`] in production and by in-process fakes in tests.

use crate::config::ExtractionConfig;
use crate::error::{ExtractError, PageError};
use crate::output::{PageResult, TokenUsage};
use crate::pipeline::encode::EncodedPage;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Longest provider error body kept in a [`PageError::Provider`].
const MAX_ERROR_BODY_CHARS: usize = 500;

// ── Request payload ──────────────────────────────────────────────────────

/// Chat completion request for one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    /// Always 0; serialised as the integer `0`.
    pub temperature: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: Vec<ContentPart>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

impl ExtractionRequest {
    /// Build the single-turn request: instruction text, then the image.
    pub fn new(model: impl Into<String>, instruction: impl Into<String>, data_uri: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: vec![
                    ContentPart::Text {
                        text: instruction.into(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: data_uri.into(),
                        },
                    },
                ],
            }],
            temperature: 0,
        }
    }

    /// Request for `page` using the model and instruction from `config`.
    pub fn for_page(page: &EncodedPage, config: &ExtractionConfig) -> Self {
        Self::new(&config.model, &config.instruction, page.data_uri())
    }

    /// Serialised JSON body. Identical inputs give identical bytes.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

// ── Result ───────────────────────────────────────────────────────────────

/// A successful model answer.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionResult {
    /// `choices[0].message.content`
    pub text: String,
    /// The full response object.
    pub raw: Value,
    pub usage: Option<TokenUsage>,
}

impl ExtractionResult {
    /// Pull the answer out of a chat completion response.
    pub fn from_response(raw: Value) -> Result<Self, PageError> {
        let text = raw
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| PageError::MalformedResponse {
                detail: "missing choices[0].message.content".into(),
            })?
            .to_string();

        let usage = raw
            .get("usage")
            .and_then(|u| serde_json::from_value::<TokenUsage>(u.clone()).ok());

        Ok(Self { text, raw, usage })
    }
}

/// Pretty-print a response for display, falling back to the compact form.
pub fn render_pretty(raw: &Value) -> String {
    serde_json::to_string_pretty(raw).unwrap_or_else(|_| raw.to_string())
}

// ── Provider seam ────────────────────────────────────────────────────────

/// A remote multimodal completion endpoint.
#[async_trait]
pub trait ExtractionProvider: Send + Sync {
    /// Short provider name for logs and errors.
    fn name(&self) -> &str;

    /// Send one request; exactly one attempt.
    async fn complete(&self, request: &ExtractionRequest) -> Result<ExtractionResult, PageError>;
}

/// OpenAI-compatible `POST {base_url}/chat/completions`.
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl OpenAiProvider {
    pub fn new(api_key: impl Into<String>, base_url: &str) -> Result<Self, ExtractError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ExtractError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ExtractionProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, request: &ExtractionRequest) -> Result<ExtractionResult, PageError> {
        let body = request.to_json_bytes().map_err(|e| PageError::Transport {
            detail: format!("request serialisation failed: {e}"),
        })?;

        let response = self
            .client
            .post(&self.endpoint)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| PageError::Transport {
                detail: e.to_string(),
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| PageError::Transport {
            detail: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(PageError::Provider {
                status: status.as_u16(),
                body: text.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        let raw: Value = serde_json::from_str(&text).map_err(|e| PageError::MalformedResponse {
            detail: format!("response is not JSON: {e}"),
        })?;

        ExtractionResult::from_response(raw)
    }
}

// ── Page driver ──────────────────────────────────────────────────────────

/// Extract one encoded page.
///
/// Always returns a `PageResult`; a failure is recorded in `result.error` and
/// the orchestrator decides what it means for the rest of the document.
pub async fn extract_page(
    provider: &Arc<dyn ExtractionProvider>,
    page: &EncodedPage,
    total_pages: usize,
    config: &ExtractionConfig,
) -> PageResult {
    let start = Instant::now();
    let request = ExtractionRequest::for_page(page, config);
    info!(
        "Page {}/{}: sending to {} ({})",
        page.page_num,
        total_pages,
        provider.name(),
        config.model
    );

    let outcome = provider.complete(&request).await;
    let duration_ms = start.elapsed().as_millis() as u64;

    match outcome {
        Ok(result) => {
            if let Some(usage) = result.usage {
                debug!(
                    "Page {}: {} input tokens, {} output tokens, {}ms",
                    page.page_num, usage.prompt_tokens, usage.completion_tokens, duration_ms
                );
            }
            PageResult {
                page_num: page.page_num,
                total_pages,
                text: result.text,
                usage: result.usage,
                raw_response: Some(result.raw),
                duration_ms,
                error: None,
            }
        }
        Err(e) => {
            warn!("Page {}: extraction failed: {}", page.page_num, e);
            let mut failed = PageResult::failed(page.page_num, total_pages, e);
            failed.duration_ms = duration_ms;
            failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const URI: &str = "data:image/png;base64,iVBORw0KGgo=";

    #[test]
    fn payload_shape() {
        let req = ExtractionRequest::new("gpt-4o-mini", "Extract.", URI);
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(
            v,
            json!({
                "model": "gpt-4o-mini",
                "messages": [{
                    "role": "user",
                    "content": [
                        {"type": "text", "text": "Extract."},
                        {"type": "image_url", "image_url": {"url": URI}}
                    ]
                }],
                "temperature": 0
            })
        );
    }

    #[test]
    fn payload_is_byte_identical_across_calls() {
        let a = ExtractionRequest::new("m", "instr", URI).to_json_bytes().unwrap();
        let b = ExtractionRequest::new("m", "instr", URI).to_json_bytes().unwrap();
        assert_eq!(a, b);
        let s = String::from_utf8(a).unwrap();
        assert!(s.starts_with(r#"{"model":"m","messages":[{"role":"user","content":[{"type":"text""#));
        assert!(s.ends_with(r#""temperature":0}"#), "got {s}");
    }

    #[test]
    fn result_parses_content_and_usage() {
        let raw = json!({
            "id": "chatcmpl-1",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "| a | b |"}}],
            "usage": {"prompt_tokens": 800, "completion_tokens": 12, "total_tokens": 812}
        });
        let r = ExtractionResult::from_response(raw).unwrap();
        assert_eq!(r.text, "| a | b |");
        assert_eq!(r.usage.unwrap().total_tokens, 812);
        assert_eq!(r.raw["id"], "chatcmpl-1");
    }

    #[test]
    fn result_without_usage_is_fine() {
        let raw = json!({"choices": [{"message": {"content": "x"}}]});
        let r = ExtractionResult::from_response(raw).unwrap();
        assert!(r.usage.is_none());
    }

    #[test]
    fn null_content_is_malformed() {
        let raw = json!({"choices": [{"message": {"content": null}}]});
        let err = ExtractionResult::from_response(raw).unwrap_err();
        assert!(matches!(err, PageError::MalformedResponse { .. }));
        let err = ExtractionResult::from_response(json!({"choices": []})).unwrap_err();
        assert!(matches!(err, PageError::MalformedResponse { .. }));
    }

    #[test]
    fn endpoint_joins_base_url() {
        let p = OpenAiProvider::new("k", "http://localhost:9/v1/").unwrap();
        assert_eq!(p.endpoint(), "http://localhost:9/v1/chat/completions");
    }

    /// Serve one canned HTTP response and hand back the request body.
    async fn serve_once(status_line: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 8192];
            let (header_end, content_len) = loop {
                let n = sock.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break (buf.len(), 0);
                }
                buf.extend_from_slice(&chunk[..n]);
                if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                    let head = String::from_utf8_lossy(&buf[..pos]).to_ascii_lowercase();
                    let len = head
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length:"))
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    break (pos + 4, len);
                }
            };
            while buf.len() < header_end + content_len {
                let n = sock.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            let reply = format!(
                "{status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            sock.write_all(reply.as_bytes()).await.unwrap();
            sock.shutdown().await.ok();
            buf[header_end..].to_vec()
        });
        (format!("http://{addr}/v1"), handle)
    }

    #[tokio::test]
    async fn openai_provider_round_trip() {
        let (base, server) = serve_once(
            "HTTP/1.1 200 OK",
            r#"{"choices":[{"message":{"role":"assistant","content":"Total | 42"}}],"usage":{"prompt_tokens":5,"completion_tokens":3,"total_tokens":8}}"#,
        )
        .await;
        let provider = OpenAiProvider::new("sk-test", &base).unwrap();
        let req = ExtractionRequest::new("gpt-4o-mini", "Extract.", URI);

        let result = provider.complete(&req).await.unwrap();
        assert_eq!(result.text, "Total | 42");
        assert_eq!(result.usage.unwrap().completion_tokens, 3);

        let sent = server.await.unwrap();
        assert_eq!(sent, req.to_json_bytes().unwrap());
    }

    #[tokio::test]
    async fn openai_provider_maps_http_error() {
        let (base, _server) = serve_once(
            "HTTP/1.1 401 Unauthorized",
            r#"{"error":{"message":"Incorrect API key"}}"#,
        )
        .await;
        let provider = OpenAiProvider::new("bad", &base).unwrap();
        let err = provider
            .complete(&ExtractionRequest::new("m", "i", URI))
            .await
            .unwrap_err();
        match err {
            PageError::Provider { status, body } => {
                assert_eq!(status, 401);
                assert!(body.contains("Incorrect API key"));
            }
            other => panic!("expected provider error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn openai_provider_maps_connection_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let provider = OpenAiProvider::new("k", &format!("http://{addr}/v1")).unwrap();
        let err = provider
            .complete(&ExtractionRequest::new("m", "i", URI))
            .await
            .unwrap_err();
        assert!(matches!(err, PageError::Transport { .. }), "got {err:?}");
    }
}
