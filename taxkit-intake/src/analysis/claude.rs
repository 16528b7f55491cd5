//! Anthropic Messages API client
//!
//! Concrete `AnalysisProvider` over the Claude Messages API. Streaming uses
//! the API's server-sent-event framing; structured payloads are requested
//! as JSON-only replies and parsed after stripping any code fences.

use crate::analysis::{
    prompts, AnalysisProvider, ChatContext, ChatOutcome, Classification, ResponseFragment,
};
use crate::models::{ChatMessage, DetectedMemory, DocumentRequest, Memory, MessageSender};
use async_trait::async_trait;
use base64::Engine;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const REQUEST_TIMEOUT_SECS: u64 = 120;
const RATE_LIMIT_MS: u64 = 250;

/// Claude client errors
#[derive(Debug, Error)]
pub enum ClaudeError {
    #[error("API key not configured")]
    MissingApiKey,

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

impl From<ClaudeError> for taxkit_common::Error {
    fn from(err: ClaudeError) -> Self {
        taxkit_common::Error::Analysis(err.to_string())
    }
}

/// Minimum-interval rate limiter for the model API
struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval_ms: u64) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval: Duration::from_millis(min_interval_ms),
        }
    }

    async fn wait(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::debug!("Claude rate limiting: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }
}

// ---- Wire types ----

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    content: ApiContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ApiContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ContentBlock {
    Text { text: String },
    Document { source: DocumentSource },
}

#[derive(Debug, Serialize)]
struct DocumentSource {
    #[serde(rename = "type")]
    source_type: String,
    media_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
}

#[derive(Debug, Deserialize)]
struct ResponseBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(rename = "type")]
    event_type: String,
    delta: Option<StreamDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(rename = "type")]
    delta_type: Option<String>,
    text: Option<String>,
}

/// Anthropic Messages API client implementing `AnalysisProvider`
pub struct ClaudeClient {
    http_client: reqwest::Client,
    rate_limiter: Arc<RateLimiter>,
    api_key: Option<String>,
    model: String,
}

impl ClaudeClient {
    /// Create a client. A missing key is allowed: every call then fails
    /// with a labeled analysis error and the service degrades fail-closed.
    pub fn new(api_key: Option<String>, model: String) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("reqwest client construction cannot fail with static config");

        if api_key.is_none() {
            tracing::warn!("Anthropic API key not configured; analysis calls will be refused");
        }

        Self {
            http_client,
            rate_limiter: Arc::new(RateLimiter::new(RATE_LIMIT_MS)),
            api_key,
            model,
        }
    }

    fn api_key(&self) -> Result<&str, ClaudeError> {
        self.api_key.as_deref().ok_or(ClaudeError::MissingApiKey)
    }

    async fn send_request(
        &self,
        request: &MessagesRequest,
    ) -> Result<reqwest::Response, ClaudeError> {
        let api_key = self.api_key()?;
        self.rate_limiter.wait().await;

        let response = self
            .http_client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| ClaudeError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ClaudeError::ApiError(status.as_u16(), error_text));
        }

        Ok(response)
    }

    /// One non-streaming call; returns the last text block
    async fn request_text(
        &self,
        system: &str,
        messages: Vec<ApiMessage>,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, ClaudeError> {
        let request = MessagesRequest {
            model: self.model.clone(),
            max_tokens,
            system: Some(system.to_string()),
            messages,
            temperature: Some(temperature),
            stream: false,
        };

        let response = self.send_request(&request).await?;
        let completion: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ClaudeError::ParseError(e.to_string()))?;

        completion
            .content
            .iter()
            .filter(|b| b.block_type == "text")
            .last()
            .and_then(|b| b.text.clone())
            .ok_or_else(|| ClaudeError::ParseError("No text in model response".to_string()))
    }

    /// One streaming call; forwards text deltas as fragments and returns
    /// the accumulated reply (equal to the concatenated fragments)
    async fn stream_text(
        &self,
        system: &str,
        messages: Vec<ApiMessage>,
        max_tokens: u32,
        fragments: &mpsc::Sender<ResponseFragment>,
    ) -> Result<String, ClaudeError> {
        let request = MessagesRequest {
            model: self.model.clone(),
            max_tokens,
            system: Some(system.to_string()),
            messages,
            temperature: Some(0.7),
            stream: true,
        };

        let response = self.send_request(&request).await?;

        let mut reply = String::new();
        let mut buffer = String::new();
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ClaudeError::NetworkError(e.to_string()))?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(newline) = buffer.find('\n') {
                let line = buffer[..newline].trim().to_string();
                buffer.drain(..=newline);

                if let Some(text) = extract_stream_delta(&line) {
                    reply.push_str(&text);
                    // Receiver may be gone (client disconnected); the turn
                    // still runs to completion
                    let _ = fragments.send(ResponseFragment::Text(text)).await;
                }
            }
        }

        if reply.is_empty() {
            return Err(ClaudeError::ParseError(
                "Stream ended without any text deltas".to_string(),
            ));
        }

        Ok(reply)
    }

    fn history_messages(history: &[ChatMessage], message: &str) -> Vec<ApiMessage> {
        let mut messages: Vec<ApiMessage> = history
            .iter()
            .map(|m| ApiMessage {
                role: match m.sender {
                    MessageSender::Accountant => "user".to_string(),
                    MessageSender::Ai => "assistant".to_string(),
                },
                content: ApiContent::Text(m.content.clone()),
            })
            .collect();

        messages.push(ApiMessage {
            role: "user".to_string(),
            content: ApiContent::Text(message.to_string()),
        });

        messages
    }
}

/// Extract a text delta from one SSE data line, if it carries one
fn extract_stream_delta(line: &str) -> Option<String> {
    let data = line.strip_prefix("data: ")?;
    let event: StreamEvent = serde_json::from_str(data).ok()?;

    if event.event_type != "content_block_delta" {
        return None;
    }

    let delta = event.delta?;
    if delta.delta_type.as_deref() != Some("text_delta") {
        return None;
    }

    delta.text
}

/// Strip optional markdown code fences around a JSON payload
fn strip_json_fences(text: &str) -> &str {
    text.trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

fn parse_json_payload<T: serde::de::DeserializeOwned>(text: &str) -> Result<T, ClaudeError> {
    let cleaned = strip_json_fences(text);
    serde_json::from_str(cleaned).map_err(|e| {
        let preview: String = cleaned.chars().take(200).collect();
        ClaudeError::ParseError(format!("Invalid JSON payload: {} (in: {})", e, preview))
    })
}

/// Build the user message for classification, attaching file content in a
/// form the model can read
fn classification_message(file_name: &str, content: &[u8]) -> ApiMessage {
    let instruction = format!("Classify this uploaded file. File name: {}", file_name);

    let content_block = if file_name.to_lowercase().ends_with(".pdf") {
        Some(ContentBlock::Document {
            source: DocumentSource {
                source_type: "base64".to_string(),
                media_type: "application/pdf".to_string(),
                data: base64::engine::general_purpose::STANDARD.encode(content),
            },
        })
    } else {
        // Plain-text formats go inline; other binary content is classified
        // by name alone
        std::str::from_utf8(content).ok().map(|text| ContentBlock::Text {
            text: format!("FILE CONTENT:\n{}", text),
        })
    };

    let mut blocks = vec![ContentBlock::Text { text: instruction }];
    if let Some(block) = content_block {
        blocks.push(block);
    }

    ApiMessage {
        role: "user".to_string(),
        content: ApiContent::Blocks(blocks),
    }
}

#[async_trait]
impl AnalysisProvider for ClaudeClient {
    async fn classify(
        &self,
        file_name: &str,
        content: &[u8],
    ) -> taxkit_common::Result<Classification> {
        let message = classification_message(file_name, content);

        let text = self
            .request_text(prompts::CLASSIFY_SYSTEM, vec![message], 1500, 0.0)
            .await?;

        let classification: Classification = parse_json_payload(&text)?;

        tracing::info!(
            file_name = %file_name,
            is_valid = classification.is_valid,
            doc_type = ?classification.doc_type,
            year = ?classification.year,
            "Classified uploaded document"
        );

        Ok(classification)
    }

    async fn respond(
        &self,
        history: &[ChatMessage],
        message: &str,
        context: &ChatContext,
        fragments: mpsc::Sender<ResponseFragment>,
    ) -> taxkit_common::Result<ChatOutcome> {
        // Memory detection runs on the accountant's message alone so the
        // result is available before the reply finishes generating
        let memories_text = self
            .request_text(
                prompts::DETECT_MEMORIES_SYSTEM,
                vec![ApiMessage {
                    role: "user".to_string(),
                    content: ApiContent::Text(format!(
                        "Customer: {}\nTax year: {}\nMessage:\n{}",
                        context.customer_name, context.tax_year, message
                    )),
                }],
                800,
                0.0,
            )
            .await?;
        let detected_memories: Vec<DetectedMemory> = parse_json_payload(&memories_text)?;

        if !detected_memories.is_empty() {
            let _ = fragments
                .send(ResponseFragment::Memories(detected_memories.clone()))
                .await;
        }

        // Streamed natural-language reply
        let system = prompts::chat_system(context);
        let reply = self
            .stream_text(
                &system,
                Self::history_messages(history, message),
                2048,
                &fragments,
            )
            .await?;

        // Structured document requests are derived from the finished reply
        let requests_text = self
            .request_text(
                prompts::DERIVE_REQUESTS_SYSTEM,
                vec![ApiMessage {
                    role: "user".to_string(),
                    content: ApiContent::Text(format!("Assistant reply:\n{}", reply)),
                }],
                1000,
                0.0,
            )
            .await?;
        let requested_documents: Vec<DocumentRequest> = parse_json_payload(&requests_text)?;

        tracing::info!(
            memories = detected_memories.len(),
            requests = requested_documents.len(),
            reply_chars = reply.len(),
            "Chat turn generated"
        );

        Ok(ChatOutcome {
            reply,
            detected_memories,
            requested_documents,
        })
    }

    async fn synthesize(
        &self,
        memories: &[Memory],
        scope_label: &str,
    ) -> taxkit_common::Result<String> {
        let user = prompts::synthesize_user(memories, scope_label);

        let notes = self
            .request_text(
                prompts::SYNTHESIZE_SYSTEM,
                vec![ApiMessage {
                    role: "user".to_string(),
                    content: ApiContent::Text(user),
                }],
                1500,
                0.2,
            )
            .await?;

        Ok(notes.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_stream_delta() {
        let line = r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hello"}}"#;
        assert_eq!(extract_stream_delta(line), Some("Hello".to_string()));

        // Non-delta events are skipped
        let start = r#"data: {"type":"message_start","message":{}}"#;
        assert_eq!(extract_stream_delta(start), None);

        // Event-name lines and blanks are skipped
        assert_eq!(extract_stream_delta("event: content_block_delta"), None);
        assert_eq!(extract_stream_delta(""), None);
    }

    #[test]
    fn test_parse_json_payload_strips_fences() {
        let fenced = "```json\n{\"is_valid\": true, \"feedback\": \"ok\"}\n```";
        let classification: Classification = parse_json_payload(fenced).unwrap();
        assert!(classification.is_valid);
        assert_eq!(classification.feedback, "ok");

        let bare = "{\"is_valid\": false, \"feedback\": \"not a tax document\"}";
        let classification: Classification = parse_json_payload(bare).unwrap();
        assert!(!classification.is_valid);
    }

    #[test]
    fn test_parse_json_payload_rejects_garbage() {
        let result: Result<Classification, _> = parse_json_payload("sorry, I cannot do that");
        assert!(result.is_err());
    }

    #[test]
    fn test_classification_message_pdf_attaches_document() {
        let message = classification_message("w2_microsoft.pdf", b"%PDF-1.4 ...");
        let json = serde_json::to_string(&message).unwrap();
        assert!(json.contains("\"type\":\"document\""));
        assert!(json.contains("application/pdf"));
    }

    #[test]
    fn test_classification_message_text_goes_inline() {
        let message = classification_message("notes.txt", b"wages were 85000");
        let json = serde_json::to_string(&message).unwrap();
        assert!(json.contains("FILE CONTENT"));
        assert!(!json.contains("\"type\":\"document\""));
    }

    #[test]
    fn test_missing_api_key_refuses_calls() {
        let client = ClaudeClient::new(None, "claude-sonnet-4-20250514".to_string());
        assert!(matches!(client.api_key(), Err(ClaudeError::MissingApiKey)));
    }
}
