//! Native streaming client for the Gemini `generateContent` API.
//!
//! Requests go to `models/{model}:streamGenerateContent?alt=sse`, which
//! answers with server-sent events whose `data:` payloads are partial
//! `GenerateContentResponse` objects. Network chunks do not respect event
//! boundaries, so bytes are buffered until a full line is available.

use crate::chat::backend::{with_retry, ChatBackend, RetryPolicy, TextStream};
use crate::chat::message::{ChatRequest, ChatRole, Content, Part};
use crate::config::ChatConfig;
use crate::error::PdfChatError;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};
use tokio_stream::Stream;
use tracing::{debug, info};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Environment variables checked for the API key, in order.
pub const API_KEY_ENV_VARS: [&str; 2] = ["GEMINI_API_KEY", "GOOGLE_API_KEY"];

const PROVIDER: &str = "gemini";

pub struct GeminiBackend {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    retry: RetryPolicy,
    api_timeout: Duration,
}

impl fmt::Debug for GeminiBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiBackend")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("retry", &self.retry)
            .field("api_timeout", &self.api_timeout)
            .finish_non_exhaustive()
    }
}

impl GeminiBackend {
    /// Build a backend from config, reading the API key from the config or
    /// from `GEMINI_API_KEY` / `GOOGLE_API_KEY`.
    pub fn from_config(config: &ChatConfig) -> Result<Self, PdfChatError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(api_key_from_env)
            .ok_or_else(|| PdfChatError::ApiKeyMissing {
                provider: PROVIDER.to_string(),
                env_var: API_KEY_ENV_VARS[0].to_string(),
            })?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let mut builder = Client::builder().connect_timeout(Duration::from_secs(30));
        // Local endpoints (proxies under test, emulators) bypass HTTP_PROXY.
        if is_loopback(&base_url) {
            builder = builder.no_proxy();
        }
        let client = builder
            .build()
            .map_err(|e| PdfChatError::Internal(format!("HTTP client: {e}")))?;

        let api_timeout = Duration::from_secs(config.api_timeout_secs);
        Ok(Self {
            client,
            base_url,
            api_key: api_key.trim().to_string(),
            model: config.model_or_default().to_string(),
            retry: RetryPolicy {
                max_retries: config.max_retries,
                backoff_ms: config.retry_backoff_ms,
                max_delay: api_timeout,
            },
            api_timeout,
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.base_url, model
        )
    }

    /// Send once and check the status; the body is left unread.
    async fn open(
        &self,
        body: &GenerateContentRequest<'_>,
        model: &str,
    ) -> Result<reqwest::Response, PdfChatError> {
        let start = Instant::now();
        let send = self
            .client
            .post(self.endpoint(model))
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send();

        let response = tokio::time::timeout(self.api_timeout, send)
            .await
            .map_err(|_| PdfChatError::ApiTimeout {
                elapsed_ms: start.elapsed().as_millis() as u64,
            })?
            .map_err(|e| {
                if e.is_timeout() {
                    PdfChatError::ApiTimeout {
                        elapsed_ms: start.elapsed().as_millis() as u64,
                    }
                } else if e.is_connect() {
                    PdfChatError::ServiceUnavailable {
                        status: 0,
                        message: e.to_string(),
                    }
                } else {
                    PdfChatError::LlmApiError {
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if status.is_success() {
            debug!("Gemini responded {} after {:?}", status, start.elapsed());
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, &body, retry_after))
    }
}

fn is_loopback(url: &str) -> bool {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    if rest.starts_with("[::1]") {
        return true;
    }
    let host = rest.split(['/', ':']).next().unwrap_or_default();
    host == "localhost" || host == "127.0.0.1"
}

fn api_key_from_env() -> Option<String> {
    API_KEY_ENV_VARS
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|v| !v.trim().is_empty())
}

#[async_trait]
impl ChatBackend for GeminiBackend {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn stream_chat(&self, request: &ChatRequest) -> Result<TextStream, PdfChatError> {
        let body = GenerateContentRequest::from_request(request);
        info!(
            "Gemini request: model={}, {} turns, {} images",
            request.model,
            request.contents.len(),
            request.image_count()
        );

        let response = with_retry(self.retry, "gemini", || self.open(&body, &request.model)).await?;
        Ok(sse_text_stream(response.bytes_stream()))
    }
}

// ── Wire format: request ─────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    system_instruction: WireContent<'a>,
    contents: Vec<WireContent<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct WireContent<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<WirePart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WirePart<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: usize,
}

impl<'a> GenerateContentRequest<'a> {
    fn from_request(request: &'a ChatRequest) -> Self {
        Self {
            system_instruction: WireContent {
                role: None,
                parts: vec![WirePart {
                    text: Some(&request.system_instruction),
                    inline_data: None,
                }],
            },
            contents: request.contents.iter().map(WireContent::from_content).collect(),
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
            },
        }
    }
}

impl<'a> WireContent<'a> {
    fn from_content(content: &'a Content) -> Self {
        let role = match content.role {
            ChatRole::User => "user",
            ChatRole::Assistant => "model",
        };
        let parts = content
            .parts
            .iter()
            .map(|p| match p {
                Part::Text(t) => WirePart {
                    text: Some(t),
                    inline_data: None,
                },
                Part::Image { mime_type, data } => WirePart {
                    text: None,
                    inline_data: Some(InlineData { mime_type, data }),
                },
            })
            .collect();
        Self {
            role: Some(role),
            parts,
        }
    }
}

// ── Wire format: response ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

/// Finish reasons that mean the model stopped for policy reasons.
const BLOCKING_FINISH_REASONS: [&str; 5] =
    ["SAFETY", "RECITATION", "BLOCKLIST", "PROHIBITED_CONTENT", "SPII"];

/// Text carried by one SSE payload, `None` for text-less chunks
/// (usage-only trailers).
fn parse_event(data: &str) -> Result<Option<String>, PdfChatError> {
    let chunk: GenerateContentChunk =
        serde_json::from_str(data).map_err(|e| PdfChatError::StreamInterrupted {
            detail: format!("malformed event: {e}"),
        })?;

    if let Some(err) = chunk.error {
        return Err(PdfChatError::LlmApiError {
            message: err.message,
        });
    }
    if let Some(reason) = chunk.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(PdfChatError::LlmApiError {
            message: format!("prompt blocked by provider ({reason})"),
        });
    }

    let mut text = String::new();
    let mut blocked: Option<String> = None;
    for candidate in chunk.candidates.into_iter().take(1) {
        if let Some(content) = candidate.content {
            for part in content.parts {
                if let Some(t) = part.text {
                    text.push_str(&t);
                }
            }
        }
        if let Some(reason) = candidate.finish_reason {
            if BLOCKING_FINISH_REASONS.contains(&reason.as_str()) {
                blocked = Some(reason);
            }
        }
    }

    if text.is_empty() {
        if let Some(reason) = blocked {
            return Err(PdfChatError::LlmApiError {
                message: format!("response stopped by provider ({reason})"),
            });
        }
        return Ok(None);
    }
    Ok(Some(text))
}

/// Map a non-2xx response to an error.
fn status_error(status: StatusCode, body: &str, retry_after: Option<u64>) -> PdfChatError {
    let parsed = serde_json::from_str::<ApiErrorEnvelope>(body).ok();
    let message = parsed
        .as_ref()
        .map(|e| e.error.message.clone())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("HTTP {}: {}", status, body.trim()));
    let api_status = parsed.and_then(|e| e.error.status).unwrap_or_default();

    match status.as_u16() {
        401 | 403 => PdfChatError::AuthError {
            provider: PROVIDER.to_string(),
            detail: message,
        },
        // Gemini reports a bad key as 400 INVALID_ARGUMENT.
        400 if message.contains("API key") => PdfChatError::AuthError {
            provider: PROVIDER.to_string(),
            detail: message,
        },
        429 => PdfChatError::RateLimitExceeded {
            provider: PROVIDER.to_string(),
            retry_after_secs: retry_after,
        },
        s @ 500..=599 => PdfChatError::ServiceUnavailable { status: s, message },
        _ if api_status == "RESOURCE_EXHAUSTED" => PdfChatError::RateLimitExceeded {
            provider: PROVIDER.to_string(),
            retry_after_secs: retry_after,
        },
        _ => PdfChatError::LlmApiError { message },
    }
}

// ── SSE decoding ─────────────────────────────────────────────────────────

/// Splits a byte stream into SSE `data` payloads.
///
/// Consecutive `data:` lines of one event are joined with `\n`; an empty
/// line ends the event. Comment lines and other fields are ignored.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buf: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    /// Feed bytes, returning every event completed by them.
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(bytes);
        let mut events = Vec::new();

        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);
            self.handle_line(line, &mut events);
        }

        events
    }

    /// Flush a final event that was not followed by a blank line.
    pub(crate) fn finish(&mut self) -> Vec<String> {
        let mut events = Vec::new();
        if !self.buf.is_empty() {
            let rest = std::mem::take(&mut self.buf);
            let line = String::from_utf8_lossy(&rest);
            self.handle_line(line.trim_end_matches('\r'), &mut events);
        }
        if !self.data.is_empty() {
            events.push(self.data.join("\n"));
            self.data.clear();
        }
        events
    }

    fn handle_line(&mut self, line: &str, events: &mut Vec<String>) {
        if line.is_empty() {
            if !self.data.is_empty() {
                events.push(self.data.join("\n"));
                self.data.clear();
            }
        } else if let Some(value) = line.strip_prefix("data:") {
            self.data.push(value.strip_prefix(' ').unwrap_or(value).to_string());
        }
    }
}

/// Turn an SSE response body into a stream of reply text.
///
/// The stream ends after the first error.
pub(crate) fn sse_text_stream<S, B, E>(body: S) -> TextStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    let pending = VecDeque::<Result<String, PdfChatError>>::new();
    let state = (Box::pin(body), SseDecoder::default(), pending, false);

    let s = stream::unfold(state, |(mut body, mut decoder, mut pending, mut done)| async move {
        loop {
            if let Some(item) = pending.pop_front() {
                if item.is_err() {
                    pending.clear();
                    done = true;
                }
                return Some((item, (body, decoder, pending, done)));
            }
            if done {
                return None;
            }
            let events = match body.next().await {
                Some(Ok(bytes)) => decoder.push(bytes.as_ref()),
                Some(Err(e)) => {
                    pending.push_back(Err(PdfChatError::StreamInterrupted {
                        detail: e.to_string(),
                    }));
                    continue;
                }
                None => {
                    done = true;
                    decoder.finish()
                }
            };
            for data in events {
                if let Some(item) = parse_event(&data).transpose() {
                    pending.push_back(item);
                }
            }
        }
    });

    Box::pin(s)
}
