//! Backend over any edgequake-llm provider, and backend resolution.
//!
//! Providers answer with a single completion, so the reply arrives as one
//! chunk. Gemini is served natively by [`GeminiBackend`] instead.

use crate::chat::backend::{with_retry, ChatBackend, RetryPolicy, TextStream};
use crate::chat::gemini::{GeminiBackend, API_KEY_ENV_VARS};
use crate::chat::message::{ChatRequest, ChatRole, Content, Part};
use crate::config::ChatConfig;
use crate::error::PdfChatError;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use futures::stream;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Fallback model when a named provider is used without one.
pub const DEFAULT_PROVIDER_MODEL: &str = "gpt-4.1-mini";

pub struct ProviderBackend {
    provider: Arc<dyn LLMProvider>,
    name: String,
    model: String,
    retry: RetryPolicy,
    api_timeout: Duration,
}

impl ProviderBackend {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        name: impl Into<String>,
        config: &ChatConfig,
    ) -> Self {
        let api_timeout = Duration::from_secs(config.api_timeout_secs);
        Self {
            provider,
            name: name.into(),
            model: config.model.clone().unwrap_or_default(),
            retry: RetryPolicy {
                max_retries: config.max_retries,
                backoff_ms: config.retry_backoff_ms,
                max_delay: api_timeout,
            },
            api_timeout,
        }
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<String, PdfChatError> {
        let start = Instant::now();
        let call = self.provider.chat(messages, Some(options));
        let response = tokio::time::timeout(self.api_timeout, call)
            .await
            .map_err(|_| PdfChatError::ApiTimeout {
                elapsed_ms: start.elapsed().as_millis() as u64,
            })?
            .map_err(|e| classify_provider_error(&self.name, &e.to_string()))?;

        debug!(
            "{}: {} input tokens, {} output tokens, {:?}",
            self.name,
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );
        Ok(response.content)
    }
}

#[async_trait]
impl ChatBackend for ProviderBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn stream_chat(&self, request: &ChatRequest) -> Result<TextStream, PdfChatError> {
        let messages = to_chat_messages(request);
        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            ..Default::default()
        };
        info!(
            "{} request: {} messages, {} images",
            self.name,
            messages.len(),
            request.image_count()
        );

        let text = with_retry(self.retry, &self.name, || self.complete(&messages, &options)).await?;
        Ok(Box::pin(stream::once(async move { Ok(text) })))
    }
}

/// Convert a request into edgequake-llm messages.
///
/// Images are attached to the turn they appear in, after all of its text.
pub fn to_chat_messages(request: &ChatRequest) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(request.contents.len() + 1);
    messages.push(ChatMessage::system(request.system_instruction.as_str()));
    messages.extend(request.contents.iter().map(content_to_message));
    messages
}

fn content_to_message(content: &Content) -> ChatMessage {
    match content.role {
        ChatRole::Assistant => ChatMessage::assistant(content.joined_text()),
        ChatRole::User => {
            let images: Vec<ImageData> = content
                .parts
                .iter()
                .filter_map(|p| match p {
                    Part::Image { mime_type, data } => {
                        Some(ImageData::new(data.clone(), mime_type.clone()).with_detail("high"))
                    }
                    Part::Text(_) => None,
                })
                .collect();
            if images.is_empty() {
                ChatMessage::user(content.joined_text())
            } else {
                ChatMessage::user_with_images(content.joined_text(), images)
            }
        }
    }
}

/// Map a provider error message onto the retryable error kinds.
fn classify_provider_error(provider: &str, message: &str) -> PdfChatError {
    let lower = message.to_lowercase();
    if lower.contains("429")
        || lower.contains("rate limit")
        || lower.contains("too many requests")
    {
        PdfChatError::RateLimitExceeded {
            provider: provider.to_string(),
            retry_after_secs: None,
        }
    } else if lower.contains("401")
        || lower.contains("unauthorized")
        || lower.contains("invalid api key")
    {
        PdfChatError::AuthError {
            provider: provider.to_string(),
            detail: message.to_string(),
        }
    } else if lower.contains("503") || lower.contains("502") || lower.contains("overloaded") {
        PdfChatError::ServiceUnavailable {
            status: 503,
            message: message.to_string(),
        }
    } else if lower.contains("timed out") || lower.contains("timeout") {
        PdfChatError::ApiTimeout { elapsed_ms: 0 }
    } else {
        PdfChatError::LlmApiError {
            message: message.to_string(),
        }
    }
}

/// Instantiate a named edgequake-llm provider.
pub fn create_provider(name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, PdfChatError> {
    ProviderFactory::create_llm_provider(name, model).map_err(|e| {
        PdfChatError::ProviderNotConfigured {
            provider: name.to_string(),
            hint: format!("{e}"),
        }
    })
}

fn env_non_empty(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

/// Resolve the backend, from most-specific to least-specific:
///
/// 1. `config.backend`, used as-is.
/// 2. `config.provider`, wrapped in a [`ProviderBackend`].
/// 3. `config.provider_name`: "gemini" is served natively, any other name
///    goes through [`ProviderFactory::create_llm_provider`].
/// 4. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, when both are set.
/// 5. A Gemini key in `GEMINI_API_KEY` / `GOOGLE_API_KEY` or the config.
/// 6. [`ProviderFactory::from_env`] auto-detection.
pub fn resolve_backend(config: &ChatConfig) -> Result<Arc<dyn ChatBackend>, PdfChatError> {
    if let Some(ref backend) = config.backend {
        return Ok(Arc::clone(backend));
    }

    if let Some(ref provider) = config.provider {
        return Ok(Arc::new(ProviderBackend::new(Arc::clone(provider), "custom", config)));
    }

    if let Some(ref name) = config.provider_name {
        return named_backend(name, config.model.as_deref(), config);
    }

    if let (Some(name), Some(model)) = (
        env_non_empty("EDGEQUAKE_LLM_PROVIDER"),
        env_non_empty("EDGEQUAKE_MODEL"),
    ) {
        return named_backend(&name, Some(&model), config);
    }

    let has_gemini_key = config.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
        || API_KEY_ENV_VARS.iter().any(|v| env_non_empty(v).is_some());
    if has_gemini_key {
        return Ok(Arc::new(GeminiBackend::from_config(config)?));
    }

    let (llm, _embedding) =
        ProviderFactory::from_env().map_err(|e| PdfChatError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set GEMINI_API_KEY, or OPENAI_API_KEY / ANTHROPIC_API_KEY with --provider.\n\
                Error: {e}"
            ),
        })?;
    Ok(Arc::new(ProviderBackend::new(llm, "auto", config)))
}

fn named_backend(
    name: &str,
    model: Option<&str>,
    config: &ChatConfig,
) -> Result<Arc<dyn ChatBackend>, PdfChatError> {
    let name = name.trim().to_lowercase();
    if name == "gemini" || name == "google" {
        let mut config = config.clone();
        if let Some(m) = model {
            config.model = Some(m.to_string());
        }
        return Ok(Arc::new(GeminiBackend::from_config(&config)?));
    }

    let model = model.unwrap_or(DEFAULT_PROVIDER_MODEL);
    let provider = create_provider(&name, model)?;
    let mut config = config.clone();
    config.model = Some(model.to_string());
    Ok(Arc::new(ProviderBackend::new(provider, name, &config)))
}
