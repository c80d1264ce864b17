//! Configuration types for PDF processing and chat.
//!
//! Two structs, one per concern: [`ProcessingConfig`] controls how a PDF is
//! turned into per-page text and previews, [`ChatConfig`] controls how the
//! conversation payload is assembled and which backend answers it. Both are
//! built through a validating builder so callers set only what they care
//! about and rely on documented defaults for the rest.

use crate::chat::backend::ChatBackend;
use crate::error::PdfChatError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Default Gemini model used when nothing else is configured.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

// ── Processing ───────────────────────────────────────────────────────────

/// Configuration for turning a PDF into a [`crate::ProcessedDocument`].
///
/// # Example
/// ```rust
/// use pdf_chat::{PageSelection, ProcessingConfig};
///
/// let config = ProcessingConfig::builder()
///     .max_rendered_pixels(1024)
///     .pages(PageSelection::Range(1, 10))
///     .build()
///     .unwrap();
/// assert_eq!(config.max_rendered_pixels, 1024);
/// ```
#[derive(Clone)]
pub struct ProcessingConfig {
    /// Longest edge of a rendered preview in pixels. Default: 1280.
    ///
    /// Previews double as the images sent to the model, so this bounds both
    /// memory per page and request size.
    pub max_rendered_pixels: u32,

    /// Render page previews at all. Default: true.
    ///
    /// With rendering off pages carry no preview, nothing is rasterised, and
    /// only text reaches the model.
    pub render_previews: bool,

    /// Encoding used for previews. Default: [`PreviewFormat::Png`].
    pub preview_format: PreviewFormat,

    /// JPEG quality (1–100) when `preview_format` is JPEG. Default: 85.
    pub jpeg_quality: u8,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Page selection. Default: all pages.
    pub pages: PageSelection,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Optional per-page progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_rendered_pixels: 1280,
            render_previews: true,
            preview_format: PreviewFormat::default(),
            jpeg_quality: 85,
            password: None,
            pages: PageSelection::default(),
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ProcessingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessingConfig")
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("render_previews", &self.render_previews)
            .field("preview_format", &self.preview_format)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("pages", &self.pages)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ProcessingProgressCallback>"),
            )
            .finish()
    }
}

impl ProcessingConfig {
    /// Create a new builder for `ProcessingConfig`.
    pub fn builder() -> ProcessingConfigBuilder {
        ProcessingConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ProcessingConfig`].
#[derive(Debug)]
pub struct ProcessingConfigBuilder {
    config: ProcessingConfig,
}

impl ProcessingConfigBuilder {
    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn render_previews(mut self, v: bool) -> Self {
        self.config.render_previews = v;
        self
    }

    pub fn preview_format(mut self, format: PreviewFormat) -> Self {
        self.config.preview_format = format;
        self
    }

    pub fn jpeg_quality(mut self, q: u8) -> Self {
        self.config.jpeg_quality = q.clamp(1, 100);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ProcessingConfig, PdfChatError> {
        let c = &self.config;
        if c.max_rendered_pixels < 100 || c.max_rendered_pixels > 8000 {
            return Err(PdfChatError::InvalidConfig(format!(
                "max_rendered_pixels must be 100–8000, got {}",
                c.max_rendered_pixels
            )));
        }
        if c.download_timeout_secs == 0 {
            return Err(PdfChatError::InvalidConfig(
                "download timeout must be ≥ 1s".into(),
            ));
        }
        if let PageSelection::Range(start, end) = c.pages {
            if start == 0 || end < start {
                return Err(PdfChatError::InvalidConfig(format!(
                    "invalid page range {start}-{end}"
                )));
            }
        }
        Ok(self.config)
    }
}

// ── Chat ─────────────────────────────────────────────────────────────────

/// Configuration for a [`crate::ChatSession`].
///
/// # Example
/// ```rust
/// use pdf_chat::ChatConfig;
///
/// let config = ChatConfig::builder()
///     .model("gemini-2.0-flash")
///     .temperature(0.2)
///     .include_images(false)
///     .build()
///     .unwrap();
/// assert!(!config.include_images);
/// ```
#[derive(Clone)]
pub struct ChatConfig {
    /// Model identifier, e.g. "gemini-2.0-flash", "gpt-4.1-mini".
    /// If None, [`DEFAULT_MODEL`] (Gemini) or the provider default is used.
    pub model: Option<String>,

    /// Provider name: "gemini" (native streaming) or any name
    /// `edgequake_llm::ProviderFactory` understands.
    pub provider_name: Option<String>,

    /// Pre-constructed backend. Takes precedence over everything else.
    pub backend: Option<Arc<dyn ChatBackend>>,

    /// Pre-constructed edgequake-llm provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// API key for the Gemini backend. Falls back to `GEMINI_API_KEY` /
    /// `GOOGLE_API_KEY` when None.
    pub api_key: Option<String>,

    /// Custom system instruction. If None, uses the built-in one.
    pub system_instruction: Option<String>,

    /// Sampling temperature. Default: 0.4.
    pub temperature: f32,

    /// Maximum tokens the model may generate per reply. Default: 8192.
    pub max_tokens: usize,

    /// Attach page previews to the request. Default: true.
    pub include_images: bool,

    /// Number of prior turns (user + assistant messages) replayed with each
    /// request. Default: 20.
    pub history_limit: usize,

    /// Maximum retry attempts when opening a request fails transiently. Default: 2.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 1000.
    pub retry_backoff_ms: u64,

    /// Timeout for the request to start responding, in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Override for the Gemini API base URL (tests, proxies).
    pub base_url: Option<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            backend: None,
            provider: None,
            api_key: None,
            system_instruction: None,
            temperature: 0.4,
            max_tokens: 8192,
            include_images: true,
            history_limit: 20,
            max_retries: 2,
            retry_backoff_ms: 1000,
            api_timeout_secs: 120,
            base_url: None,
        }
    }
}

impl fmt::Debug for ChatConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("backend", &self.backend.as_ref().map(|b| b.name().to_string()))
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("include_images", &self.include_images)
            .field("history_limit", &self.history_limit)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .finish()
    }
}

impl ChatConfig {
    /// Create a new builder for `ChatConfig`.
    pub fn builder() -> ChatConfigBuilder {
        ChatConfigBuilder {
            config: Self::default(),
        }
    }

    /// The model to use, falling back to [`DEFAULT_MODEL`].
    pub fn model_or_default(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }
}

/// Builder for [`ChatConfig`].
#[derive(Debug)]
pub struct ChatConfigBuilder {
    config: ChatConfig,
}

impl ChatConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn backend(mut self, backend: Arc<dyn ChatBackend>) -> Self {
        self.config.backend = Some(backend);
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn system_instruction(mut self, text: impl Into<String>) -> Self {
        self.config.system_instruction = Some(text.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn include_images(mut self, v: bool) -> Self {
        self.config.include_images = v;
        self
    }

    pub fn history_limit(mut self, n: usize) -> Self {
        self.config.history_limit = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = Some(url.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ChatConfig, PdfChatError> {
        let c = &self.config;
        if c.max_tokens == 0 {
            return Err(PdfChatError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.api_timeout_secs == 0 {
            return Err(PdfChatError::InvalidConfig(
                "API timeout must be ≥ 1s".into(),
            ));
        }
        if matches!(c.model.as_deref(), Some(m) if m.trim().is_empty()) {
            return Err(PdfChatError::InvalidConfig("model must not be empty".into()));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Raster encoding for page previews.
///
/// PNG keeps rendered text crisp; JPEG makes requests for long documents
/// several times smaller at the cost of slight blur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PreviewFormat {
    #[default]
    Png,
    Jpeg,
}

impl PreviewFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            PreviewFormat::Png => "image/png",
            PreviewFormat::Jpeg => "image/jpeg",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            PreviewFormat::Png => "png",
            PreviewFormat::Jpeg => "jpg",
        }
    }
}

/// Specifies which pages of the PDF to process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSelection {
    /// Process all pages (default).
    #[default]
    All,
    /// Process a single page (1-indexed).
    Single(usize),
    /// Process a contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Process specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 0-indexed page numbers.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Single(p) => {
                if *p >= 1 && *p <= total_pages {
                    vec![p - 1]
                } else {
                    vec![]
                }
            }
            PageSelection::Range(start, end) => {
                let s = (*start).max(1) - 1;
                let e = (*end).min(total_pages);
                (s..e).collect()
            }
            PageSelection::Set(pages) => pages
                .iter()
                .filter(|&&p| p >= 1 && p <= total_pages)
                .map(|p| p - 1)
                .collect(),
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }

    /// Parse `all`, `5`, `3-15` or `1,3,5`.
    pub fn parse(s: &str) -> Result<Self, PdfChatError> {
        let s = s.trim();
        let invalid = || PdfChatError::InvalidConfig(format!("invalid page selection '{s}'"));

        if s.is_empty() || s.eq_ignore_ascii_case("all") {
            return Ok(PageSelection::All);
        }
        if let Some((a, b)) = s.split_once('-') {
            let start = a.trim().parse().map_err(|_| invalid())?;
            let end = b.trim().parse().map_err(|_| invalid())?;
            return Ok(PageSelection::Range(start, end));
        }
        if s.contains(',') {
            let pages = s
                .split(',')
                .map(|p| p.trim().parse::<usize>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| invalid())?;
            return Ok(PageSelection::Set(pages));
        }
        s.parse().map(PageSelection::Single).map_err(|_| invalid())
    }
}
