//! Error types for the pdf-chat library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`PdfChatError`]: **Fatal**: the operation cannot proceed at all
//!   (bad input file, wrong password, pdfium missing, no API key, the chat
//!   request was rejected). Returned as `Err(PdfChatError)`.
//!
//! * [`PageError`]: **Non-fatal**: a single page could not be read or
//!   rendered. The page keeps a placeholder text or preview and the error is
//!   recorded on [`crate::document::PageContent::errors`], so one bad page
//!   never loses the whole document.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pdf-chat library.
#[derive(Debug, Error)]
pub enum PdfChatError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// The page selection matched no page of the document.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Place libpdfium next to the executable or in the working directory,\n\
or set PDFIUM_LIB_PATH=/path/to/libpdfium (file or directory).\n\
Pre-built libraries: https://github.com/bblanchon/pdfium-binaries/releases\n"
    )]
    PdfiumBindingFailed(String),

    // ── Library errors ────────────────────────────────────────────────────
    /// No document in the library has the given name or id.
    #[error("No document named '{name}' in the library")]
    DocumentNotFound { name: String },

    // ── Chat errors ───────────────────────────────────────────────────────
    /// The chat query was empty after trimming.
    #[error("Query is empty")]
    EmptyQuery,

    /// No API key is available for the selected provider.
    #[error("No API key for provider '{provider}'.\nSet {env_var} or pass --api-key.")]
    ApiKeyMissing { provider: String, env_var: String },

    /// The configured provider is not initialised.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The LLM API returned a non-retryable error.
    #[error("LLM API error: {message}")]
    LlmApiError { message: String },

    /// The LLM API returned a 5xx; the backend is overloaded or down.
    #[error("LLM API unavailable (HTTP {status}): {message}")]
    ServiceUnavailable { status: u16, message: String },

    /// API returned HTTP 429; caller should back off.
    ///
    /// Check `retry_after_secs` for a server-specified delay, or use
    /// exponential backoff if `None`.
    #[error("Rate limit exceeded for provider '{provider}'")]
    RateLimitExceeded {
        provider: String,
        retry_after_secs: Option<u64>,
    },

    /// API call timed out before the first token.
    #[error("API call timed out after {elapsed_ms}ms")]
    ApiTimeout { elapsed_ms: u64 },

    /// API returned an authentication error (401/403); retry will not help.
    #[error("Authentication error from provider '{provider}': {detail}")]
    AuthError { provider: String, detail: String },

    /// The response stream broke after it had started.
    #[error("Response stream interrupted: {detail}")]
    StreamInterrupted { detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PdfChatError {
    /// Whether retrying the same request may succeed.
    ///
    /// Only rate limits, timeouts and server-side failures qualify; auth,
    /// config and request-shape errors fail the same way every time.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PdfChatError::RateLimitExceeded { .. }
                | PdfChatError::ApiTimeout { .. }
                | PdfChatError::ServiceUnavailable { .. }
        )
    }
}

/// A non-fatal error for a single page.
///
/// Stored on [`crate::document::PageContent`] next to the placeholder that
/// replaced the failed part of the page.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// pdfium could not load the page object at all.
    #[error("Page {page}: could not be loaded: {detail}")]
    LoadFailed { page: usize, detail: String },

    /// Text extraction failed; the page text is a placeholder.
    #[error("Page {page}: text extraction failed: {detail}")]
    TextExtractionFailed { page: usize, detail: String },

    /// Rasterisation failed; the preview is a placeholder.
    #[error("Page {page}: rendering failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// The rendered bitmap could not be encoded.
    #[error("Page {page}: image encoding failed: {detail}")]
    EncodeFailed { page: usize, detail: String },
}

impl PageError {
    /// 1-indexed page number the error belongs to.
    pub fn page(&self) -> usize {
        match self {
            PageError::LoadFailed { page, .. }
            | PageError::TextExtractionFailed { page, .. }
            | PageError::RenderFailed { page, .. }
            | PageError::EncodeFailed { page, .. } => *page,
        }
    }
}
