//! Upload entry points: turn a PDF into a [`ProcessedDocument`].
//!
//! These are the library's equivalent of "user drops a file": resolve the
//! input, read every selected page, and return a `Ready` record that can be
//! inserted into a [`crate::DocumentLibrary`] and used as chat context.

use crate::config::ProcessingConfig;
use crate::document::{
    DocumentMetadata, DocumentStatus, PageContent, ProcessedDocument, ProcessingStats,
};
use crate::error::{PageError, PdfChatError};
use crate::library::DocumentLibrary;
use crate::pipeline::{extract, input};
use std::time::Instant;
use tracing::{info, warn};

/// Process a PDF file or URL.
///
/// # Returns
/// `Ok(ProcessedDocument)` with one page record per selected page, even when
/// some pages fell back to placeholders (see `stats`).
///
/// # Errors
/// Only fatal conditions: file not found, not a PDF, wrong password,
/// pdfium unavailable, empty page selection.
pub async fn process_pdf(
    input_str: impl AsRef<str>,
    config: &ProcessingConfig,
) -> Result<ProcessedDocument, PdfChatError> {
    let input_str = input_str.as_ref();
    info!("Processing: {}", input_str);

    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    process_resolved(&resolved, config).await
}

/// Process PDF bytes held in memory, e.g. the contents of an upload.
///
/// The bytes go to a managed temp file that is removed before returning.
///
/// # Example
/// ```rust,no_run
/// use pdf_chat::{process_pdf_bytes, ProcessingConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes = std::fs::read("invoice.pdf")?;
/// let doc = process_pdf_bytes("invoice.pdf", &bytes, &ProcessingConfig::default()).await?;
/// println!("{} pages", doc.pages.len());
/// # Ok(())
/// # }
/// ```
pub async fn process_pdf_bytes(
    name: &str,
    bytes: &[u8],
    config: &ProcessingConfig,
) -> Result<ProcessedDocument, PdfChatError> {
    let resolved = input::resolve_bytes(name, bytes)?;
    process_resolved(&resolved, config).await
}

/// Process a PDF straight into a library.
///
/// The entry is registered as `Processing` first and ends up `Ready` or
/// `Failed`; the fatal error is still returned to the caller.
pub async fn upload(
    library: &mut DocumentLibrary,
    input_str: &str,
    config: &ProcessingConfig,
) -> Result<crate::document::DocumentId, PdfChatError> {
    let id = library.begin(&display_name(input_str));
    match process_pdf(input_str, config).await {
        Ok(doc) => {
            library.complete(id, doc)?;
            Ok(id)
        }
        Err(e) => {
            warn!("Upload of '{}' failed: {}", input_str, e);
            library.fail(id, e.to_string())?;
            Err(e)
        }
    }
}

/// Extract PDF metadata without reading pages.
///
/// Only `password` and `download_timeout_secs` of `config` are used.
pub async fn inspect(
    input_str: impl AsRef<str>,
    config: &ProcessingConfig,
) -> Result<DocumentMetadata, PdfChatError> {
    let resolved = input::resolve_input(input_str.as_ref(), config.download_timeout_secs).await?;
    extract::extract_metadata(resolved.path(), config.password.as_deref()).await
}

async fn process_resolved(
    resolved: &input::ResolvedInput,
    config: &ProcessingConfig,
) -> Result<ProcessedDocument, PdfChatError> {
    let start = Instant::now();
    let extraction = extract::extract_pages(resolved.path(), config).await?;

    let mut stats = compute_stats(&extraction.pages, extraction.metadata.page_count);
    stats.duration_ms = start.elapsed().as_millis() as u64;

    info!(
        "Processed '{}': {}/{} pages with text, {} render failures, {}ms",
        resolved.name(),
        stats.text_pages,
        stats.processed_pages,
        stats.render_failures,
        stats.duration_ms
    );

    let mut doc = ProcessedDocument::pending(resolved.name());
    doc.status = DocumentStatus::Ready;
    doc.pages = extraction.pages;
    doc.metadata = extraction.metadata;
    doc.stats = stats;
    Ok(doc)
}

fn compute_stats(pages: &[PageContent], total_pages: usize) -> ProcessingStats {
    let text_failures = pages
        .iter()
        .filter(|p| {
            p.errors.iter().any(|e| {
                matches!(
                    e,
                    PageError::TextExtractionFailed { .. } | PageError::LoadFailed { .. }
                )
            })
        })
        .count();

    ProcessingStats {
        total_pages,
        processed_pages: pages.len(),
        text_pages: pages.iter().filter(|p| p.has_text()).count(),
        text_failures,
        render_failures: pages.iter().filter(|p| p.render_failed()).count(),
        total_chars: pages.iter().map(|p| p.text.chars().count()).sum(),
        duration_ms: 0,
    }
}

/// File name of a path or URL, used as the library entry name.
fn display_name(input_str: &str) -> String {
    let trimmed = input_str.trim_end_matches('/');
    trimmed
        .rsplit(['/', '\\'])
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(trimmed)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::PageImage;
    use crate::pipeline::encode::placeholder_image;

    fn page(n: usize, text: &str, errors: Vec<PageError>, image: Option<PageImage>) -> PageContent {
        PageContent {
            page_num: n,
            text: text.into(),
            image,
            errors,
        }
    }

    fn rendered() -> Option<PageImage> {
        Some(PageImage {
            data: "aGk=".into(),
            mime_type: "image/png".into(),
            width: 2,
            height: 2,
            placeholder: false,
        })
    }

    #[test]
    fn stats_count_fallbacks() {
        let pages = vec![
            page(1, "hello", vec![], rendered()),
            page(
                2,
                "[Page 2: text could not be extracted]",
                vec![PageError::TextExtractionFailed {
                    page: 2,
                    detail: "x".into(),
                }],
                rendered(),
            ),
            page(
                3,
                "",
                vec![PageError::RenderFailed {
                    page: 3,
                    detail: "y".into(),
                }],
                Some(placeholder_image()),
            ),
        ];
        let stats = compute_stats(&pages, 10);
        assert_eq!(stats.total_pages, 10);
        assert_eq!(stats.processed_pages, 3);
        assert_eq!(stats.text_pages, 1);
        assert_eq!(stats.text_failures, 1);
        assert_eq!(stats.render_failures, 1);
    }

    #[test]
    fn text_only_pages_are_not_render_failures() {
        let pages = vec![page(1, "hello", vec![], None), page(2, "world", vec![], None)];
        let stats = compute_stats(&pages, 2);
        assert_eq!(stats.render_failures, 0);
        assert_eq!(stats.text_pages, 2);
        assert!(pages.iter().all(|p| p.is_clean()));
    }

    #[test]
    fn display_name_from_inputs() {
        assert_eq!(display_name("/tmp/docs/a.pdf"), "a.pdf");
        assert_eq!(display_name("https://x.org/files/b.pdf"), "b.pdf");
        assert_eq!(display_name("c.pdf"), "c.pdf");
        assert_eq!(display_name(r"C:\docs\d.pdf"), "d.pdf");
    }

    #[tokio::test]
    async fn failed_upload_is_marked_in_library() {
        let mut lib = DocumentLibrary::new();
        let err = upload(&mut lib, "/no/such/file.pdf", &ProcessingConfig::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, PdfChatError::FileNotFound { .. }));
        let entry = lib.find_by_name("file.pdf").unwrap();
        assert!(matches!(entry.status, DocumentStatus::Failed { .. }));
    }

    #[tokio::test]
    async fn inspect_uses_configured_input_settings() {
        let config = ProcessingConfig::builder()
            .password("secret")
            .download_timeout_secs(5)
            .build()
            .unwrap();
        let err = inspect("/no/such/locked.pdf", &config).await.err().unwrap();
        assert!(matches!(err, PdfChatError::FileNotFound { .. }));
    }
}
