//! Value records produced by processing: documents, pages and previews.

use crate::error::{PageError, PdfChatError};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque identifier assigned to a document when it is uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(Uuid);

impl DocumentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Where a document is in its upload lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentStatus {
    /// Registered, pages not available yet.
    Processing,
    /// Pages extracted; the document can be used in chat.
    Ready,
    /// Processing hit a fatal error.
    Failed { reason: String },
}

/// A rendered page preview, base64-encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageImage {
    /// Base64 (standard alphabet, padded) of the encoded image.
    pub data: String,
    /// `image/png` or `image/jpeg`.
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
    /// True when this is the fallback image for a page that failed to render.
    pub placeholder: bool,
}

impl PageImage {
    /// Decode the base64 payload back to raw image bytes.
    pub fn decode(&self) -> Result<Vec<u8>, PdfChatError> {
        STANDARD
            .decode(&self.data)
            .map_err(|e| PdfChatError::Internal(format!("preview is not valid base64: {e}")))
    }

    /// File extension matching `mime_type`.
    pub fn extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/jpeg" => "jpg",
            _ => "png",
        }
    }
}

/// One page of a processed document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageContent {
    /// 1-indexed page number in the source PDF.
    pub page_num: usize,
    /// Cleaned page text, or a placeholder when extraction failed.
    pub text: String,
    /// Rendered preview. `None` when previews were not rendered.
    #[serde(default)]
    pub image: Option<PageImage>,
    /// Non-fatal problems hit while reading this page.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<PageError>,
}

impl PageContent {
    /// True when neither text nor preview needed a fallback.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
            && !self.errors.iter().any(|e| {
                matches!(
                    e,
                    PageError::TextExtractionFailed { .. } | PageError::LoadFailed { .. }
                )
            })
    }

    /// True when the page failed to load, render or encode.
    pub fn render_failed(&self) -> bool {
        self.errors.iter().any(|e| {
            matches!(
                e,
                PageError::RenderFailed { .. }
                    | PageError::EncodeFailed { .. }
                    | PageError::LoadFailed { .. }
            )
        })
    }

    /// The rendered preview, unless it is the fallback image.
    pub fn rendered_image(&self) -> Option<&PageImage> {
        self.image.as_ref().filter(|i| !i.placeholder)
    }
}

/// Metadata read from the PDF's information dictionary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub creation_date: Option<String>,
    pub modification_date: Option<String>,
    pub page_count: usize,
    pub pdf_version: String,
}

/// Counters collected while processing a document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingStats {
    /// Pages in the PDF.
    pub total_pages: usize,
    /// Pages selected for processing.
    pub processed_pages: usize,
    /// Pages whose text is real extracted text.
    pub text_pages: usize,
    /// Pages whose text is the extraction placeholder.
    pub text_failures: usize,
    /// Pages that could not be loaded, rendered or encoded.
    pub render_failures: usize,
    pub total_chars: usize,
    pub duration_ms: u64,
}

/// A document with its extracted pages, ready to be used as chat context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedDocument {
    pub id: DocumentId,
    /// Display name, normally the file name. Mentions match against it.
    pub name: String,
    pub status: DocumentStatus,
    pub pages: Vec<PageContent>,
    pub metadata: DocumentMetadata,
    pub stats: ProcessingStats,
}

impl ProcessedDocument {
    /// A record with no pages yet, in the `Processing` state.
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            id: DocumentId::new(),
            name: name.into(),
            status: DocumentStatus::Processing,
            pages: Vec::new(),
            metadata: DocumentMetadata::default(),
            stats: ProcessingStats::default(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status == DocumentStatus::Ready
    }

    /// All page texts joined in page order.
    pub fn text(&self) -> String {
        self.pages
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Preview for a 1-indexed page, if that page was processed.
    pub fn preview(&self, page_num: usize) -> Option<&PageImage> {
        self.pages
            .iter()
            .find(|p| p.page_num == page_num)
            .and_then(|p| p.image.as_ref())
    }

    /// The name without a trailing `.pdf` extension.
    pub fn stem(&self) -> &str {
        strip_pdf_extension(&self.name)
    }

    /// Comparison key for the name; see [`name_key`].
    pub fn name_key(&self) -> String {
        name_key(&self.name)
    }
}

/// Key under which two document names are the same name: trimmed,
/// lowercased, `.pdf` stripped. Library uniqueness, name lookup and
/// `@mention` matching all compare these keys.
pub fn name_key(name: &str) -> String {
    strip_pdf_extension(name.trim()).trim().to_lowercase()
}

/// Strip a case-insensitive `.pdf` suffix.
pub(crate) fn strip_pdf_extension(name: &str) -> &str {
    let len = name.len();
    if len > 4 && name.is_char_boundary(len - 4) && name[len - 4..].eq_ignore_ascii_case(".pdf") {
        &name[..len - 4]
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(n: usize, text: &str) -> PageContent {
        PageContent {
            page_num: n,
            text: text.to_string(),
            image: Some(PageImage {
                data: STANDARD.encode(b"img"),
                mime_type: "image/png".into(),
                width: 1,
                height: 1,
                placeholder: false,
            }),
            errors: vec![],
        }
    }

    #[test]
    fn text_joins_pages_in_order() {
        let mut doc = ProcessedDocument::pending("a.pdf");
        doc.pages = vec![page(1, "first"), page(2, "second")];
        assert_eq!(doc.text(), "first\n\nsecond");
        assert_eq!(doc.preview(2).map(|i| i.width), Some(1));
        assert!(doc.preview(3).is_none());
    }

    #[test]
    fn stem_strips_pdf_case_insensitively() {
        assert_eq!(strip_pdf_extension("Report.PDF"), "Report");
        assert_eq!(strip_pdf_extension("notes.pdf"), "notes");
        assert_eq!(strip_pdf_extension(".pdf"), ".pdf");
        assert_eq!(strip_pdf_extension("plain"), "plain");
    }

    #[test]
    fn page_without_text_is_flagged() {
        let mut p = page(3, "[Page 3: text could not be extracted]");
        p.errors.push(PageError::TextExtractionFailed {
            page: 3,
            detail: "boom".into(),
        });
        assert!(!p.has_text());
        assert!(!p.is_clean());
        assert!(page(1, "hello").has_text());
        assert!(!page(1, "  ").has_text());
    }

    #[test]
    fn image_decodes() {
        let p = page(1, "x");
        let image = p.rendered_image().unwrap();
        assert_eq!(image.decode().unwrap(), b"img");
        assert_eq!(image.extension(), "png");
    }

    #[test]
    fn render_failure_comes_from_errors_not_the_image() {
        let mut p = page(2, "text");
        p.image = None;
        assert!(!p.render_failed());
        assert!(p.rendered_image().is_none());

        p.errors.push(PageError::EncodeFailed {
            page: 2,
            detail: "png".into(),
        });
        assert!(p.render_failed());
    }

    #[test]
    fn name_keys_fold_unicode_case() {
        assert_eq!(name_key("Émile.PDF"), name_key("émile.pdf"));
        assert_eq!(name_key("  Report.pdf "), "report");
        assert_ne!(name_key("report (2).pdf"), name_key("report.pdf"));
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(DocumentId::new(), DocumentId::new());
    }
}
