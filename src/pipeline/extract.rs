//! Per-page text extraction and preview rendering via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! pdfium is a C++ library with process-global state; `pdfium-render`
//! serialises access to it and every call blocks. The whole page loop runs
//! on Tokio's blocking pool so runtime worker threads never stall on it.
//!
//! ## Failure policy
//!
//! Opening the document is all-or-nothing: a corrupt file or a bad password
//! is fatal. After that every page is independent. A page whose text cannot
//! be read gets a placeholder string; a page that cannot be rendered or
//! encoded gets a placeholder preview. The failure is recorded on the page
//! and the loop moves on.

use crate::config::ProcessingConfig;
use crate::document::{DocumentMetadata, PageContent, PageImage};
use crate::error::{PageError, PdfChatError};
use crate::pipeline::{encode, pdfium::bind_pdfium, text};
use crate::progress::ProgressCallback;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Everything read from one PDF.
#[derive(Debug)]
pub struct Extraction {
    pub metadata: DocumentMetadata,
    pub pages: Vec<PageContent>,
}

/// Read the selected pages of a PDF: text, preview and metadata.
pub async fn extract_pages(
    pdf_path: &Path,
    config: &ProcessingConfig,
) -> Result<Extraction, PdfChatError> {
    let path = pdf_path.to_path_buf();
    let config = config.clone();

    tokio::task::spawn_blocking(move || extract_pages_blocking(&path, &config))
        .await
        .map_err(|e| PdfChatError::Internal(format!("Extraction task panicked: {}", e)))?
}

/// Read metadata only; nothing is rendered.
pub async fn extract_metadata(
    pdf_path: &Path,
    password: Option<&str>,
) -> Result<DocumentMetadata, PdfChatError> {
    let path = pdf_path.to_path_buf();
    let pwd = password.map(|s| s.to_string());

    tokio::task::spawn_blocking(move || {
        let pdfium = bind_pdfium()?;
        let document = open_document(&pdfium, &path, pwd.as_deref())?;
        Ok(read_metadata(&document))
    })
    .await
    .map_err(|e| PdfChatError::Internal(format!("Metadata task panicked: {}", e)))?
}

fn extract_pages_blocking(
    pdf_path: &Path,
    config: &ProcessingConfig,
) -> Result<Extraction, PdfChatError> {
    let pdfium = bind_pdfium()?;
    let document = open_document(&pdfium, pdf_path, config.password.as_deref())?;
    let metadata = read_metadata(&document);
    let total_pages = metadata.page_count;
    info!("PDF loaded: {} pages", total_pages);

    let indices = config.pages.to_indices(total_pages);
    if indices.is_empty() {
        return Err(PdfChatError::PageOutOfRange {
            page: first_requested_page(config),
            total: total_pages,
        });
    }

    let progress = config.progress_callback.as_ref();
    if let Some(cb) = progress {
        cb.on_processing_start(indices.len());
    }

    let render_config = PdfRenderConfig::new()
        .set_target_width(config.max_rendered_pixels as i32)
        .set_maximum_height(config.max_rendered_pixels as i32);

    let pages = document.pages();
    let selected = indices.len();
    let mut results = Vec::with_capacity(selected);

    for idx in indices {
        let page_num = idx + 1;
        if let Some(cb) = progress {
            cb.on_page_start(page_num, selected);
        }

        let content = match pages.get(idx as PdfPageIndex) {
            Ok(page) => read_page(&page, page_num, &render_config, config),
            Err(e) => {
                warn!("Page {}: could not be loaded: {:?}", page_num, e);
                PageContent {
                    page_num,
                    text: text::placeholder_text(page_num),
                    image: config.render_previews.then(encode::placeholder_image),
                    errors: vec![PageError::LoadFailed {
                        page: page_num,
                        detail: format!("{e:?}"),
                    }],
                }
            }
        };

        report_page(progress, &content, selected);
        results.push(content);
    }

    if let Some(cb) = progress {
        let clean = results.iter().filter(|p| p.is_clean()).count();
        cb.on_processing_complete(selected, clean);
    }

    Ok(Extraction {
        metadata,
        pages: results,
    })
}

/// Text, then preview, for one page. Never fails; see the module docs.
fn read_page(
    page: &PdfPage,
    page_num: usize,
    render_config: &PdfRenderConfig,
    config: &ProcessingConfig,
) -> PageContent {
    let mut errors = Vec::new();

    let page_text = match page.text() {
        Ok(t) => text::clean_page_text(&t.all()),
        Err(e) => {
            warn!("Page {}: text extraction failed: {:?}", page_num, e);
            errors.push(PageError::TextExtractionFailed {
                page: page_num,
                detail: format!("{e:?}"),
            });
            text::placeholder_text(page_num)
        }
    };

    let image = if config.render_previews {
        let image = render_preview(page, page_num, render_config, config).unwrap_or_else(|e| {
            warn!("{}", e);
            errors.push(e);
            encode::placeholder_image()
        });
        debug!(
            "Page {}: {} chars, {}x{} preview",
            page_num,
            page_text.len(),
            image.width,
            image.height
        );
        Some(image)
    } else {
        debug!("Page {}: {} chars, no preview", page_num, page_text.len());
        None
    };

    PageContent {
        page_num,
        text: page_text,
        image,
        errors,
    }
}

fn render_preview(
    page: &PdfPage,
    page_num: usize,
    render_config: &PdfRenderConfig,
    config: &ProcessingConfig,
) -> Result<PageImage, PageError> {
    let bitmap = page
        .render_with_config(render_config)
        .map_err(|e| PageError::RenderFailed {
            page: page_num,
            detail: format!("{e:?}"),
        })?;

    let image = bitmap.as_image();
    encode::encode_page(&image, config.preview_format, config.jpeg_quality).map_err(|e| {
        PageError::EncodeFailed {
            page: page_num,
            detail: e.to_string(),
        }
    })
}

fn report_page(progress: Option<&ProgressCallback>, content: &PageContent, total: usize) {
    let Some(cb) = progress else { return };
    if content.is_clean() {
        cb.on_page_complete(content.page_num, total, content.text.len());
    } else {
        let msg = content
            .errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        cb.on_page_error(content.page_num, total, &msg);
    }
}

fn open_document<'a>(
    pdfium: &'a Pdfium,
    pdf_path: &Path,
    password: Option<&'a str>,
) -> Result<PdfDocument<'a>, PdfChatError> {
    pdfium
        .load_pdf_from_file(pdf_path, password)
        .map_err(|e| {
            classify_load_error(&format!("{:?}", e), pdf_path.to_path_buf(), password.is_some())
        })
}

/// pdfium reports password problems through its generic error; tell them
/// apart from corruption by the error text.
fn classify_load_error(err_str: &str, path: PathBuf, had_password: bool) -> PdfChatError {
    if err_str.to_ascii_lowercase().contains("password") {
        if had_password {
            PdfChatError::WrongPassword { path }
        } else {
            PdfChatError::PasswordRequired { path }
        }
    } else {
        PdfChatError::CorruptPdf {
            path,
            detail: err_str.to_string(),
        }
    }
}

fn read_metadata(document: &PdfDocument) -> DocumentMetadata {
    let metadata = document.metadata();

    let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
        metadata.get(tag).and_then(|t| {
            let v = t.value().trim().to_string();
            if v.is_empty() {
                None
            } else {
                Some(v)
            }
        })
    };

    DocumentMetadata {
        title: get_meta(PdfDocumentMetadataTagType::Title),
        author: get_meta(PdfDocumentMetadataTagType::Author),
        subject: get_meta(PdfDocumentMetadataTagType::Subject),
        creator: get_meta(PdfDocumentMetadataTagType::Creator),
        producer: get_meta(PdfDocumentMetadataTagType::Producer),
        creation_date: get_meta(PdfDocumentMetadataTagType::CreationDate),
        modification_date: get_meta(PdfDocumentMetadataTagType::ModificationDate),
        page_count: document.pages().len() as usize,
        pdf_version: format!("{:?}", document.version()),
    }
}

fn first_requested_page(config: &ProcessingConfig) -> usize {
    use crate::config::PageSelection;
    match &config.pages {
        PageSelection::All => 0,
        PageSelection::Single(p) => *p,
        PageSelection::Range(start, _) => *start,
        PageSelection::Set(pages) => pages.first().copied().unwrap_or(0),
    }
}
