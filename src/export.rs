//! Writing processed documents to disk: preview images and JSON dumps.

use crate::document::ProcessedDocument;
use crate::error::PdfChatError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Write every rendered preview of `doc` into `dir`. Fallback images and
/// text-only pages are skipped.
///
/// Files are named `<stem>-page-<N>.<ext>`. Returns the written paths in
/// page order.
pub async fn write_previews(
    doc: &ProcessedDocument,
    dir: impl AsRef<Path>,
) -> Result<Vec<PathBuf>, PdfChatError> {
    let dir = dir.as_ref();
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| PdfChatError::OutputWriteFailed {
            path: dir.to_path_buf(),
            source: e,
        })?;

    let stem = sanitize_file_stem(doc.stem());
    let mut written = Vec::new();

    for page in &doc.pages {
        let Some(image) = page.rendered_image() else {
            continue;
        };
        let path = dir.join(format!("{stem}-page-{}.{}", page.page_num, image.extension()));
        let bytes = image.decode()?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| PdfChatError::OutputWriteFailed {
                path: path.clone(),
                source: e,
            })?;
        debug!("Wrote preview {}", path.display());
        written.push(path);
    }

    Ok(written)
}

/// Write `doc` as pretty JSON.
///
/// With `include_images` off the base64 preview payloads are blanked, which
/// keeps the dump readable. Uses an atomic write (temp file + rename).
pub async fn write_json(
    doc: &ProcessedDocument,
    path: impl AsRef<Path>,
    include_images: bool,
) -> Result<(), PdfChatError> {
    let path = path.as_ref();
    let json = to_json(doc, include_images)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| PdfChatError::OutputWriteFailed {
                path: path.to_path_buf(),
                source: e,
            })?;
    }

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, json)
        .await
        .map_err(|e| PdfChatError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| PdfChatError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })
}

/// Serialise `doc`, optionally without preview payloads.
pub fn to_json(doc: &ProcessedDocument, include_images: bool) -> Result<String, PdfChatError> {
    let result = if include_images {
        serde_json::to_string_pretty(doc)
    } else {
        let mut slim = doc.clone();
        for image in slim.pages.iter_mut().filter_map(|p| p.image.as_mut()) {
            image.data.clear();
        }
        serde_json::to_string_pretty(&slim)
    };
    result.map_err(|e| PdfChatError::Internal(format!("JSON serialisation failed: {e}")))
}

fn sanitize_file_stem(stem: &str) -> String {
    let cleaned: String = stem
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "document".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PreviewFormat;
    use crate::document::{DocumentStatus, PageContent};
    use crate::pipeline::encode::{encode_page, placeholder_image};
    use image::{DynamicImage, Rgba, RgbaImage};

    fn sample_doc() -> ProcessedDocument {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([0, 0, 255, 255])));
        let mut doc = ProcessedDocument::pending("My Report.pdf");
        doc.status = DocumentStatus::Ready;
        doc.pages = vec![
            PageContent {
                page_num: 1,
                text: "one".into(),
                image: Some(encode_page(&img, PreviewFormat::Png, 85).unwrap()),
                errors: vec![],
            },
            PageContent {
                page_num: 2,
                text: "two".into(),
                image: Some(placeholder_image()),
                errors: vec![],
            },
            PageContent {
                page_num: 3,
                text: "three".into(),
                image: None,
                errors: vec![],
            },
        ];
        doc
    }

    #[tokio::test]
    async fn previews_skip_placeholders() {
        let dir = tempfile::TempDir::new().unwrap();
        let written = write_previews(&sample_doc(), dir.path()).await.unwrap();
        assert_eq!(written.len(), 1);
        assert!(written[0].ends_with("My_Report-page-1.png"));
        let bytes = std::fs::read(&written[0]).unwrap();
        assert!(image::load_from_memory(&bytes).is_ok());
    }

    #[tokio::test]
    async fn json_dump_is_atomic_and_slim() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("out/doc.json");
        write_json(&sample_doc(), &path, false).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let back: ProcessedDocument = serde_json::from_str(&text).unwrap();
        assert_eq!(back.name, "My Report.pdf");
        assert!(back
            .pages
            .iter()
            .filter_map(|p| p.image.as_ref())
            .all(|i| i.data.is_empty()));
        assert!(back.pages[2].image.is_none());
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn stem_sanitising() {
        assert_eq!(sanitize_file_stem("a/b c"), "a_b_c");
        assert_eq!(sanitize_file_stem(""), "document");
    }
}
