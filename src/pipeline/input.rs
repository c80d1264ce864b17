//! Input resolution: turn a path, URL or byte buffer into a local PDF file.
//!
//! pdfium opens documents from a file-system path, so every input ends up as
//! a file. Downloads and in-memory uploads go to temp storage owned by
//! [`ResolvedInput`], which removes it on drop. The `%PDF` magic bytes are
//! checked up front so callers get a meaningful error instead of a pdfium
//! parse failure.

use crate::error::PdfChatError;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempDir};
use tracing::{debug, info};

/// The resolved input and the name it should be displayed under.
pub enum ResolvedInput {
    /// Input was already a local file.
    Local { path: PathBuf, name: String },
    /// Input was a URL; the PDF lives in a temp directory.
    Downloaded {
        path: PathBuf,
        name: String,
        _temp_dir: TempDir,
    },
    /// Input was a byte buffer written to a temp file.
    Buffered { name: String, file: NamedTempFile },
}

impl ResolvedInput {
    /// Path to the PDF file regardless of how it was resolved.
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local { path, .. } => path,
            ResolvedInput::Downloaded { path, .. } => path,
            ResolvedInput::Buffered { file, .. } => file.path(),
        }
    }

    /// Display name: the file name of the path or URL, or the caller's name.
    pub fn name(&self) -> &str {
        match self {
            ResolvedInput::Local { name, .. }
            | ResolvedInput::Downloaded { name, .. }
            | ResolvedInput::Buffered { name, .. } => name,
        }
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to a local PDF file.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, PdfChatError> {
    if input.trim().is_empty() {
        return Err(PdfChatError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input)
    }
}

/// Write an in-memory PDF to a managed temp file.
pub fn resolve_bytes(name: &str, bytes: &[u8]) -> Result<ResolvedInput, PdfChatError> {
    let name = if name.trim().is_empty() {
        "document.pdf".to_string()
    } else {
        name.to_string()
    };
    if bytes.len() < 4 || &bytes[..4] != b"%PDF" {
        let mut magic = [0u8; 4];
        let n = bytes.len().min(4);
        magic[..n].copy_from_slice(&bytes[..n]);
        return Err(PdfChatError::NotAPdf {
            path: PathBuf::from(&name),
            magic,
        });
    }

    let mut file = tempfile::Builder::new()
        .suffix(".pdf")
        .tempfile()
        .map_err(|e| PdfChatError::Internal(format!("tempfile: {e}")))?;
    file.write_all(bytes)
        .map_err(|e| PdfChatError::Internal(format!("tempfile write: {e}")))?;

    debug!("Buffered {} bytes for '{}'", bytes.len(), name);
    Ok(ResolvedInput::Buffered { name, file })
}

/// Resolve a local file path, validating existence and PDF magic bytes.
fn resolve_local(path_str: &str) -> Result<ResolvedInput, PdfChatError> {
    let path = PathBuf::from(path_str);

    if !path.exists() {
        return Err(PdfChatError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_err() || &magic != b"%PDF" {
                return Err(PdfChatError::NotAPdf { path, magic });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(PdfChatError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(PdfChatError::FileNotFound { path });
        }
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path_str.to_string());

    debug!("Resolved local PDF: {}", path.display());
    Ok(ResolvedInput::Local { path, name })
}

/// Download a URL to a temporary directory.
async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, PdfChatError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| PdfChatError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            PdfChatError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            PdfChatError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(PdfChatError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let filename = filename_from_url(url);
    let temp_dir = TempDir::new().map_err(|e| PdfChatError::Internal(e.to_string()))?;
    let file_path = temp_dir.path().join(&filename);

    let bytes = response.bytes().await.map_err(|e| {
        if e.is_timeout() {
            PdfChatError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            PdfChatError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if bytes.len() < 4 || &bytes[..4] != b"%PDF" {
        let mut magic = [0u8; 4];
        let n = bytes.len().min(4);
        magic[..n].copy_from_slice(&bytes[..n]);
        return Err(PdfChatError::NotAPdf {
            path: file_path,
            magic,
        });
    }

    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| PdfChatError::Internal(format!("Failed to write temp file: {}", e)))?;

    info!("Downloaded {} bytes to: {}", bytes.len(), file_path.display());

    Ok(ResolvedInput::Downloaded {
        path: file_path,
        name: filename,
        _temp_dir: temp_dir,
    })
}

/// Last non-empty path segment of the URL, `.pdf` appended when it has no
/// extension (arXiv-style `/pdf/1706.03762` links).
fn filename_from_url(url: &str) -> String {
    let last = reqwest::Url::parse(url).ok().and_then(|parsed| {
        parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back().map(str::to_string))
    });

    match last {
        Some(seg) if seg.to_ascii_lowercase().ends_with(".pdf") => seg,
        Some(seg) if !seg.is_empty() => format!("{seg}.pdf"),
        _ => "downloaded.pdf".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn filename_from_url_variants() {
        assert_eq!(filename_from_url("https://x.org/a/paper.pdf"), "paper.pdf");
        assert_eq!(filename_from_url("https://arxiv.org/pdf/1706.03762"), "1706.03762.pdf");
        assert_eq!(filename_from_url("https://x.org/"), "downloaded.pdf");
    }

    #[tokio::test]
    async fn missing_file_is_reported() {
        let err = resolve_input("/definitely/not/here.pdf", 5).await.err().unwrap();
        assert!(matches!(err, PdfChatError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn non_pdf_file_is_rejected() {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(b"hello world").unwrap();
        let err = resolve_input(f.path().to_str().unwrap(), 5)
            .await
            .err()
            .unwrap();
        match err {
            PdfChatError::NotAPdf { magic, .. } => assert_eq!(&magic, b"hell"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn local_pdf_keeps_file_name() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Quarterly.pdf");
        std::fs::write(&path, b"%PDF-1.7\n%%EOF").unwrap();
        let resolved = resolve_input(path.to_str().unwrap(), 5).await.unwrap();
        assert_eq!(resolved.name(), "Quarterly.pdf");
        assert_eq!(resolved.path(), path.as_path());
    }

    #[test]
    fn bytes_are_buffered_to_temp_file() {
        let resolved = resolve_bytes("upload.pdf", b"%PDF-1.4 body").unwrap();
        assert_eq!(resolved.name(), "upload.pdf");
        assert_eq!(std::fs::read(resolved.path()).unwrap(), b"%PDF-1.4 body");

        let err = resolve_bytes("x.pdf", b"PK").err().unwrap();
        assert!(matches!(err, PdfChatError::NotAPdf { .. }));
    }
}
