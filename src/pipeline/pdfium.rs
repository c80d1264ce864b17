//! Locating and binding the pdfium shared library.
//!
//! pdfium-render loads libpdfium at runtime. Lookup order:
//!
//! 1. `PDFIUM_LIB_PATH`: a library file, or a directory containing one
//! 2. the current working directory
//! 3. the directory of the running executable
//! 4. the system library search path
//!
//! The first directory that actually contains the platform library name is
//! remembered for the rest of the process.

use crate::error::PdfChatError;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Environment variable pointing at libpdfium (file or directory).
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

static RESOLVED_LIBRARY: OnceLock<Option<PathBuf>> = OnceLock::new();

/// Bind to pdfium, trying each candidate location in turn.
pub fn bind_pdfium() -> Result<Pdfium, PdfChatError> {
    if let Some(path) = RESOLVED_LIBRARY.get_or_init(find_library) {
        match Pdfium::bind_to_library(path) {
            Ok(bindings) => {
                debug!("Bound pdfium from {}", path.display());
                return Ok(Pdfium::new(bindings));
            }
            Err(e) => warn!("Failed to bind pdfium at {}: {:?}", path.display(), e),
        }
    }

    Pdfium::bind_to_system_library()
        .map(Pdfium::new)
        .map_err(|e| PdfChatError::PdfiumBindingFailed(format!("{e:?}")))
}

/// First existing library file among the candidate locations.
fn find_library() -> Option<PathBuf> {
    candidate_paths().into_iter().find(|p| p.is_file())
}

fn candidate_paths() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(env_path) = std::env::var(PDFIUM_LIB_PATH_ENV) {
        if !env_path.is_empty() {
            candidates.push(library_in(Path::new(&env_path)));
        }
    }
    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(library_in(&cwd));
    }
    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        candidates.push(library_in(&exe_dir));
    }

    candidates
}

/// A directory maps to the platform library name inside it; anything else
/// is taken as the library file itself.
fn library_in(path: &Path) -> PathBuf {
    if path.is_dir() {
        Pdfium::pdfium_platform_library_name_at_path(path)
    } else {
        path.to_path_buf()
    }
}
