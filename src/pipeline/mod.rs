//! Pipeline stages that turn a PDF into chat context.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ pdfium ──▶ extract ──┬─▶ text    (cleanup)
//! (path/URL/bytes)  (bind)       └─▶ encode  (base64 preview)
//! ```
//!
//! 1. [`input`]  : canonicalise a path, URL or byte buffer to a local file
//! 2. [`pdfium`] : locate and bind the pdfium shared library
//! 3. [`extract`]: the per-page loop; runs in `spawn_blocking`
//! 4. [`text`]   : deterministic cleanup of extracted page text
//! 5. [`encode`] : PNG/JPEG encode and base64-wrap each preview

pub mod encode;
pub mod extract;
pub mod input;
pub mod pdfium;
pub mod text;
