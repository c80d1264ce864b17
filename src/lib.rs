//! # pdf-chat
//!
//! Load PDF documents and ask questions about them with a multi-modal model.
//!
//! Each page is reduced to two things the model can read: its extracted
//! text and a rendered preview image. There is no retrieval index. Every
//! page of every document in scope is sent with the question, so answers
//! can draw on tables, figures and scanned pages that text extraction
//! misses. `@name` mentions in a question narrow the documents in scope.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input    resolve local file, download URL, or buffer bytes
//!  ├─ 2. Extract  per-page text + rendered preview via pdfium (spawn_blocking)
//!  ├─ 3. Encode   preview → base64 PNG/JPEG, placeholders on failure
//!  └─ 4. Library  ProcessedDocument stored under a unique name
//!
//! question
//!  │
//!  ├─ 5. Scope    @mentions select documents
//!  ├─ 6. Payload  system instruction + history + pages (text, image) + question
//!  └─ 7. Stream   Gemini SSE or any edgequake-llm provider
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf_chat::{upload, ChatConfig, ChatSession, DocumentLibrary, ProcessingConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut library = DocumentLibrary::new();
//!     upload(&mut library, "report.pdf", &ProcessingConfig::default()).await?;
//!
//!     // Backend picked from GEMINI_API_KEY / EDGEQUAKE_LLM_PROVIDER / ...
//!     let mut session = ChatSession::new(ChatConfig::default())?;
//!     let reply = session
//!         .ask_with(&library, "Summarise @report", |chunk| print!("{chunk}"))
//!         .await?;
//!     eprintln!("\n{} chunks, {}ms", reply.chunks, reply.duration_ms);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdfchat` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! ## pdfium
//!
//! The pdfium shared library is looked up in `PDFIUM_LIB_PATH`, the current
//! directory, next to the executable, then on the system library path.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod chat;
pub mod config;
pub mod document;
pub mod error;
pub mod export;
pub mod library;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use chat::{ChatBackend, ChatReply, ChatRole, ChatSession, ChatTurn, ReplyStream};
pub use config::{
    ChatConfig, ChatConfigBuilder, PageSelection, PreviewFormat, ProcessingConfig,
    ProcessingConfigBuilder, DEFAULT_MODEL,
};
pub use document::{
    DocumentId, DocumentMetadata, DocumentStatus, PageContent, PageImage, ProcessedDocument,
    ProcessingStats,
};
pub use error::{PageError, PdfChatError};
pub use export::{write_json, write_previews};
pub use library::DocumentLibrary;
pub use process::{inspect, process_pdf, process_pdf_bytes, upload};
pub use progress::{NoopProgressCallback, ProcessingProgressCallback, ProgressCallback};
