//! Chatting with the loaded documents.
//!
//! ```text
//! query ─► mention::scope ─► payload::build_request ─► ChatBackend::stream_chat
//!                                                        ├─ GeminiBackend   (SSE)
//!                                                        └─ ProviderBackend (edgequake-llm)
//! ```

pub mod backend;
pub mod gemini;
pub mod mention;
pub mod message;
pub mod payload;
pub mod provider;
pub mod session;

pub use backend::{ChatBackend, RetryPolicy, TextStream};
pub use gemini::GeminiBackend;
pub use mention::{parse_mentions, scope, MentionScope};
pub use message::{ChatRequest, ChatRole, ChatTurn, Content, Part};
pub use provider::{resolve_backend, ProviderBackend};
pub use session::{ChatReply, ChatSession, PreparedPrompt, ReplyStream};
