//! A conversation over the document library.
//!
//! [`ChatSession`] owns the resolved backend, the chat config and the turn
//! history. Each question is scoped by its `@mentions`, packed together
//! with the selected documents and prior turns, and streamed back.

use crate::chat::backend::{ChatBackend, TextStream};
use crate::chat::mention;
use crate::chat::message::{ChatRequest, ChatTurn};
use crate::chat::payload::build_request;
use crate::chat::provider::resolve_backend;
use crate::config::ChatConfig;
use crate::error::PdfChatError;
use crate::library::DocumentLibrary;
use futures::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// A request ready to send, with what the mention scoping decided.
#[derive(Debug, Clone)]
pub struct PreparedPrompt {
    pub request: ChatRequest,
    /// Names of the documents in the request, in library order.
    pub documents: Vec<String>,
    pub mentions: Vec<String>,
    pub unmatched_mentions: Vec<String>,
    /// True when mentions narrowed the documents.
    pub scoped: bool,
}

/// An in-flight reply.
pub struct ReplyStream {
    pub documents: Vec<String>,
    pub mentions: Vec<String>,
    pub unmatched_mentions: Vec<String>,
    pub stream: TextStream,
}

/// A completed reply.
#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub text: String,
    pub documents_used: Vec<String>,
    pub mentions: Vec<String>,
    pub unmatched_mentions: Vec<String>,
    /// Number of streamed chunks the text arrived in.
    pub chunks: usize,
    pub duration_ms: u64,
}

pub struct ChatSession {
    config: ChatConfig,
    backend: Arc<dyn ChatBackend>,
    history: Vec<ChatTurn>,
}

impl ChatSession {
    /// Create a session, resolving the backend from `config` and the
    /// environment.
    pub fn new(config: ChatConfig) -> Result<Self, PdfChatError> {
        let backend = resolve_backend(&config)?;
        info!("Chat backend: {} ({})", backend.name(), backend.model());
        Ok(Self::with_backend(backend, config))
    }

    pub fn with_backend(backend: Arc<dyn ChatBackend>, config: ChatConfig) -> Self {
        Self {
            config,
            backend,
            history: Vec::new(),
        }
    }

    pub fn backend(&self) -> &Arc<dyn ChatBackend> {
        &self.backend
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Append a completed question/answer pair.
    pub fn record_exchange(&mut self, query: &str, reply: &str) {
        self.history.push(ChatTurn::user(query));
        self.history.push(ChatTurn::assistant(reply));
    }

    /// Scope `query` against `library` and build the request.
    pub fn prepare(
        &self,
        library: &DocumentLibrary,
        query: &str,
    ) -> Result<PreparedPrompt, PdfChatError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(PdfChatError::EmptyQuery);
        }

        let scope = mention::scope(query, library.iter());
        if !scope.unmatched.is_empty() {
            warn!("Unknown document mentions: {}", scope.unmatched.join(", "));
        }

        let mut request = build_request(query, &scope.documents, &self.history, &self.config);
        if !self.backend.model().is_empty() {
            request.model = self.backend.model().to_string();
        }
        debug!(
            "Prepared request: {} documents, {} turns, {} images",
            scope.documents.len(),
            request.contents.len(),
            request.image_count()
        );

        Ok(PreparedPrompt {
            documents: scope.document_names(),
            mentions: scope.mentions,
            unmatched_mentions: scope.unmatched,
            scoped: scope.scoped,
            request,
        })
    }

    /// Send `query` and return the reply as a stream. History is untouched.
    pub async fn stream(
        &self,
        library: &DocumentLibrary,
        query: &str,
    ) -> Result<ReplyStream, PdfChatError> {
        let prepared = self.prepare(library, query)?;
        let stream = self.backend.stream_chat(&prepared.request).await?;
        Ok(ReplyStream {
            documents: prepared.documents,
            mentions: prepared.mentions,
            unmatched_mentions: prepared.unmatched_mentions,
            stream,
        })
    }

    /// Ask `query` and wait for the full reply.
    pub async fn ask(
        &mut self,
        library: &DocumentLibrary,
        query: &str,
    ) -> Result<ChatReply, PdfChatError> {
        self.ask_with(library, query, |_| {}).await
    }

    /// Ask `query`, calling `on_chunk` with each piece of text as it
    /// arrives. The exchange is recorded only when the reply completes with
    /// non-empty text.
    pub async fn ask_with<F>(
        &mut self,
        library: &DocumentLibrary,
        query: &str,
        mut on_chunk: F,
    ) -> Result<ChatReply, PdfChatError>
    where
        F: FnMut(&str),
    {
        let start = Instant::now();
        let ReplyStream {
            documents,
            mentions,
            unmatched_mentions,
            mut stream,
        } = self.stream(library, query).await?;

        let mut text = String::new();
        let mut chunks = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if chunk.is_empty() {
                continue;
            }
            on_chunk(&chunk);
            text.push_str(&chunk);
            chunks += 1;
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        if text.trim().is_empty() {
            warn!("{} returned an empty reply", self.backend.name());
        } else {
            self.record_exchange(query.trim(), &text);
        }
        info!(
            "Reply: {} chars in {} chunks from {} documents, {}ms",
            text.len(),
            chunks,
            documents.len(),
            duration_ms
        );

        Ok(ChatReply {
            text,
            documents_used: documents,
            mentions,
            unmatched_mentions,
            chunks,
            duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DocumentStatus, PageContent, PageImage, ProcessedDocument};
    use async_trait::async_trait;
    use futures::stream;
    use std::sync::Mutex;

    /// Replies with fixed chunks and remembers every request.
    struct Scripted {
        chunks: Vec<Result<String, PdfChatError>>,
        seen: Mutex<Vec<ChatRequest>>,
    }

    impl Scripted {
        fn new(chunks: Vec<Result<String, PdfChatError>>) -> Arc<Self> {
            Arc::new(Self {
                chunks,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ChatBackend for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn model(&self) -> &str {
            "scripted-1"
        }

        async fn stream_chat(&self, request: &ChatRequest) -> Result<TextStream, PdfChatError> {
            self.seen.lock().unwrap().push(request.clone());
            let items: Vec<Result<String, PdfChatError>> = self
                .chunks
                .iter()
                .map(|c| match c {
                    Ok(s) => Ok(s.clone()),
                    Err(_) => Err(PdfChatError::StreamInterrupted {
                        detail: "connection reset".into(),
                    }),
                })
                .collect();
            Ok(Box::pin(stream::iter(items)))
        }
    }

    fn library() -> DocumentLibrary {
        let mut lib = DocumentLibrary::new();
        for name in ["alpha.pdf", "beta.pdf"] {
            let mut doc = ProcessedDocument::pending(name);
            doc.status = DocumentStatus::Ready;
            doc.pages = vec![PageContent {
                page_num: 1,
                text: format!("text of {name}"),
                image: Some(PageImage {
                    data: "QUJD".into(),
                    mime_type: "image/png".into(),
                    width: 1,
                    height: 1,
                    placeholder: false,
                }),
                errors: vec![],
            }];
            lib.insert(doc);
        }
        lib
    }

    fn ok(chunks: &[&str]) -> Vec<Result<String, PdfChatError>> {
        chunks.iter().map(|c| Ok(c.to_string())).collect()
    }

    #[tokio::test]
    async fn ask_streams_and_records() {
        let backend = Scripted::new(ok(&["Hel", "lo"]));
        let mut session = ChatSession::with_backend(backend.clone(), ChatConfig::default());
        let mut seen = Vec::new();

        let reply = session
            .ask_with(&library(), "  hi @beta ", |c| seen.push(c.to_string()))
            .await
            .unwrap();

        assert_eq!(reply.text, "Hello");
        assert_eq!(reply.chunks, 2);
        assert_eq!(seen, vec!["Hel", "lo"]);
        assert_eq!(reply.documents_used, vec!["beta.pdf"]);
        assert_eq!(
            session.history(),
            &[ChatTurn::user("hi @beta"), ChatTurn::assistant("Hello")]
        );

        let requests = backend.seen.lock().unwrap();
        assert_eq!(requests[0].model, "scripted-1");
        assert!(!requests[0].last_user().unwrap().joined_text().contains("alpha.pdf"));
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let session = ChatSession::with_backend(Scripted::new(ok(&["x"])), ChatConfig::default());
        assert!(matches!(
            session.prepare(&library(), "   "),
            Err(PdfChatError::EmptyQuery)
        ));
    }

    #[tokio::test]
    async fn history_is_sent_with_follow_up() {
        let backend = Scripted::new(ok(&["answer"]));
        let mut session = ChatSession::with_backend(backend.clone(), ChatConfig::default());
        let lib = library();
        session.ask(&lib, "first").await.unwrap();
        session.ask(&lib, "second").await.unwrap();

        let requests = backend.seen.lock().unwrap();
        assert_eq!(requests[1].contents.len(), 3);
        assert_eq!(requests[1].contents[0].joined_text(), "first");
        assert_eq!(session.history().len(), 4);
    }

    #[tokio::test]
    async fn failed_or_empty_replies_are_not_recorded() {
        let mut broken = ok(&["partial"]);
        broken.push(Err(PdfChatError::Internal(String::new())));
        let mut session = ChatSession::with_backend(Scripted::new(broken), ChatConfig::default());
        let err = session.ask(&library(), "q").await.err().unwrap();
        assert!(matches!(err, PdfChatError::StreamInterrupted { .. }));
        assert!(session.history().is_empty());

        let mut session =
            ChatSession::with_backend(Scripted::new(ok(&["", "  "])), ChatConfig::default());
        let reply = session.ask(&library(), "q").await.unwrap();
        assert_eq!(reply.text.trim(), "");
        assert!(session.history().is_empty());
    }

    #[tokio::test]
    async fn stream_leaves_history_alone() {
        let session =
            ChatSession::with_backend(Scripted::new(ok(&["a", "b"])), ChatConfig::default());
        let reply = session.stream(&library(), "@gamma?").await.unwrap();
        assert_eq!(reply.unmatched_mentions, vec!["gamma"]);
        assert_eq!(reply.documents.len(), 2);
        let text: Vec<String> = reply.stream.map(|c| c.unwrap()).collect().await;
        assert_eq!(text.concat(), "ab");
        assert!(session.history().is_empty());
    }
}
