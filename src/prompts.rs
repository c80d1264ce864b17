//! Prompt text used when assembling chat requests.
//!
//! Every fixed string the model sees lives here so wording changes happen in
//! one place and tests can inspect them without a live API. Callers can
//! replace the system instruction via
//! [`crate::config::ChatConfig::system_instruction`].

/// Default system instruction for answering questions about uploaded PDFs.
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = r#"You are a helpful assistant that answers questions about PDF documents the user has uploaded.

The user's message contains the documents in scope. Each document starts with a header line giving its name and page count, followed by its pages in order. Every page is given as a "--- Page N ---" marker with the text extracted from that page, usually followed by an image of the rendered page.

Follow these rules:

1. Base your answers on the provided documents. If the documents do not contain the answer, say so plainly before offering general knowledge.
2. Use the page images for anything the extracted text misses: tables, charts, figures, handwriting, scanned pages and layout.
3. When you state a fact taken from a document, cite it as (document name, p. N).
4. When several documents are in scope, say which document each point comes from and point out where they disagree.
5. Answer in the language of the user's question.
6. Format answers in Markdown. Keep them concise unless the user asks for detail."#;

/// Sent in place of document context when nothing is loaded.
pub const NO_DOCUMENTS_NOTICE: &str =
    "No documents are loaded. Answer from general knowledge and mention that no PDF has been uploaded.";

/// Header introducing a document in the context.
pub fn document_header(name: &str, page_count: usize) -> String {
    let unit = if page_count == 1 { "page" } else { "pages" };
    format!("Document \"{name}\" ({page_count} {unit})")
}

/// Marker and text for one page.
pub fn page_block(page_num: usize, text: &str) -> String {
    format!("--- Page {page_num} ---\n{text}")
}

/// Line placed before the user's question once documents are listed.
pub fn question_block(query: &str) -> String {
    format!("Question: {query}")
}
