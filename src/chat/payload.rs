//! Assembling the multi-modal request from documents, history and query.
//!
//! There is no retrieval step: every page of every in-scope document goes
//! into the final user turn, text then image, in page order.

use crate::chat::message::{ChatRequest, ChatRole, ChatTurn, Content, Part};
use crate::config::ChatConfig;
use crate::document::ProcessedDocument;
use crate::prompts;

/// Parts describing `documents`, in order.
///
/// Placeholder previews are never attached; `include_images = false` drops
/// all previews.
pub fn document_parts(documents: &[&ProcessedDocument], include_images: bool) -> Vec<Part> {
    let mut parts = Vec::new();

    for doc in documents {
        parts.push(Part::Text(prompts::document_header(&doc.name, doc.pages.len())));
        for page in &doc.pages {
            parts.push(Part::Text(prompts::page_block(page.page_num, &page.text)));
            if !include_images {
                continue;
            }
            if let Some(image) = page.rendered_image().filter(|i| !i.data.is_empty()) {
                parts.push(Part::Image {
                    mime_type: image.mime_type.clone(),
                    data: image.data.clone(),
                });
            }
        }
    }

    parts
}

/// The last `limit` turns of `history`, starting on a user turn so the
/// replayed conversation never opens with an assistant message.
pub fn trim_history(history: &[ChatTurn], limit: usize) -> &[ChatTurn] {
    let start = history.len().saturating_sub(limit);
    let tail = &history[start..];
    match tail.iter().position(|t| t.role == ChatRole::User) {
        Some(first_user) => &tail[first_user..],
        None => &[],
    }
}

/// Build the full request for `query`.
pub fn build_request(
    query: &str,
    documents: &[&ProcessedDocument],
    history: &[ChatTurn],
    config: &ChatConfig,
) -> ChatRequest {
    let mut contents: Vec<Content> = trim_history(history, config.history_limit)
        .iter()
        .map(Content::from)
        .collect();

    let mut parts = if documents.is_empty() {
        vec![Part::text(prompts::NO_DOCUMENTS_NOTICE)]
    } else {
        document_parts(documents, config.include_images)
    };
    parts.push(Part::Text(prompts::question_block(query)));

    contents.push(Content {
        role: ChatRole::User,
        parts,
    });

    ChatRequest {
        model: config.model_or_default().to_string(),
        system_instruction: config
            .system_instruction
            .clone()
            .unwrap_or_else(|| prompts::DEFAULT_SYSTEM_INSTRUCTION.to_string()),
        contents,
        temperature: config.temperature,
        max_tokens: config.max_tokens,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DocumentStatus, PageContent, PageImage};

    fn doc(name: &str, pages: &[(&str, bool)]) -> ProcessedDocument {
        let mut d = ProcessedDocument::pending(name);
        d.status = DocumentStatus::Ready;
        d.pages = pages
            .iter()
            .enumerate()
            .map(|(i, (text, placeholder))| PageContent {
                page_num: i + 1,
                text: text.to_string(),
                image: Some(PageImage {
                    data: format!("IMG{}", i + 1),
                    mime_type: "image/png".into(),
                    width: 1,
                    height: 1,
                    placeholder: *placeholder,
                }),
                errors: vec![],
            })
            .collect();
        d
    }

    #[test]
    fn pages_interleave_text_and_images() {
        let d = doc("a.pdf", &[("one", false), ("two", true), ("three", false)]);
        let parts = document_parts(&[&d], true);
        let kinds: Vec<&str> = parts
            .iter()
            .map(|p| if p.is_image() { "img" } else { "txt" })
            .collect();
        // header, p1, img1, p2 (placeholder image skipped), p3, img3
        assert_eq!(kinds, vec!["txt", "txt", "img", "txt", "txt", "img"]);
        assert_eq!(parts[1].as_text(), Some("--- Page 1 ---\none"));
    }

    #[test]
    fn text_only_pages_send_no_image() {
        let mut d = doc("a.pdf", &[("one", false), ("two", false)]);
        d.pages[1].image = None;
        let parts = document_parts(&[&d], true);
        assert_eq!(parts.iter().filter(|p| p.is_image()).count(), 1);
        assert_eq!(parts.last().and_then(|p| p.as_text()), Some("--- Page 2 ---\ntwo"));
    }

    #[test]
    fn images_can_be_disabled() {
        let d = doc("a.pdf", &[("one", false)]);
        assert!(document_parts(&[&d], false).iter().all(|p| !p.is_image()));
    }

    #[test]
    fn request_ends_with_question() {
        let a = doc("a.pdf", &[("alpha", false)]);
        let b = doc("b.pdf", &[("beta", false)]);
        let config = ChatConfig::default();
        let req = build_request("what?", &[&a, &b], &[], &config);

        assert_eq!(req.contents.len(), 1);
        let last = req.last_user().unwrap();
        assert_eq!(last.parts.last().unwrap().as_text(), Some("Question: what?"));
        assert_eq!(req.image_count(), 2);
        assert_eq!(req.model, crate::config::DEFAULT_MODEL);
        let text = last.joined_text();
        assert!(text.find("a.pdf").unwrap() < text.find("b.pdf").unwrap());
    }

    #[test]
    fn empty_library_adds_notice() {
        let req = build_request("hi", &[], &[], &ChatConfig::default());
        let last = req.last_user().unwrap();
        assert_eq!(last.parts[0].as_text(), Some(prompts::NO_DOCUMENTS_NOTICE));
    }

    #[test]
    fn history_is_replayed_before_the_new_turn() {
        let history = vec![ChatTurn::user("q1"), ChatTurn::assistant("a1")];
        let req = build_request("q2", &[], &history, &ChatConfig::default());
        let roles: Vec<ChatRole> = req.contents.iter().map(|c| c.role).collect();
        assert_eq!(roles, vec![ChatRole::User, ChatRole::Assistant, ChatRole::User]);
        assert_eq!(req.contents[0].joined_text(), "q1");
    }

    #[test]
    fn trim_history_starts_on_user_turn() {
        let history = vec![
            ChatTurn::user("q1"),
            ChatTurn::assistant("a1"),
            ChatTurn::user("q2"),
            ChatTurn::assistant("a2"),
        ];
        assert_eq!(trim_history(&history, 3).len(), 2);
        assert_eq!(trim_history(&history, 3)[0].text, "q2");
        assert_eq!(trim_history(&history, 10).len(), 4);
        assert!(trim_history(&history, 0).is_empty());
    }

    #[test]
    fn custom_system_instruction_is_used() {
        let config = ChatConfig::builder()
            .system_instruction("be brief")
            .build()
            .unwrap();
        let req = build_request("hi", &[], &[], &config);
        assert_eq!(req.system_instruction, "be brief");
    }
}
