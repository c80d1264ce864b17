//! Chat turns and request parts.

use serde::{Deserialize, Serialize};

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// A message in the conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub text: String,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            text: text.into(),
        }
    }
}

/// One element of a multi-part turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Part {
    Text(String),
    /// Base64 image data with its mime type.
    Image { mime_type: String, data: String },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text(text.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text(t) => Some(t),
            Part::Image { .. } => None,
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, Part::Image { .. })
    }
}

/// A turn as sent to the model: role plus ordered parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub role: ChatRole,
    pub parts: Vec<Part>,
}

impl Content {
    /// All text parts joined with blank lines; images are skipped.
    pub fn joined_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(Part::as_text)
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn image_count(&self) -> usize {
        self.parts.iter().filter(|p| p.is_image()).count()
    }
}

impl From<&ChatTurn> for Content {
    fn from(turn: &ChatTurn) -> Self {
        Content {
            role: turn.role,
            parts: vec![Part::Text(turn.text.clone())],
        }
    }
}

/// Provider-neutral chat request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub system_instruction: String,
    /// Prior turns followed by the current user turn.
    pub contents: Vec<Content>,
    pub temperature: f32,
    pub max_tokens: usize,
}

impl ChatRequest {
    /// The final user turn.
    pub fn last_user(&self) -> Option<&Content> {
        self.contents.iter().rev().find(|c| c.role == ChatRole::User)
    }

    pub fn image_count(&self) -> usize {
        self.contents.iter().map(Content::image_count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joined_text_skips_images() {
        let c = Content {
            role: ChatRole::User,
            parts: vec![
                Part::text("a"),
                Part::Image {
                    mime_type: "image/png".into(),
                    data: "AAAA".into(),
                },
                Part::text("b"),
            ],
        };
        assert_eq!(c.joined_text(), "a\n\nb");
        assert_eq!(c.image_count(), 1);
    }

    #[test]
    fn turn_converts_to_text_content() {
        let c = Content::from(&ChatTurn::assistant("hi"));
        assert_eq!(c.role, ChatRole::Assistant);
        assert_eq!(c.parts, vec![Part::text("hi")]);
    }
}
