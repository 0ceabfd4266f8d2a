//! Conversation history entries.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Role the environment uses for observation payloads.
const OBSERVATION_ROLE: &str = "Observation";

/// One caller-visible unit of conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderingMessage {
    pub role: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
}

impl RenderingMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>, kind: MessageKind) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            kind,
        }
    }

    /// Whether the content is expected to be a JSON document.
    pub fn expects_structured(&self) -> bool {
        self.kind == MessageKind::Action || self.role == OBSERVATION_ROLE
    }

    /// Decode the content for display.
    ///
    /// Structured messages whose content is a JSON object come back as
    /// [`ContentView::Structured`]; everything else, including content that
    /// fails to decode, is shown as raw text.
    pub fn content_view(&self) -> ContentView<'_> {
        if self.expects_structured() {
            match serde_json::from_str::<serde_json::Value>(&self.content) {
                Ok(value @ serde_json::Value::Object(_)) => return ContentView::Structured(value),
                Ok(_) => {}
                Err(e) => return ContentView::Undecodable {
                    raw: &self.content,
                    reason: e.to_string(),
                },
            }
        }
        ContentView::Text(&self.content)
    }
}

/// Decoded message content.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentView<'a> {
    /// A JSON object (action or observation payload).
    Structured(serde_json::Value),
    /// Plain text.
    Text(&'a str),
    /// Expected JSON but got something else; display the raw text.
    Undecodable { raw: &'a str, reason: String },
}

impl ContentView<'_> {
    /// Text to show when the front end cannot render structured data.
    pub fn as_text(&self) -> String {
        match self {
            ContentView::Structured(value) => {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            }
            ContentView::Text(text) => text.to_string(),
            ContentView::Undecodable { raw, .. } => raw.to_string(),
        }
    }
}

/// The `type` field of a rendering message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageKind {
    /// Agent action; content is a JSON-encoded action.
    Action,
    /// Any other label, kept verbatim.
    Other(String),
}

impl MessageKind {
    pub fn other() -> Self {
        MessageKind::Other("other".to_string())
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Action => f.write_str("action"),
            MessageKind::Other(label) => f.write_str(label),
        }
    }
}

impl From<String> for MessageKind {
    fn from(s: String) -> Self {
        if s == "action" {
            MessageKind::Action
        } else {
            MessageKind::Other(s)
        }
    }
}

impl From<MessageKind> for String {
    fn from(kind: MessageKind) -> Self {
        kind.to_string()
    }
}
