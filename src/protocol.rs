//! Wire types exchanged with the chat UI host
//!
//! The host owns the message format; this is the subset the filter reads and
//! writes. Unknown keys on bodies, messages and content parts are captured in
//! `extra` and passed back untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// Message content: plain text, a list of typed parts, or `null` (assistant
/// tool-call messages)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Parts(Vec<ContentPart>),
    Null,
}

impl Default for Content {
    fn default() -> Self {
        Content::Text(String::new())
    }
}

/// One element of list-shaped content (`{"type": "text", "text": ...}`,
/// `{"type": "image_url", ...}`, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: part_types::TEXT.to_string(),
            text: Some(text.into()),
            extra: Map::new(),
        }
    }

    pub fn is_text(&self) -> bool {
        self.kind == part_types::TEXT
    }
}

/// Content part type names
pub mod part_types {
    pub const TEXT: &str = "text";
    pub const IMAGE_URL: &str = "image_url";
}

/// A single chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub content: Content,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Message {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: Content::Text(text.into()),
            extra: Map::new(),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    pub fn is_system(&self) -> bool {
        self.role == Role::System
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }

    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }

    /// All text of the message, text parts joined by newlines
    pub fn text(&self) -> String {
        match &self.content {
            Content::Text(text) => text.clone(),
            Content::Parts(parts) => parts
                .iter()
                .filter(|p| p.is_text())
                .filter_map(|p| p.text.as_deref())
                .collect::<Vec<_>>()
                .join("\n"),
            Content::Null => String::new(),
        }
    }

    /// Non-text parts (images, files)
    pub fn attachments(&self) -> Vec<&ContentPart> {
        match &self.content {
            Content::Text(_) | Content::Null => Vec::new(),
            Content::Parts(parts) => parts.iter().filter(|p| !p.is_text()).collect(),
        }
    }

    /// Insert text before everything else in the message
    pub fn prepend_text(&mut self, prefix: &str) {
        match &mut self.content {
            Content::Text(text) => text.insert_str(0, prefix),
            Content::Parts(parts) => parts.insert(0, ContentPart::text(prefix)),
            Content::Null => self.content = Content::Text(prefix.to_string()),
        }
    }

    /// Add text after everything else in the message
    pub fn append_text(&mut self, suffix: &str) {
        match &mut self.content {
            Content::Text(text) => text.push_str(suffix),
            Content::Parts(parts) => parts.push(ContentPart::text(suffix)),
            Content::Null => self.content = Content::Text(suffix.to_string()),
        }
    }

    /// Rewrite every text segment in place. Returns true if anything changed.
    pub fn rewrite_text<F>(&mut self, f: F) -> bool
    where
        F: Fn(&str) -> String,
    {
        let mut changed = false;
        let mut apply = |text: &mut String| {
            let rewritten = f(text);
            if rewritten != *text {
                *text = rewritten;
                changed = true;
            }
        };

        match &mut self.content {
            Content::Text(text) => apply(text),
            Content::Parts(parts) => {
                for part in parts.iter_mut().filter(|p| p.kind == part_types::TEXT) {
                    if let Some(text) = part.text.as_mut() {
                        apply(text);
                    }
                }
            }
            Content::Null => {}
        }
        changed
    }
}

/// Request/response body passed to each hook
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Body {
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Body {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            extra: Map::new(),
        }
    }

    pub fn last_assistant(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.is_assistant())
    }

    pub fn last_assistant_mut(&mut self) -> Option<&mut Message> {
        self.messages.iter_mut().rev().find(|m| m.is_assistant())
    }
}

/// Severity of a status event shown by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusLevel {
    InProgress,
    Error,
    Success,
}

/// Progress/status notice surfaced in the host UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub description: String,
    pub status: StatusLevel,
    pub done: bool,
}

impl StatusEvent {
    pub fn progress(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            status: StatusLevel::InProgress,
            done: false,
        }
    }

    pub fn error(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            status: StatusLevel::Error,
            done: true,
        }
    }

    pub fn success(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            status: StatusLevel::Success,
            done: true,
        }
    }

    /// Envelope the host's event emitter expects
    pub fn to_host_json(&self) -> Value {
        serde_json::json!({
            "type": "status",
            "data": self,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_text_and_parts_content() {
        let json = r#"{"messages": [
            {"role": "system", "content": "be brief"},
            {"role": "user", "content": [
                {"type": "text", "text": "look at this"},
                {"type": "image_url", "image_url": {"url": "data:image/png;base64,AAA"}}
            ]}
        ], "model": "gpt"}"#;

        let body: Body = serde_json::from_str(json).unwrap();
        assert_eq!(body.messages.len(), 2);
        assert_eq!(body.messages[0].text(), "be brief");
        assert_eq!(body.messages[1].text(), "look at this");
        assert_eq!(body.messages[1].attachments().len(), 1);
        assert_eq!(body.messages[1].attachments()[0].kind, part_types::IMAGE_URL);
        assert_eq!(body.extra["model"], "gpt");
    }

    #[test]
    fn test_unknown_keys_survive() {
        let json = r#"{"role": "assistant", "content": "hi", "id": "m1"}"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        let back = serde_json::to_value(&msg).unwrap();
        assert_eq!(back["id"], "m1");
        assert_eq!(back["role"], "assistant");
    }

    #[test]
    fn test_null_content_round_trips() {
        let json = r#"{"messages": [
            {"role": "user", "content": "weather?"},
            {"role": "assistant", "content": null, "tool_calls": [{"id": "call_1"}]},
            {"role": "tool", "content": "sunny", "tool_call_id": "call_1"}
        ]}"#;

        let body: Body = serde_json::from_str(json).unwrap();
        let call = &body.messages[1];
        assert_eq!(call.content, Content::Null);
        assert_eq!(call.text(), "");
        assert!(call.attachments().is_empty());
        assert_eq!(body.messages[2].role, Role::Tool);

        let back = serde_json::to_value(&body).unwrap();
        assert!(back["messages"][1]["content"].is_null());
        assert_eq!(back["messages"][1]["tool_calls"][0]["id"], "call_1");
    }

    #[test]
    fn test_text_edits_on_null_content() {
        let mut msg: Message =
            serde_json::from_str(r#"{"role": "assistant", "content": null}"#).unwrap();
        assert!(!msg.rewrite_text(|t| format!("{}!", t)));
        msg.append_text("note");
        assert_eq!(msg.content, Content::Text("note".to_string()));
    }

    #[test]
    fn test_prepend_and_append_on_parts() {
        let mut msg = Message {
            role: Role::User,
            content: Content::Parts(vec![ContentPart::text("middle")]),
            extra: Map::new(),
        };
        msg.prepend_text("start");
        msg.append_text("end");
        assert_eq!(msg.text(), "start\nmiddle\nend");
    }

    #[test]
    fn test_rewrite_reports_change() {
        let mut msg = Message::assistant("abc");
        assert!(msg.rewrite_text(|t| t.replace('b', "")));
        assert!(!msg.rewrite_text(|t| t.replace('b', "")));
        assert_eq!(msg.text(), "ac");
    }

    #[test]
    fn test_status_event_envelope() {
        let event = StatusEvent::success("done");
        let json = event.to_host_json();
        assert_eq!(json["type"], "status");
        assert_eq!(json["data"]["status"], "success");
        assert_eq!(json["data"]["done"], true);
    }
}
