//! Chat types (`POST /api/chat`).

use serde::{Deserialize, Serialize};

use crate::options::InferenceOptions;

/// Chat request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChatRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<InferenceOptions>,
    /// Images attached to the final user message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<Attachment>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChatMessage {
    pub role: String,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Text(content.into()),
        }
    }
}

/// Message content: plain text, or OpenAI-style content parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// An image attached to a chat request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Attachment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, alias = "type", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_url: Option<String>,
}

impl Attachment {
    /// The URL to hand to the engine: `data_url` first, then `url`.
    pub fn image_url(&self) -> Option<&str> {
        self.data_url
            .as_deref()
            .filter(|u| !u.is_empty())
            .or_else(|| self.url.as_deref().filter(|u| !u.is_empty()))
    }
}

/// Non-streaming chat response. `message` is the engine's assistant message as returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub model: String,
    pub message: serde_json::Value,
    pub done: bool,
}

impl ChatResponse {
    pub fn new(model: String, message: serde_json::Value) -> Self {
        Self {
            model,
            message,
            done: true,
        }
    }
}

/// One SSE event of a streaming chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatEvent {
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<ChatDelta>,
    pub done: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatDelta {
    pub role: String,
    pub content: String,
}

impl ChatEvent {
    pub fn delta(model: &str, content: String) -> Self {
        Self {
            model: model.to_string(),
            message: Some(ChatDelta {
                role: "assistant".to_string(),
                content,
            }),
            done: false,
        }
    }

    pub fn done(model: &str) -> Self {
        Self {
            model: model.to_string(),
            message: None,
            done: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_defaults() {
        let json = r#"{"messages": [{"role": "user", "content": "Hello"}]}"#;
        let req: ChatRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.messages.len(), 1);
        assert!(req.model.is_none());
        assert!(!req.stream);
        assert!(req.attachments.is_none());
        assert_eq!(req.messages[0].content, MessageContent::Text("Hello".to_string()));
    }

    #[test]
    fn test_chat_request_with_parts() {
        let json = r#"{
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "text", "text": "What is this?"},
                    {"type": "image_url", "image_url": {"url": "data:image/png;base64,AAA"}}
                ]
            }]
        }"#;
        let req: ChatRequest = serde_json::from_str(json).unwrap();
        match &req.messages[0].content {
            MessageContent::Parts(parts) => {
                assert_eq!(parts.len(), 2);
                assert_eq!(
                    parts[1],
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: "data:image/png;base64,AAA".to_string()
                        }
                    }
                );
            }
            other => panic!("expected parts, got {:?}", other),
        }
    }

    #[test]
    fn test_chat_request_rejects_unknown_fields() {
        let json = r#"{"messages": [], "tools": []}"#;
        assert!(serde_json::from_str::<ChatRequest>(json).is_err());
    }

    #[test]
    fn test_chat_message_requires_role() {
        let json = r#"{"messages": [{"content": "Hello"}]}"#;
        assert!(serde_json::from_str::<ChatRequest>(json).is_err());
    }

    #[test]
    fn test_attachment_prefers_data_url() {
        let att = Attachment {
            url: Some("https://example.com/cat.png".to_string()),
            data_url: Some("data:image/png;base64,AAA".to_string()),
            ..Default::default()
        };
        assert_eq!(att.image_url(), Some("data:image/png;base64,AAA"));

        let att = Attachment {
            url: Some("https://example.com/cat.png".to_string()),
            data_url: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(att.image_url(), Some("https://example.com/cat.png"));

        assert_eq!(Attachment::default().image_url(), None);
    }

    #[test]
    fn test_attachment_type_alias() {
        let att: Attachment =
            serde_json::from_str(r#"{"name": "cat.png", "type": "image/png", "url": "u"}"#)
                .unwrap();
        assert_eq!(att.mime_type.as_deref(), Some("image/png"));
    }

    #[test]
    fn test_chat_event_shapes() {
        let delta = serde_json::to_value(ChatEvent::delta("glm", "Hi".to_string())).unwrap();
        assert_eq!(
            delta,
            serde_json::json!({
                "model": "glm",
                "message": {"role": "assistant", "content": "Hi"},
                "done": false
            })
        );
        let done = serde_json::to_value(ChatEvent::done("glm")).unwrap();
        assert_eq!(done, serde_json::json!({"model": "glm", "done": true}));
    }
}
