use serde::{Deserialize, Serialize};

/// Conversational state for one session.
///
/// Opaque to the dispatch engine — only the NLU engine and the action
/// handlers assign meaning to its keys (slots, flags, history markers).
pub type Context = serde_json::Map<String, serde_json::Value>;

/// Outbound message payload passed through the transport untouched.
///
/// Rich templates (carousels, images) ride in `attachment` as plain data;
/// the engine never inspects them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MessagePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<serde_json::Value>,
}

impl MessagePayload {
    /// Plain-text payload.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            attachment: None,
        }
    }

    /// Attachment-only payload (template, image, carousel).
    #[must_use]
    pub fn attachment(attachment: serde_json::Value) -> Self {
        Self {
            text: None,
            attachment: Some(attachment),
        }
    }
}

/// A platform webhook event normalized by the inbound router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    /// Identifier of the remote chat-platform user.
    pub external_user_id: String,
    /// Message text, absent for attachment-only messages.
    pub utterance: Option<String>,
    /// The message carried attachments and no text.
    pub attachment_only: bool,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use {super::*, serde_json::json};

    #[test]
    fn text_payload_serializes_without_attachment_field() {
        let payload = MessagePayload::text("hello");
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value, json!({"text": "hello"}));
    }

    #[test]
    fn attachment_payload_round_trips() {
        let payload = MessagePayload::attachment(json!({"type": "template"}));
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value, json!({"attachment": {"type": "template"}}));
    }
}
