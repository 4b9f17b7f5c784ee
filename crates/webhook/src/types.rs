use serde::Deserialize;

/// Top-level platform webhook payload.
///
/// Unknown fields are tolerated everywhere; the platform adds fields
/// without notice and the router only reads what it needs.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    /// Object class the event batch refers to; only `"page"` is relevant.
    #[serde(default)]
    pub object: Option<String>,

    #[serde(default)]
    pub entry: Vec<Entry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Entry {
    #[serde(default)]
    pub messaging: Vec<MessagingEvent>,
}

/// One sender→recipient event inside an entry.
#[derive(Debug, Clone, Deserialize)]
pub struct MessagingEvent {
    #[serde(default)]
    pub sender: Option<Party>,
    #[serde(default)]
    pub recipient: Option<Party>,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Party {
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub attachments: Vec<serde_json::Value>,
}
