use std::sync::Arc;

use {
    palaver_common::MessagePayload,
    tracing::{info, warn},
};

use crate::{error::Result, transport::Transport};

/// Thin wrapper over the transport used by action handlers.
///
/// Adds structured logging; the error contract is the transport's
/// normalized one, so callers see every kind of send failure uniformly.
pub struct MessageGateway {
    transport: Arc<dyn Transport>,
}

impl MessageGateway {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Send a plain text message.
    pub async fn send_text(&self, recipient_id: &str, text: &str) -> Result<serde_json::Value> {
        self.send_payload(recipient_id, &MessagePayload::text(text))
            .await
    }

    /// Send an arbitrary payload (text, template, carousel).
    pub async fn send_payload(
        &self,
        recipient_id: &str,
        payload: &MessagePayload,
    ) -> Result<serde_json::Value> {
        match self.transport.send(recipient_id, payload).await {
            Ok(body) => {
                info!(
                    recipient_id,
                    has_text = payload.text.is_some(),
                    has_attachment = payload.attachment.is_some(),
                    "outbound message sent"
                );
                Ok(body)
            },
            Err(e) => {
                warn!(recipient_id, error = %e, "outbound message failed");
                Err(e)
            },
        }
    }
}
