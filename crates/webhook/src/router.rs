use {palaver_common::InboundEvent, tracing::debug};

use crate::types::{MessagingEvent, WebhookPayload};

/// Normalize one messaging event, or `None` when it is malformed or not
/// addressed to this page.
///
/// Pure function: validates that sender, recipient, and a message body are
/// present, confirms the recipient matches the registered platform
/// identity, and extracts `(external user id, utterance-or-none,
/// attachment-only flag)`.
pub fn extract_event(event: &MessagingEvent, page_id: &str) -> Option<InboundEvent> {
    let sender_id = event.sender.as_ref()?.id.as_deref()?;
    let recipient_id = event.recipient.as_ref()?.id.as_deref()?;

    if recipient_id != page_id {
        debug!(recipient_id, page_id, "event addressed to another page, ignoring");
        return None;
    }

    let message = event.message.as_ref()?;
    let utterance = message.text.clone().filter(|t| !t.is_empty());
    let attachment_only = utterance.is_none() && !message.attachments.is_empty();
    if utterance.is_none() && !attachment_only {
        debug!(sender_id, "message with neither text nor attachments, ignoring");
        return None;
    }

    Some(InboundEvent {
        external_user_id: sender_id.to_string(),
        utterance,
        attachment_only,
    })
}

/// Parse a raw webhook body and collect every routable event.
///
/// Returns an empty vec for anything malformed or irrelevant — payloads
/// that are not JSON, not about a page, or whose events fail validation.
/// Nothing here is an error: the webhook acknowledges receipt regardless.
#[must_use]
pub fn route_payload(body: &[u8], page_id: &str) -> Vec<InboundEvent> {
    let payload: WebhookPayload = match serde_json::from_slice(body) {
        Ok(payload) => payload,
        Err(e) => {
            debug!(error = %e, "unparseable webhook body, ignoring");
            return Vec::new();
        },
    };

    if payload.object.as_deref() != Some("page") {
        debug!(object = ?payload.object, "non-page webhook object, ignoring");
        return Vec::new();
    }

    payload
        .entry
        .iter()
        .flat_map(|entry| entry.messaging.iter())
        .filter_map(|event| extract_event(event, page_id))
        .collect()
}
