//! Inbound webhook handling: payload normalization, the subscription
//! handshake, and request signature verification.
//!
//! Malformed or irrelevant payloads are dropped silently (the HTTP layer
//! still acknowledges receipt) — that drop is deliberate, not an error.

pub mod router;
pub mod types;
pub mod verify;

pub use {
    router::{extract_event, route_payload},
    types::WebhookPayload,
    verify::{verify_signature, verify_subscription},
};
