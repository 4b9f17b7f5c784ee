//! Shared types used across all palaver crates.

pub mod types;

pub use types::{Context, InboundEvent, MessagePayload};
