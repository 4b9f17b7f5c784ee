//! Outbound message delivery: a thin gateway over the platform transport
//! that normalizes its error contract.
//!
//! A transport-level failure, a non-success HTTP status, and an `error`
//! field embedded in a 200 response body are all the same thing to
//! callers: a failed send.

pub mod error;
pub mod gateway;
pub mod transport;

pub use {
    error::{Error, Result},
    gateway::MessageGateway,
    transport::{GraphTransport, Transport},
};
