//! Environment-level configuration for the palaver gateway.

pub mod error;
pub mod schema;

pub use {
    error::{Error, Result},
    schema::GatewayConfig,
};
