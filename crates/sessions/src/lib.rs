//! In-memory session registry.
//!
//! One session per external user at a time; created lazily on first
//! contact, context replaced wholesale at the end of a completed dispatch
//! loop. Deletion is a business-logic decision — nothing here expires
//! sessions automatically.

pub mod error;
pub mod store;

pub use {
    error::{Error, Result},
    store::{Session, SessionStore},
};
