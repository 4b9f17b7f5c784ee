//! The action dispatch loop: the turn-by-turn exchange between the NLU
//! engine's decisions and registered action handlers.
//!
//! One loop runs per session at a time; concurrent inbound messages for
//! the same session queue behind the in-flight loop in arrival order.
//! Sessions are independent and may dispatch concurrently.

pub mod dispatcher;
pub mod engine;
pub mod error;

pub use {
    dispatcher::Dispatcher,
    engine::{Decision, NluEngine, NluError},
    error::{Error, Result},
};
