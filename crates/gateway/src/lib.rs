//! HTTP surface and wiring: webhook routes, the NLU decision client, and
//! the default business-logic handlers.

pub mod actions;
pub mod nlu;
pub mod server;

pub use {
    actions::default_registry,
    nlu::HttpNluEngine,
    server::{AppState, build_app},
};
