//! Named business-logic actions and the registry the dispatch loop
//! resolves them from.
//!
//! The NLU engine can invoke business logic four ways; each way is a
//! distinct trait, and a registered handler carries an explicit
//! discriminant ([`Handler`]) rather than being duck-typed at the call
//! site.

pub mod error;
pub mod registry;

pub use {
    error::{Error, Result},
    registry::{
        ActionRegistry, ERROR_ACTION, EffectAction, ErrorHook, Handler, MERGE_ACTION, MergeAction,
        StepAction,
    },
};
