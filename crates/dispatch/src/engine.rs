use {async_trait::async_trait, palaver_common::Context, thiserror::Error};

/// What the NLU engine wants the loop to do next for one turn.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Merge extracted entities into the context via the `merge` handler.
    Merge {
        entities: serde_json::Value,
        message: Option<String>,
    },
    /// Execute the named action with an extra payload.
    Action {
        name: String,
        payload: serde_json::Value,
    },
    /// Terminate the loop; the current context is final for this message.
    Stop,
}

/// Decision failure reported by the NLU engine.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct NluError {
    pub message: String,
}

impl NluError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The external NLU engine, treated as an opaque asynchronous service.
///
/// The loop guarantees at most one outstanding `decide` call per session.
/// The utterance is `Some` only on the first turn of a dispatch; follow-up
/// turns pass `None` and carry the conversation in `context`.
#[async_trait]
pub trait NluEngine: Send + Sync {
    async fn decide(
        &self,
        session_id: &str,
        utterance: Option<&str>,
        context: &Context,
    ) -> Result<Decision, NluError>;
}
