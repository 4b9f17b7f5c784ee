use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The NLU engine reported a decision failure for this turn.
    #[error("nlu engine failed: {message}")]
    Nlu { message: String },

    /// Unknown action name or a handler registered with the wrong shape.
    #[error(transparent)]
    Action(#[from] palaver_actions::Error),

    /// An action handler failed while the loop awaited its continuation.
    #[error("action '{name}' failed: {source}")]
    Handler {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    /// The NLU engine or a handler never completed within the per-turn
    /// timeout.
    #[error("turn {turn} timed out after {timeout_ms} ms")]
    Timeout { turn: usize, timeout_ms: u64 },

    /// The configured turn cap was reached before a stop decision.
    #[error("dispatch exceeded the turn limit of {limit}")]
    TurnLimit { limit: usize },

    #[error(transparent)]
    Session(#[from] palaver_sessions::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
