use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("no handler registered for action: {name}")]
    UnknownAction { name: String },

    #[error("handler registered for '{name}' has the wrong shape: {expected} expected")]
    WrongShape { name: String, expected: &'static str },
}

impl Error {
    #[must_use]
    pub fn unknown_action(name: impl Into<String>) -> Self {
        Self::UnknownAction { name: name.into() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
