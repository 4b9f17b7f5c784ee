use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("session not found: {session_id}")]
    NotFound { session_id: String },
}

impl Error {
    #[must_use]
    pub fn not_found(session_id: impl Into<String>) -> Self {
        Self::NotFound {
            session_id: session_id.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
