use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// The platform rejected the send: non-success status, or an error
    /// object embedded in an otherwise successful response.
    #[error("platform send failed ({status}): {body}")]
    Platform {
        status: u16,
        body: serde_json::Value,
    },
}

impl Error {
    #[must_use]
    pub fn platform(status: u16, body: serde_json::Value) -> Self {
        Self::Platform { status, body }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
