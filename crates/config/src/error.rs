use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("missing required environment variable: {name}")]
    MissingVar { name: &'static str },

    #[error("invalid value for {name}: {message}")]
    InvalidVar { name: &'static str, message: String },
}

pub type Result<T> = std::result::Result<T, Error>;
