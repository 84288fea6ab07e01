//! Error types for taproom

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Error reported by the store itself. The message is passed through to
    /// API callers unchanged.
    #[error("{message}")]
    Store {
        message: String,
        code: Option<String>,
    },

    #[error("Store request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub fn store(msg: impl Into<String>) -> Self {
        Error::Store {
            message: msg.into(),
            code: None,
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }
}
