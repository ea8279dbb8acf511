//! Engine error taxonomy.
//!
//! Single-item remote failures (`RemoteProtocol`) are handled by dropping the
//! affected record at the normalization layer and never reach this type; the
//! variants here are the failures surfaced to callers per unit of work.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("unexpected remote response: {0}")]
    RemoteProtocol(String),

    #[error("remote call failed: {0}")]
    RemoteTransient(String),

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::RemoteTransient(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
