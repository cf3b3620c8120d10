use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Generator error: {0}")]
    Generator(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Duplicate content hash {hash} already owned by {owner}")]
    DuplicateContent { hash: String, owner: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Lock error: {0}")]
    Lock(String),

    #[error("Fallback error: {0}")]
    Fallback(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("External error: {0}")]
    External(#[from] anyhow::Error),
}

impl Error {
    /// Fatal errors end the run instead of consuming an attempt.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Fallback(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
