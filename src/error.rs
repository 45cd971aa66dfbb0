use thiserror::Error;

#[derive(Error, Debug)]
pub enum CardHistoryError {
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Unexpected response shape: {0}")]
    UnexpectedResponse(String),

    #[error("Date calculation error: {0}")]
    DateError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CardHistoryError>;
