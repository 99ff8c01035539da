use serde::ser::Serializer;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("feed http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("feed socket error: {0}")]
    FeedSocket(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("feed payload rejected: {0}")]
    Decode(#[from] simd_json::Error),
    #[error("invalid endpoint url: {0}")]
    Endpoint(#[from] url::ParseError),
    #[error("{what} timed out after {after:?}")]
    Timeout { what: &'static str, after: Duration },
}

impl From<tokio_tungstenite::tungstenite::Error> for AppError {
    fn from(value: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::FeedSocket(Box::new(value))
    }
}

/// Commands hand errors to UI consumers as plain strings.
impl serde::Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
