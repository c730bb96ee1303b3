use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Not connected")]
    NotConnected,

    /// The outbound queue is full while the link is down or slow.
    #[error("Outbound queue full ({0} frames)")]
    QueueFull(usize),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Non-2xx answer to a document request. `detail` is the server's
    /// `detail` field when the body carried one.
    #[error("HTTP status {status}")]
    Http { status: u16, detail: Option<String> },

    #[error("Network error reaching {url}: {message}")]
    Network { url: String, message: String },

    #[error("Connect timeout exceeded after {0:?}")]
    ConnectTimeout(Duration),

    #[error("{0}")]
    Custom(String),
}

impl Error {
    pub fn network(url: impl ToString, err: reqwest::Error) -> Self {
        Self::Network {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let url = err
            .url()
            .map(ToString::to_string)
            .unwrap_or_else(|| "<unknown>".to_string());
        Self::network(url, err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
