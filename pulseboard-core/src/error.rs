//! Error taxonomy for the dashboard core.
//!
//! - `SourceError`: REST calls against the monitoring backend
//! - `TransportError`: the live push channel (WebSocket)
//! - `ConfigError`: loading and validating `pulseboard.toml`

/// Errors raised while talking to the backend REST API
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API returned status {status}: {message}")]
    Api { status: String, message: String },
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Invalid backend URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Errors raised by the live transport.
///
/// Only `Unsupported` sends the scheduler to permanent polling, every other
/// variant is a plain disconnect followed by a reconnect.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("live transport unsupported: {0}")]
    Unsupported(String),
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("connection closed")]
    Closed,
    #[error("transport I/O error: {0}")]
    Io(String),
}

impl TransportError {
    pub fn is_unsupported(&self) -> bool {
        matches!(self, TransportError::Unsupported(_))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match e {
            WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::Closed,
            WsError::Url(u) => TransportError::Unsupported(u.to_string()),
            WsError::Io(io) => TransportError::Io(io.to_string()),
            other => TransportError::Connect(other.to_string()),
        }
    }
}

/// Errors raised while loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type SourceResult<T> = Result<T, SourceError>;
