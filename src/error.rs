//! Error types for simulchat.

/// Top-level error type for the aggregator.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Display error: {0}")]
    Display(#[from] DisplayError),

    #[error("Forwarder error: {0}")]
    Forward(#[from] ForwardError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Invalid source URL {url}: {reason}")]
    InvalidSourceUrl { url: String, reason: String },
}

/// Errors raised while starting or running a chat source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Unsupported platform for source {key}")]
    UnsupportedPlatform { key: String },

    #[error("Source {key} failed to connect: {reason}")]
    ConnectFailed { key: String, reason: String },

    #[error("Source {key} transport error: {reason}")]
    Transport { key: String, reason: String },

    #[error("Chat endpoint returned HTTP {status}")]
    HttpStatus { status: u16 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Client error: {0}")]
    Client(String),
}

/// Typed failures for malformed source payloads.
///
/// Parse failures drop the offending frame or item; they never take the
/// source down.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Malformed IRC tag block: {0}")]
    IrcTags(String),

    #[error("Malformed IRC prefix: {0}")]
    IrcPrefix(String),

    #[error("IRC line missing command: {0}")]
    IrcCommand(String),

    #[error("IRC {command} missing channel parameter")]
    IrcChannel { command: String },

    #[error("Unexpected payload shape: {reason}")]
    PayloadShape { reason: String },

    #[error("Unrecognized timestamp value: {value}")]
    Timestamp { value: String },
}

/// Errors raised by the terminal display.
#[derive(Debug, thiserror::Error)]
pub enum DisplayError {
    #[error("Terminal I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the RTMP forwarder subprocess glue.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("Failed to spawn forwarder {label}: {source}")]
    Spawn {
        label: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Forwarder {label} did not exit within the grace period")]
    GraceExpired { label: String },
}

/// Result type alias for the aggregator.
pub type Result<T> = std::result::Result<T, Error>;
