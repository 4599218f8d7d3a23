use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Exception severity levels reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Common,
    Suspicious,
    Fault,
}

/// Exception object attached to failed loads and track exceptions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendException {
    #[serde(default)]
    pub message: Option<String>,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl std::fmt::Display for BackendException {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({:?})",
            self.message.as_deref().unwrap_or("unknown exception"),
            self.severity
        )
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("no voice channel has been set")]
    NoVoiceChannel,

    #[error("no current track")]
    NoCurrentTrack,

    #[error("player for guild {0} has been destroyed")]
    PlayerDestroyed(String),

    #[error("invalid equalizer: {0}")]
    InvalidEqualizer(String),

    #[error("offset must be between 0 and {len}, got {offset}")]
    QueueOffset { offset: usize, len: usize },

    #[error("invalid queue range {start}..{end} for a queue of {len}")]
    QueueRange { start: usize, end: usize, len: usize },

    #[error("cannot skip {amount} tracks in a queue of {len}")]
    SkipOutOfRange { amount: usize, len: usize },

    #[error("payload must serialize to a non-empty JSON object")]
    InvalidPayload,

    #[error("no available nodes")]
    NoAvailableNodes,

    #[error("node {0} is not registered")]
    UnknownNode(String),

    #[error("invalid node options: {0}")]
    InvalidNodeOptions(String),

    #[error("manager has not been initialised with a client id")]
    NotInitialised,

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unexpected op \"{0}\"")]
    UnknownOp(String),

    #[error("unknown event type \"{0}\"")]
    UnknownEvent(String),

    #[error("no tracks found for \"{0}\"")]
    NoMatches(String),

    #[error("track load failed: {0}")]
    LoadFailed(BackendException),

    #[error("track exception: {0}")]
    TrackException(BackendException),

    #[error("unable to connect after {0} attempts")]
    ReconnectExhausted(u32),
}

impl ClientError {
    /// True for errors that end a node's life.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ReconnectExhausted(_))
    }
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;
