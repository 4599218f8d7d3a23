use serde::{Deserialize, Serialize};

use crate::common::{BackendException, GuildId};

/// Operation codes the backend sends over the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncomingOp {
    Stats,
    PlayerUpdate,
    Event,
}

impl IncomingOp {
    pub fn parse(op: &str) -> Option<Self> {
        match op {
            "stats" => Some(Self::Stats),
            "playerUpdate" => Some(Self::PlayerUpdate),
            "event" => Some(Self::Event),
            _ => None,
        }
    }
}

/// Body of a `playerUpdate` message.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerUpdate {
    pub guild_id: GuildId,
    pub state: PlayerUpdateState,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerUpdateState {
    /// Unix timestamp in milliseconds.
    #[serde(default)]
    pub time: u64,
    /// Playback position in milliseconds.
    #[serde(default)]
    pub position: u64,
    #[serde(default)]
    pub connected: Option<bool>,
}

/// Event types carried by an `event` message.
pub const EVENT_TYPES: [&str; 5] = [
    "TrackStartEvent",
    "TrackEndEvent",
    "TrackExceptionEvent",
    "TrackStuckEvent",
    "WebSocketClosedEvent",
];

/// Playback lifecycle events reported by the backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum BackendEvent {
    #[serde(rename = "TrackStartEvent")]
    #[serde(rename_all = "camelCase")]
    TrackStart {
        guild_id: GuildId,
        #[serde(default)]
        track: Option<String>,
    },

    #[serde(rename = "TrackEndEvent")]
    #[serde(rename_all = "camelCase")]
    TrackEnd {
        guild_id: GuildId,
        #[serde(default)]
        track: Option<String>,
        reason: TrackEndReason,
    },

    #[serde(rename = "TrackExceptionEvent")]
    #[serde(rename_all = "camelCase")]
    TrackException {
        guild_id: GuildId,
        #[serde(default)]
        track: Option<String>,
        #[serde(default)]
        exception: Option<BackendException>,
        /// Older backends send a bare message instead of an exception object.
        #[serde(default)]
        error: Option<String>,
    },

    #[serde(rename = "TrackStuckEvent")]
    #[serde(rename_all = "camelCase")]
    TrackStuck {
        guild_id: GuildId,
        #[serde(default)]
        track: Option<String>,
        threshold_ms: u64,
    },

    #[serde(rename = "WebSocketClosedEvent")]
    #[serde(rename_all = "camelCase")]
    WebSocketClosed {
        guild_id: GuildId,
        code: u16,
        #[serde(default)]
        reason: String,
        #[serde(default)]
        by_remote: bool,
    },
}

impl BackendEvent {
    pub fn guild_id(&self) -> &GuildId {
        match self {
            Self::TrackStart { guild_id, .. }
            | Self::TrackEnd { guild_id, .. }
            | Self::TrackException { guild_id, .. }
            | Self::TrackStuck { guild_id, .. }
            | Self::WebSocketClosed { guild_id, .. } => guild_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackEndReason {
    Finished,
    LoadFailed,
    Stopped,
    Replaced,
    Cleanup,
}
