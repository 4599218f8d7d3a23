use std::sync::Arc;

use serde_json::Value;

use crate::{
    common::{ChannelId, ClientError, GuildId, NodeId},
    protocol::TrackEndReason,
    track::QueueItem,
};

/// Lifecycle notifications broadcast to every subscriber of a manager.
#[derive(Debug, Clone)]
pub enum ManagerEvent {
    NodeCreate {
        node: NodeId,
    },
    NodeDestroy {
        node: NodeId,
    },
    NodeConnect {
        node: NodeId,
    },
    NodeReconnect {
        node: NodeId,
    },
    NodeDisconnect {
        node: NodeId,
        code: u16,
        reason: String,
    },
    /// Fatal when `error.is_fatal()`; the node is destroyed right after.
    NodeError {
        node: NodeId,
        error: Arc<ClientError>,
    },
    /// Every backend frame carrying an `op`, before it is handled.
    NodeRaw {
        node: NodeId,
        payload: Value,
    },

    PlayerCreate {
        guild_id: GuildId,
    },
    PlayerDestroy {
        guild_id: GuildId,
    },
    /// The bot was moved to another voice channel.
    PlayerMove {
        guild_id: GuildId,
        old_channel: Option<ChannelId>,
        new_channel: ChannelId,
    },
    /// The bot left or was kicked from its voice channel.
    PlayerDisconnect {
        guild_id: GuildId,
        old_channel: Option<ChannelId>,
    },

    TrackStart {
        guild_id: GuildId,
        track: Option<QueueItem>,
    },
    TrackEnd {
        guild_id: GuildId,
        track: Option<QueueItem>,
        reason: TrackEndReason,
    },
    TrackStuck {
        guild_id: GuildId,
        track: Option<QueueItem>,
        threshold_ms: u64,
    },
    /// A backend exception, or an unresolved track that could not be found.
    TrackError {
        guild_id: GuildId,
        track: Option<QueueItem>,
        error: Arc<ClientError>,
    },
    QueueEnd {
        guild_id: GuildId,
        track: Option<QueueItem>,
    },
    /// The backend's own voice connection was closed.
    SocketClosed {
        guild_id: GuildId,
        code: u16,
        reason: String,
        by_remote: bool,
    },
}

impl ManagerEvent {
    /// Guild the event concerns, if it is a player event.
    pub fn guild_id(&self) -> Option<&GuildId> {
        match self {
            Self::PlayerCreate { guild_id }
            | Self::PlayerDestroy { guild_id }
            | Self::PlayerMove { guild_id, .. }
            | Self::PlayerDisconnect { guild_id, .. }
            | Self::TrackStart { guild_id, .. }
            | Self::TrackEnd { guild_id, .. }
            | Self::TrackStuck { guild_id, .. }
            | Self::TrackError { guild_id, .. }
            | Self::QueueEnd { guild_id, .. }
            | Self::SocketClosed { guild_id, .. } => Some(guild_id),
            _ => None,
        }
    }
}
