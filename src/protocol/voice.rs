use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::{ChannelId, GuildId, UserId};

/// Chat-platform `VOICE_SERVER_UPDATE` body; forwarded to the backend as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceServerUpdate {
    pub token: String,
    pub guild_id: GuildId,
    /// Null while the platform is reallocating the voice server.
    #[serde(default)]
    pub endpoint: Option<String>,
}

/// Chat-platform `VOICE_STATE_UPDATE` body.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VoiceStateUpdate {
    pub guild_id: GuildId,
    pub user_id: UserId,
    pub session_id: String,
    #[serde(default)]
    pub channel_id: Option<ChannelId>,
}

/// One voice-routing event from the chat platform.
#[derive(Debug, Clone, PartialEq)]
pub enum VoicePacket {
    Server(VoiceServerUpdate),
    State(VoiceStateUpdate),
}

impl VoicePacket {
    /// Reads a raw gateway dispatch (`{"t": ..., "d": {...}}`) or a bare
    /// event body. Anything that is not a voice event yields `None`.
    pub fn from_gateway(raw: &Value) -> Option<Self> {
        let (kind, body) = match raw.get("t") {
            Some(t) => (t.as_str(), raw.get("d")?),
            None => (None, raw),
        };

        match kind {
            Some("VOICE_SERVER_UPDATE") => {
                serde_json::from_value(body.clone()).ok().map(Self::Server)
            }
            Some("VOICE_STATE_UPDATE") => {
                serde_json::from_value(body.clone()).ok().map(Self::State)
            }
            Some(_) => None,
            None if body.get("token").is_some() => {
                serde_json::from_value(body.clone()).ok().map(Self::Server)
            }
            None if body.get("session_id").is_some() => {
                serde_json::from_value(body.clone()).ok().map(Self::State)
            }
            None => None,
        }
    }

    pub fn guild_id(&self) -> &GuildId {
        match self {
            Self::Server(server) => &server.guild_id,
            Self::State(state) => &state.guild_id,
        }
    }
}

/// Gateway op 4 payload the host sends to join or leave a voice channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatewayVoiceState {
    pub op: u8,
    pub d: GatewayVoiceStateData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatewayVoiceStateData {
    pub guild_id: GuildId,
    pub channel_id: Option<ChannelId>,
    pub self_mute: bool,
    pub self_deaf: bool,
}

impl GatewayVoiceState {
    pub const OP: u8 = 4;

    pub fn new(
        guild_id: GuildId,
        channel_id: Option<ChannelId>,
        self_mute: bool,
        self_deaf: bool,
    ) -> Self {
        Self {
            op: Self::OP,
            d: GatewayVoiceStateData {
                guild_id,
                channel_id,
                self_mute,
                self_deaf,
            },
        }
    }
}
