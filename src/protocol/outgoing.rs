use serde::{Deserialize, Serialize};

use crate::{common::GuildId, protocol::voice::VoiceServerUpdate};

/// One equalizer slot: band 0..=14, gain -0.25..=1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EqBand {
    pub band: u8,
    pub gain: f32,
}

/// Playback window options merged into a `play` op.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_replace: Option<bool>,
}

/// Messages sent from the client to the backend over the socket.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum OutgoingOp {
    #[serde(rename_all = "camelCase")]
    Play {
        guild_id: GuildId,
        track: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        start_time: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        end_time: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        no_replace: Option<bool>,
    },
    #[serde(rename_all = "camelCase")]
    Stop { guild_id: GuildId },
    #[serde(rename_all = "camelCase")]
    Pause { guild_id: GuildId, pause: bool },
    #[serde(rename_all = "camelCase")]
    Seek { guild_id: GuildId, position: u64 },
    #[serde(rename_all = "camelCase")]
    Volume { guild_id: GuildId, volume: u16 },
    #[serde(rename_all = "camelCase")]
    Equalizer { guild_id: GuildId, bands: Vec<EqBand> },
    #[serde(rename_all = "camelCase")]
    Destroy { guild_id: GuildId },
    #[serde(rename_all = "camelCase")]
    VoiceUpdate {
        guild_id: GuildId,
        session_id: String,
        event: VoiceServerUpdate,
    },
}

impl OutgoingOp {
    pub fn play(guild_id: GuildId, track: String, options: PlayOptions) -> Self {
        Self::Play {
            guild_id,
            track,
            start_time: options.start_time,
            end_time: options.end_time,
            no_replace: options.no_replace,
        }
    }
}
