use crate::{
    common::{ChannelId, GuildId, NodeId},
    player::{queue::QueueBehavior, voice::VoiceRecord},
};

pub const EQ_BAND_COUNT: usize = 15;
pub const MIN_EQ_GAIN: f32 = -0.25;
pub const MAX_EQ_GAIN: f32 = 1.0;
pub const MAX_VOLUME: i32 = 1000;
pub const DEFAULT_VOLUME: i32 = 100;

/// Voice connection lifecycle of a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    Connecting,
    Connected,
    #[default]
    Disconnected,
    Disconnecting,
    /// Terminal; the player is gone from the manager.
    Destroying,
}

/// Options for `Manager::create`.
#[derive(Debug, Clone)]
pub struct PlayerOptions {
    pub guild_id: GuildId,
    pub text_channel: Option<ChannelId>,
    pub voice_channel: Option<ChannelId>,
    /// Pin the player to a node instead of the least loaded one.
    pub node: Option<NodeId>,
    pub volume: Option<i32>,
    pub self_mute: bool,
    pub self_deaf: bool,
}

impl PlayerOptions {
    pub fn new(guild_id: impl Into<GuildId>) -> Self {
        Self {
            guild_id: guild_id.into(),
            text_channel: None,
            voice_channel: None,
            node: None,
            volume: None,
            self_mute: false,
            self_deaf: false,
        }
    }

    pub fn voice_channel(mut self, channel: impl Into<ChannelId>) -> Self {
        self.voice_channel = Some(channel.into());
        self
    }

    pub fn text_channel(mut self, channel: impl Into<ChannelId>) -> Self {
        self.text_channel = Some(channel.into());
        self
    }

    pub fn node(mut self, node: impl Into<NodeId>) -> Self {
        self.node = Some(node.into());
        self
    }

    pub fn volume(mut self, volume: i32) -> Self {
        self.volume = Some(volume);
        self
    }

    pub fn self_deaf(mut self, self_deaf: bool) -> Self {
        self.self_deaf = self_deaf;
        self
    }

    pub fn self_mute(mut self, self_mute: bool) -> Self {
        self.self_mute = self_mute;
        self
    }
}

/// Mutable playback state guarded by the player's lock.
pub(crate) struct PlayerState {
    pub text_channel: Option<ChannelId>,
    pub voice_channel: Option<ChannelId>,
    pub self_mute: bool,
    pub self_deaf: bool,
    pub queue: Box<dyn QueueBehavior>,
    pub playing: bool,
    pub paused: bool,
    pub track_repeat: bool,
    pub queue_repeat: bool,
    pub volume: u16,
    pub bands: [f32; EQ_BAND_COUNT],
    /// Milliseconds into the current track, as last reported.
    pub position: u64,
    pub connection: ConnectionState,
    pub voice: VoiceRecord,
}

impl PlayerState {
    pub fn new(options: &PlayerOptions, queue: Box<dyn QueueBehavior>) -> Self {
        Self {
            text_channel: options.text_channel.clone(),
            voice_channel: options.voice_channel.clone(),
            self_mute: options.self_mute,
            self_deaf: options.self_deaf,
            queue,
            playing: false,
            paused: false,
            track_repeat: false,
            queue_repeat: false,
            volume: clamp_volume(options.volume.unwrap_or(DEFAULT_VOLUME)),
            bands: [0.0; EQ_BAND_COUNT],
            position: 0,
            connection: ConnectionState::Disconnected,
            voice: VoiceRecord::new(options.guild_id.clone()),
        }
    }
}

pub fn clamp_volume(volume: i32) -> u16 {
    volume.clamp(0, MAX_VOLUME) as u16
}
