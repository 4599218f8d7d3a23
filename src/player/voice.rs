use tracing::debug;

use crate::{
    common::{GuildId, UserId},
    manager::ManagerEvent,
    player::Player,
    protocol::{OutgoingOp, VoicePacket, VoiceServerUpdate},
};

/// Accumulates the two chat-platform voice events into one `voiceUpdate`.
///
/// `op` and `guildId` are fixed at construction; `event` and `sessionId`
/// arrive in either order. The merged update is handed out once per
/// distinct complete record.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceRecord {
    guild_id: GuildId,
    session_id: Option<String>,
    event: Option<VoiceServerUpdate>,
    dispatched: Option<(String, VoiceServerUpdate)>,
}

impl VoiceRecord {
    pub fn new(guild_id: GuildId) -> Self {
        Self {
            guild_id,
            session_id: None,
            event: None,
            dispatched: None,
        }
    }

    pub fn set_event(&mut self, event: VoiceServerUpdate) {
        self.event = Some(event);
    }

    pub fn set_session_id(&mut self, session_id: String) {
        self.session_id = Some(session_id);
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn is_complete(&self) -> bool {
        self.session_id.is_some() && self.event.is_some()
    }

    /// Forget everything learnt so far, including what was already sent.
    pub fn reset(&mut self) {
        self.session_id = None;
        self.event = None;
        self.dispatched = None;
    }

    /// The merged update when complete, regardless of what was sent before.
    pub fn update(&self) -> Option<OutgoingOp> {
        match (&self.session_id, &self.event) {
            (Some(session_id), Some(event)) => Some(OutgoingOp::VoiceUpdate {
                guild_id: self.guild_id.clone(),
                session_id: session_id.clone(),
                event: event.clone(),
            }),
            _ => None,
        }
    }

    /// The merged update if it is complete and differs from the last one handed out.
    pub fn take_update(&mut self) -> Option<OutgoingOp> {
        let (session_id, event) = (self.session_id.clone()?, self.event.clone()?);
        if self
            .dispatched
            .as_ref()
            .is_some_and(|(s, e)| *s == session_id && *e == event)
        {
            return None;
        }
        self.dispatched = Some((session_id, event));
        self.update()
    }
}

impl Player {
    /// Merge one voice packet into this player's record and forward the
    /// completed update to the bound node.
    pub(crate) fn apply_voice_packet(&self, packet: VoicePacket, client_id: &UserId) {
        let mut events = Vec::new();
        let mut pause_after = false;

        let update = {
            let mut state = self.state.lock();
            match packet {
                VoicePacket::Server(server) => state.voice.set_event(server),
                VoicePacket::State(voice_state) => {
                    if &voice_state.user_id != client_id {
                        return;
                    }

                    match voice_state.channel_id {
                        Some(channel) => {
                            if state.voice_channel.as_ref() != Some(&channel) {
                                events.push(ManagerEvent::PlayerMove {
                                    guild_id: self.guild_id.clone(),
                                    old_channel: state.voice_channel.clone(),
                                    new_channel: channel.clone(),
                                });
                                state.voice_channel = Some(channel);
                            }
                            state.voice.set_session_id(voice_state.session_id);
                        }
                        None => {
                            events.push(ManagerEvent::PlayerDisconnect {
                                guild_id: self.guild_id.clone(),
                                old_channel: state.voice_channel.take(),
                            });
                            state.voice.reset();
                            pause_after = true;
                        }
                    }
                }
            }
            state.voice.take_update()
        };

        for event in events {
            self.emit(event);
        }
        if pause_after {
            self.pause(true);
        }
        if let Some(update) = update {
            debug!("[{}] Forwarding voice update", self.guild_id);
            self.dispatch(&update);
        }
    }
}
