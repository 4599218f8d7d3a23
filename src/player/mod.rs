use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    common::{ChannelId, ClientError, ClientResult, GuildId},
    manager::{Manager, ManagerEvent, SearchQuery, SearchResult},
    node::Node,
    protocol::{EqBand, GatewayVoiceState, OutgoingOp, PlayOptions},
    track::QueueItem,
};

pub mod queue;
pub mod state;
pub mod track_end;
pub mod voice;

pub use queue::{Queue, QueueBehavior, QueueFactory, default_queue_factory};
pub use state::*;
pub use track_end::TrackEndOutcome;
pub use voice::VoiceRecord;

/// Host hook that delivers a gateway payload to the chat platform's shard
/// owning the guild.
pub type SendFn = Arc<dyn Fn(&GuildId, GatewayVoiceState) + Send + Sync>;

/// Playback session of one guild.
pub struct Player {
    guild_id: GuildId,
    manager: Weak<Manager>,
    node: RwLock<Arc<Node>>,
    send: SendFn,
    pub(crate) state: Mutex<PlayerState>,
}

impl Player {
    pub(crate) fn new(
        options: &PlayerOptions,
        node: Arc<Node>,
        manager: Weak<Manager>,
        send: SendFn,
        queue: Box<dyn QueueBehavior>,
    ) -> Self {
        Self {
            guild_id: options.guild_id.clone(),
            manager,
            node: RwLock::new(node),
            send,
            state: Mutex::new(PlayerState::new(options, queue)),
        }
    }

    pub fn guild_id(&self) -> &GuildId {
        &self.guild_id
    }

    pub fn node(&self) -> Arc<Node> {
        self.node.read().clone()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state.lock().connection
    }

    pub fn is_destroyed(&self) -> bool {
        self.connection_state() == ConnectionState::Destroying
    }

    pub fn voice_channel(&self) -> Option<ChannelId> {
        self.state.lock().voice_channel.clone()
    }

    pub fn text_channel(&self) -> Option<ChannelId> {
        self.state.lock().text_channel.clone()
    }

    pub fn self_mute(&self) -> bool {
        self.state.lock().self_mute
    }

    pub fn self_deaf(&self) -> bool {
        self.state.lock().self_deaf
    }

    pub fn playing(&self) -> bool {
        self.state.lock().playing
    }

    pub fn paused(&self) -> bool {
        self.state.lock().paused
    }

    pub fn track_repeat(&self) -> bool {
        self.state.lock().track_repeat
    }

    pub fn queue_repeat(&self) -> bool {
        self.state.lock().queue_repeat
    }

    pub fn volume(&self) -> u16 {
        self.state.lock().volume
    }

    pub fn bands(&self) -> [f32; EQ_BAND_COUNT] {
        self.state.lock().bands
    }

    /// Last reported position in milliseconds.
    pub fn position(&self) -> u64 {
        self.state.lock().position
    }

    pub fn current(&self) -> Option<QueueItem> {
        self.state.lock().queue.current().cloned()
    }

    pub fn previous(&self) -> Option<QueueItem> {
        self.state.lock().queue.previous().cloned()
    }

    /// Runs `f` against the queue while the player lock is held.
    ///
    /// `f` must not call back into this player.
    pub fn with_queue<R>(&self, f: impl FnOnce(&mut dyn QueueBehavior) -> R) -> R {
        let mut state = self.state.lock();
        f(state.queue.as_mut())
    }

    /// Ask the chat platform to join the bound voice channel.
    pub fn connect(&self) -> ClientResult<()> {
        let payload = {
            let mut state = self.state.lock();
            if state.connection == ConnectionState::Destroying {
                return Err(ClientError::PlayerDestroyed(self.guild_id.to_string()));
            }
            let channel = state
                .voice_channel
                .clone()
                .ok_or(ClientError::NoVoiceChannel)?;
            state.connection = ConnectionState::Connecting;
            GatewayVoiceState::new(
                self.guild_id.clone(),
                Some(channel),
                state.self_mute,
                state.self_deaf,
            )
        };

        (self.send)(&self.guild_id, payload);
        self.transition(ConnectionState::Connected);
        debug!("[{}] Voice join requested", self.guild_id);
        Ok(())
    }

    /// Leave the voice channel; playback is paused first.
    pub fn disconnect(&self) {
        {
            let mut state = self.state.lock();
            if state.voice_channel.is_none() {
                return;
            }
            if state.connection != ConnectionState::Destroying {
                state.connection = ConnectionState::Disconnecting;
            }
        }

        self.pause(true);

        let payload = {
            let state = self.state.lock();
            GatewayVoiceState::new(self.guild_id.clone(), None, state.self_mute, state.self_deaf)
        };
        (self.send)(&self.guild_id, payload);

        self.state.lock().voice_channel = None;
        self.transition(ConnectionState::Disconnected);
        debug!("[{}] Voice leave requested", self.guild_id);
    }

    /// Tear the session down on both sides and drop it from the manager.
    pub fn destroy(&self) {
        {
            let mut state = self.state.lock();
            if state.connection == ConnectionState::Destroying {
                return;
            }
            state.connection = ConnectionState::Destroying;
        }

        self.disconnect();
        self.dispatch(&OutgoingOp::Destroy {
            guild_id: self.guild_id.clone(),
        });
        self.emit(ManagerEvent::PlayerDestroy {
            guild_id: self.guild_id.clone(),
        });

        if let Some(manager) = self.manager.upgrade() {
            manager.remove_player(&self.guild_id);
        }
        debug!("[{}] Player destroyed", self.guild_id);
    }

    /// Play `track`, or the current track when `None`.
    ///
    /// Unresolved tracks are searched for first; a track that cannot be
    /// resolved is reported and skipped in favour of the next one.
    pub async fn play(&self, track: Option<QueueItem>, options: PlayOptions) -> ClientResult<()> {
        {
            let mut state = self.state.lock();
            if state.connection == ConnectionState::Destroying {
                return Err(ClientError::PlayerDestroyed(self.guild_id.to_string()));
            }
            if let Some(track) = track {
                let replaced = state.queue.set_current(Some(track));
                if replaced.is_some() {
                    state.queue.set_previous(replaced);
                }
            }
            if state.queue.current().is_none() {
                return Err(ClientError::NoCurrentTrack);
            }
        }

        loop {
            let current = self.state.lock().queue.current().cloned();
            let unresolved = match current {
                None => return Ok(()),
                Some(QueueItem::Track(track)) => {
                    self.state.lock().position = options.start_time.unwrap_or(0);
                    self.dispatch(&OutgoingOp::play(
                        self.guild_id.clone(),
                        track.track,
                        options,
                    ));
                    return Ok(());
                }
                Some(QueueItem::Unresolved(unresolved)) => unresolved,
            };

            let manager = self.manager.upgrade().ok_or(ClientError::NotInitialised)?;
            match unresolved.resolve(&manager).await {
                Ok(resolved) => {
                    let mut state = self.state.lock();
                    let still_current = matches!(
                        state.queue.current(),
                        Some(QueueItem::Unresolved(item)) if *item == unresolved
                    );
                    if still_current {
                        state.queue.set_current(Some(resolved.into()));
                    }
                }
                Err(e) => {
                    warn!("[{}] Unable to resolve \"{}\": {}", self.guild_id, unresolved.title, e);
                    self.emit(ManagerEvent::TrackError {
                        guild_id: self.guild_id.clone(),
                        track: Some(unresolved.into()),
                        error: Arc::new(e),
                    });

                    let mut state = self.state.lock();
                    if state.queue.is_empty() {
                        return Ok(());
                    }
                    let next = state.queue.shift();
                    let failed = state.queue.set_current(next);
                    state.queue.set_previous(failed);
                }
            }
        }
    }

    /// Search through the manager on behalf of this player.
    pub async fn search(
        &self,
        query: impl Into<SearchQuery>,
        requester: Option<Value>,
    ) -> ClientResult<SearchResult> {
        let manager = self.manager.upgrade().ok_or(ClientError::NotInitialised)?;
        manager.search(query.into(), requester).await
    }

    /// Clamps to `0..=1000` and returns the applied volume.
    pub fn set_volume(&self, volume: i32) -> u16 {
        let volume = clamp_volume(volume);
        self.state.lock().volume = volume;
        self.dispatch(&OutgoingOp::Volume {
            guild_id: self.guild_id.clone(),
            volume,
        });
        volume
    }

    /// Updates the given bands and sends all fifteen.
    pub fn set_eq(&self, bands: &[EqBand]) -> ClientResult<()> {
        if bands.is_empty() {
            return Err(ClientError::InvalidEqualizer("no bands given".into()));
        }
        for band in bands {
            if usize::from(band.band) >= EQ_BAND_COUNT {
                return Err(ClientError::InvalidEqualizer(format!(
                    "band {} is out of range",
                    band.band
                )));
            }
            if !(MIN_EQ_GAIN..=MAX_EQ_GAIN).contains(&band.gain) {
                return Err(ClientError::InvalidEqualizer(format!(
                    "gain {} of band {} is out of range",
                    band.gain, band.band
                )));
            }
        }

        let all = {
            let mut state = self.state.lock();
            for band in bands {
                state.bands[usize::from(band.band)] = band.gain;
            }
            full_bands(&state.bands)
        };
        self.dispatch(&OutgoingOp::Equalizer {
            guild_id: self.guild_id.clone(),
            bands: all,
        });
        Ok(())
    }

    pub fn clear_eq(&self) {
        let all = {
            let mut state = self.state.lock();
            state.bands = [0.0; EQ_BAND_COUNT];
            full_bands(&state.bands)
        };
        self.dispatch(&OutgoingOp::Equalizer {
            guild_id: self.guild_id.clone(),
            bands: all,
        });
    }

    /// Enabling clears queue repeat; disabling clears both.
    pub fn set_track_repeat(&self, repeat: bool) {
        let mut state = self.state.lock();
        state.track_repeat = repeat;
        state.queue_repeat = false;
    }

    /// Enabling clears track repeat; disabling clears both.
    pub fn set_queue_repeat(&self, repeat: bool) {
        let mut state = self.state.lock();
        state.queue_repeat = repeat;
        state.track_repeat = false;
    }

    /// No-op when already in the requested state or when nothing is queued.
    pub fn pause(&self, pause: bool) {
        {
            let mut state = self.state.lock();
            if state.paused == pause || state.queue.total_size() == 0 {
                return;
            }
            state.playing = !pause;
            state.paused = pause;
        }
        self.dispatch(&OutgoingOp::Pause {
            guild_id: self.guild_id.clone(),
            pause,
        });
    }

    /// Seek within the current track, clamped to its duration.
    pub fn seek(&self, position: u64) {
        let position = {
            let mut state = self.state.lock();
            let Some(duration) = state
                .queue
                .current()
                .and_then(QueueItem::as_track)
                .map(|t| t.duration)
            else {
                return;
            };
            state.position = position.min(duration);
            state.position
        };
        self.dispatch(&OutgoingOp::Seek {
            guild_id: self.guild_id.clone(),
            position,
        });
    }

    /// Stop the current track; with `amount > 1` the next `amount - 1`
    /// upcoming tracks are dropped as well.
    pub fn stop(&self, amount: Option<usize>) -> ClientResult<()> {
        if let Some(amount) = amount.filter(|a| *a > 1) {
            let mut state = self.state.lock();
            let len = state.queue.len();
            if amount > len {
                return Err(ClientError::SkipOutOfRange { amount, len });
            }
            state.queue.remove_range(0, amount - 1)?;
        }

        self.dispatch(&OutgoingOp::Stop {
            guild_id: self.guild_id.clone(),
        });
        Ok(())
    }

    pub fn set_voice_channel(&self, channel: impl Into<ChannelId>) {
        self.state.lock().voice_channel = Some(channel.into());
    }

    pub fn set_text_channel(&self, channel: impl Into<ChannelId>) {
        self.state.lock().text_channel = Some(channel.into());
    }

    /// Move the session to another node and resume where it left off.
    pub fn set_node(&self, node: Arc<Node>) {
        let old = {
            let mut bound = self.node.write();
            if Arc::ptr_eq(&bound, &node) {
                return;
            }
            std::mem::replace(&mut *bound, node)
        };

        if let Err(e) = old.send(&OutgoingOp::Destroy {
            guild_id: self.guild_id.clone(),
        }) {
            warn!("[{}] Failed to release old node {}: {}", self.guild_id, old.id(), e);
        }

        let (voice, resume) = {
            let state = self.state.lock();
            let resume = state
                .queue
                .current()
                .and_then(QueueItem::as_track)
                .filter(|_| state.playing)
                .map(|t| {
                    OutgoingOp::play(
                        self.guild_id.clone(),
                        t.track.clone(),
                        PlayOptions {
                            start_time: Some(state.position),
                            ..Default::default()
                        },
                    )
                });
            (state.voice.update(), resume)
        };

        if let Some(voice) = voice {
            self.dispatch(&voice);
        }
        if let Some(resume) = resume {
            self.dispatch(&resume);
        }
        debug!("[{}] Moved from node {} to {}", self.guild_id, old.id(), self.node().id());
    }

    pub(crate) fn set_position(&self, position: u64) {
        self.state.lock().position = position;
    }

    pub(crate) fn on_track_start(&self) {
        let mut state = self.state.lock();
        state.playing = true;
        state.paused = false;
    }

    pub(crate) fn emit(&self, event: ManagerEvent) {
        if let Some(manager) = self.manager.upgrade() {
            manager.emit(event);
        }
    }

    /// Send an op to the bound node, logging instead of failing.
    pub(crate) fn dispatch(&self, op: &OutgoingOp) {
        let node = self.node();
        match node.send(op) {
            Ok(true) => {}
            Ok(false) => debug!(
                "[{}] Node {} is not connected; dropped {:?}",
                self.guild_id,
                node.id(),
                op
            ),
            Err(e) => warn!("[{}] Failed to send to node {}: {}", self.guild_id, node.id(), e),
        }
    }

    fn transition(&self, next: ConnectionState) {
        let mut state = self.state.lock();
        if state.connection != ConnectionState::Destroying {
            state.connection = next;
        }
    }
}

impl std::fmt::Debug for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player")
            .field("guild_id", &self.guild_id)
            .field("node", self.node().id())
            .field("state", &self.connection_state())
            .finish()
    }
}

fn full_bands(gains: &[f32; EQ_BAND_COUNT]) -> Vec<EqBand> {
    gains
        .iter()
        .enumerate()
        .map(|(band, gain)| EqBand {
            band: band as u8,
            gain: *gain,
        })
        .collect()
}
