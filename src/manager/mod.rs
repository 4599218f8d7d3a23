use std::sync::{Arc, Weak};

use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{
    common::{ClientError, ClientResult, GuildId, NodeId, UserId},
    configs::{ManagerConfig, NodeOptions},
    node::Node,
    player::{Player, PlayerOptions, QueueFactory, SendFn, default_queue_factory},
    protocol::VoicePacket,
};

pub mod balancer;
pub mod events;
pub mod search;

pub use balancer::BalanceStrategy;
pub use events::ManagerEvent;
pub use search::{PlaylistSummary, SearchQuery, SearchResult};

/// Registry of nodes and players; the entry point for a host application.
pub struct Manager {
    me: Weak<Manager>,
    pub(crate) config: ManagerConfig,
    nodes: RwLock<Vec<Arc<Node>>>,
    players: DashMap<GuildId, Arc<Player>>,
    client_id: RwLock<Option<UserId>>,
    send: SendFn,
    queue_factory: QueueFactory,
    events: broadcast::Sender<ManagerEvent>,
}

impl Manager {
    /// Build a manager with the default queue. Without node options a single
    /// `localhost:2333` node is registered.
    pub fn new(
        config: ManagerConfig,
        nodes: Vec<NodeOptions>,
        send: SendFn,
    ) -> ClientResult<Arc<Self>> {
        Self::with_queue_factory(config, nodes, send, default_queue_factory())
    }

    /// Like [`Manager::new`] but every player gets its queue from `factory`.
    pub fn with_queue_factory(
        config: ManagerConfig,
        nodes: Vec<NodeOptions>,
        send: SendFn,
        factory: QueueFactory,
    ) -> ClientResult<Arc<Self>> {
        let nodes = if nodes.is_empty() {
            vec![NodeOptions::default()]
        } else {
            nodes
        };

        let mut seen = Vec::with_capacity(nodes.len());
        for options in &nodes {
            options.validate()?;
            let id = options.id();
            if seen.contains(&id) {
                return Err(ClientError::InvalidNodeOptions(format!(
                    "duplicate node identifier \"{}\"",
                    id
                )));
            }
            seen.push(id);
        }

        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let mut failure = None;
        let manager = Arc::new_cyclic(|me: &Weak<Manager>| {
            let mut built = Vec::with_capacity(nodes.len());
            for options in nodes {
                match Node::new(options, &config, me.clone()) {
                    Ok(node) => built.push(Arc::new(node)),
                    Err(e) => {
                        failure.get_or_insert(e);
                    }
                }
            }

            Self {
                me: me.clone(),
                config,
                nodes: RwLock::new(built),
                players: DashMap::new(),
                client_id: RwLock::new(None),
                send,
                queue_factory: factory,
                events,
            }
        });

        if let Some(e) = failure {
            return Err(e);
        }
        for node in manager.nodes() {
            manager.emit(ManagerEvent::NodeCreate {
                node: node.id().clone(),
            });
        }
        Ok(manager)
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Whether the next track starts on its own after a track ends.
    pub fn autoplay(&self) -> bool {
        self.config.autoplay
    }

    /// The bot's user id, once [`Manager::init`] has run.
    pub fn client_id(&self) -> Option<UserId> {
        self.client_id.read().clone()
    }

    /// Store the bot's user id and connect every node.
    pub async fn init(&self, client_id: impl Into<UserId>) {
        let client_id = client_id.into();
        info!("Initialising manager for user {}", client_id);
        *self.client_id.write() = Some(client_id);

        let nodes = self.nodes();
        join_all(nodes.iter().map(|node| node.connect())).await;
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ManagerEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: ManagerEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Get or create the player of a guild.
    pub fn create(&self, options: PlayerOptions) -> ClientResult<Arc<Player>> {
        if let Some(player) = self.get(&options.guild_id) {
            return Ok(player);
        }

        let node = match &options.node {
            Some(id) => self
                .node(id)
                .ok_or_else(|| ClientError::UnknownNode(id.to_string()))?,
            None => self
                .least_load_nodes()
                .into_iter()
                .next()
                .ok_or(ClientError::NoAvailableNodes)?,
        };

        let mut created = false;
        let player = self
            .players
            .entry(options.guild_id.clone())
            .or_insert_with(|| {
                created = true;
                Arc::new(Player::new(
                    &options,
                    node,
                    self.me.clone(),
                    Arc::clone(&self.send),
                    (self.queue_factory)(),
                ))
            })
            .clone();

        if created {
            debug!("[{}] Player created", options.guild_id);
            self.emit(ManagerEvent::PlayerCreate {
                guild_id: options.guild_id.clone(),
            });
            if let Some(volume) = options.volume {
                player.set_volume(volume);
            }
        }
        Ok(player)
    }

    pub fn get(&self, guild_id: &GuildId) -> Option<Arc<Player>> {
        self.players.get(guild_id).map(|p| Arc::clone(p.value()))
    }

    /// Destroy the player of a guild, if any.
    pub fn destroy(&self, guild_id: &GuildId) {
        if let Some(player) = self.get(guild_id) {
            player.destroy();
        }
    }

    pub fn players(&self) -> Vec<Arc<Player>> {
        self.players.iter().map(|p| Arc::clone(p.value())).collect()
    }

    pub(crate) fn remove_player(&self, guild_id: &GuildId) {
        self.players.remove(guild_id);
    }

    /// Register another node, connecting it right away once initialised.
    pub async fn create_node(&self, options: NodeOptions) -> ClientResult<Arc<Node>> {
        let id = options.id();
        let node = Arc::new(Node::new(options, &self.config, self.me.clone())?);
        {
            let mut nodes = self.nodes.write();
            if nodes.iter().any(|n| n.id() == &id) {
                return Err(ClientError::InvalidNodeOptions(format!(
                    "duplicate node identifier \"{}\"",
                    id
                )));
            }
            nodes.push(Arc::clone(&node));
        }

        self.emit(ManagerEvent::NodeCreate { node: id });
        if self.client_id().is_some() {
            node.connect().await;
        }
        Ok(node)
    }

    pub fn destroy_node(&self, id: &NodeId) -> ClientResult<()> {
        let node = self
            .node(id)
            .ok_or_else(|| ClientError::UnknownNode(id.to_string()))?;
        node.destroy();
        Ok(())
    }

    /// Nodes in registration order.
    pub fn nodes(&self) -> Vec<Arc<Node>> {
        self.nodes.read().clone()
    }

    pub fn node(&self, id: &NodeId) -> Option<Arc<Node>> {
        self.nodes.read().iter().find(|n| n.id() == id).cloned()
    }

    pub fn least_used_nodes(&self) -> Vec<Arc<Node>> {
        BalanceStrategy::LeastUsed.rank(&self.nodes.read())
    }

    pub fn least_load_nodes(&self) -> Vec<Arc<Node>> {
        BalanceStrategy::LeastLoad.rank(&self.nodes.read())
    }

    /// Unregister a destroyed node and move its players elsewhere.
    pub(crate) fn on_node_destroyed(&self, id: &NodeId) {
        self.nodes.write().retain(|n| n.id() != id);

        let orphans: Vec<Arc<Player>> = self
            .players()
            .into_iter()
            .filter(|p| p.node().id() == id)
            .collect();

        for player in orphans {
            match self.least_load_nodes().into_iter().next() {
                Some(target) => player.set_node(target),
                None => {
                    warn!(
                        "[{}] No node left for player {}; destroying it",
                        id,
                        player.guild_id()
                    );
                    player.destroy();
                }
            }
        }

        info!("[{}] Node removed", id);
        self.emit(ManagerEvent::NodeDestroy { node: id.clone() });
    }

    /// Feed a chat-platform voice event to the player of its guild.
    pub fn update_voice_state(&self, packet: VoicePacket) {
        let Some(client_id) = self.client_id() else {
            warn!("Voice event received before the manager was initialised");
            return;
        };
        let Some(player) = self.get(packet.guild_id()) else {
            return;
        };
        player.apply_voice_packet(packet, &client_id);
    }

    /// Like [`Manager::update_voice_state`] for a raw gateway dispatch.
    /// Returns whether the payload was a voice event.
    pub fn update_voice_state_raw(&self, raw: &Value) -> bool {
        match VoicePacket::from_gateway(raw) {
            Some(packet) => {
                self.update_voice_state(packet);
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("client_id", &self.client_id())
            .field("nodes", &self.nodes())
            .field("players", &self.players.len())
            .finish()
    }
}
