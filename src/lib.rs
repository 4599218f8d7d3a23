//! Client for Lavalink v3 audio nodes: node connections, load balancing,
//! per-guild players with queues, and voice-state forwarding.

pub mod common;
pub mod configs;
pub mod manager;
pub mod node;
pub mod player;
pub mod protocol;
pub mod track;

pub use common::{ClientError, ClientResult, GuildId, NodeId, UserId};
pub use manager::{Manager, ManagerEvent, SearchQuery, SearchResult};
pub use node::Node;
pub use player::{Player, PlayerOptions, Queue, QueueBehavior, SendFn};
pub use track::{QueueItem, Track, UnresolvedTrack};
