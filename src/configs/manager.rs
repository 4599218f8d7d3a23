use serde::{Deserialize, Serialize};

use crate::common::HttpClient;

/// Platform used to prefix non-URL search queries.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SearchPlatform {
    #[default]
    Youtube,
    YoutubeMusic,
    Soundcloud,
}

impl SearchPlatform {
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Youtube => "ytsearch",
            Self::YoutubeMusic => "ytmsearch",
            Self::Soundcloud => "scsearch",
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "snake_case")]
pub struct ManagerConfig {
    /// Sent as `Client-Name` and used as the REST user agent.
    #[serde(default = "default_client_name")]
    pub client_name: String,
    #[serde(default = "default_shards")]
    pub shards: u32,
    /// Let the track-end handler start the next track on its own.
    #[serde(default = "default_autoplay")]
    pub autoplay: bool,
    #[serde(default)]
    pub default_search_platform: SearchPlatform,
    /// Buffered notifications per subscriber before slow receivers lag.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            client_name: default_client_name(),
            shards: default_shards(),
            autoplay: default_autoplay(),
            default_search_platform: SearchPlatform::default(),
            event_capacity: default_event_capacity(),
        }
    }
}

fn default_client_name() -> String {
    HttpClient::default_user_agent()
}

fn default_shards() -> u32 {
    1
}

fn default_autoplay() -> bool {
    true
}

fn default_event_capacity() -> usize {
    256
}
