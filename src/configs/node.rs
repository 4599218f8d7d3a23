use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::common::{ClientError, ClientResult, NodeId};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 2333;
pub const DEFAULT_PASSWORD: &str = "youshallnotpass";
pub const DEFAULT_RETRY_AMOUNT: u32 = 5;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 30_000;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Connection options for one backend node.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "snake_case")]
pub struct NodeOptions {
    /// Falls back to `host:port` when not set.
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_password")]
    pub password: String,
    /// Use `wss://` and `https://`.
    #[serde(default)]
    pub secure: bool,
    /// Consecutive failed connections tolerated before the node is destroyed.
    #[serde(default = "default_retry_amount")]
    pub retry_amount: u32,
    /// Fixed delay between reconnect attempts.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for NodeOptions {
    fn default() -> Self {
        Self {
            identifier: None,
            host: default_host(),
            port: default_port(),
            password: default_password(),
            secure: false,
            retry_amount: default_retry_amount(),
            retry_delay_ms: default_retry_delay_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl NodeOptions {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn id(&self) -> NodeId {
        match &self.identifier {
            Some(id) => NodeId(id.clone()),
            None => NodeId(format!("{}:{}", self.host, self.port)),
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn socket_url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{}://{}:{}/", scheme, self.host, self.port)
    }

    pub fn rest_url(&self, endpoint: &str) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!(
            "{}://{}:{}/{}",
            scheme,
            self.host,
            self.port,
            endpoint.trim_start_matches('/')
        )
    }

    /// Rejects options that can never produce a working connection.
    pub fn validate(&self) -> ClientResult<()> {
        if self.host.trim().is_empty() || self.host.contains(['/', ' ']) {
            return Err(ClientError::InvalidNodeOptions(format!(
                "invalid host \"{}\"",
                self.host
            )));
        }
        if self.port == 0 {
            return Err(ClientError::InvalidNodeOptions("port must not be 0".into()));
        }
        if self.retry_amount == 0 {
            return Err(ClientError::InvalidNodeOptions(
                "retry_amount must be at least 1".into(),
            ));
        }
        if matches!(&self.identifier, Some(id) if id.trim().is_empty()) {
            return Err(ClientError::InvalidNodeOptions(
                "identifier must not be empty".into(),
            ));
        }
        Ok(())
    }
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_password() -> String {
    DEFAULT_PASSWORD.to_string()
}

fn default_retry_amount() -> u32 {
    DEFAULT_RETRY_AMOUNT
}

fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}
