use std::{
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
    },
    time::Duration,
};

use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        Utf8Bytes,
        client::IntoClientRequest,
        handshake::client::Request,
        http::HeaderValue,
        protocol::{CloseFrame, Message, frame::coding::CloseCode},
    },
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    common::{ClientError, ClientResult, HttpClient, NodeId},
    configs::{ManagerConfig, NodeOptions},
    manager::{Manager, ManagerEvent},
    protocol::NodeStats,
};

pub mod constants;
pub mod handler;
pub mod rest;

pub use rest::RequestOptions;

use self::constants::{
    ABNORMAL_CLOSE_CODE, DESTROY_CLOSE_REASON, NORMAL_CLOSE_CODE, WRITE_TASK_SHUTDOWN_MS,
};

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// One backend connection: a socket for playback control and REST for
/// track loading.
pub struct Node {
    id: NodeId,
    options: NodeOptions,
    client_name: String,
    shards: u32,
    manager: Weak<Manager>,
    pub(crate) http: reqwest::Client,
    calls: AtomicU64,
    attempts: AtomicU32,
    connected: AtomicBool,
    destroyed: AtomicBool,
    stats: RwLock<NodeStats>,
    sender: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    cancel: Mutex<CancellationToken>,
    reconnect: Mutex<Option<JoinHandle<()>>>,
}

impl Node {
    pub(crate) fn new(
        options: NodeOptions,
        config: &ManagerConfig,
        manager: Weak<Manager>,
    ) -> ClientResult<Self> {
        options.validate()?;
        let http = HttpClient::new(&config.client_name, options.request_timeout())?;

        Ok(Self {
            id: options.id(),
            options,
            client_name: config.client_name.clone(),
            shards: config.shards,
            manager,
            http,
            calls: AtomicU64::new(0),
            attempts: AtomicU32::new(0),
            connected: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
            stats: RwLock::new(NodeStats::default()),
            sender: Mutex::new(None),
            cancel: Mutex::new(CancellationToken::new()),
            reconnect: Mutex::new(None),
        })
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn options(&self) -> &NodeOptions {
        &self.options
    }

    /// Last statistics pushed by the backend.
    pub fn stats(&self) -> NodeStats {
        self.stats.read().clone()
    }

    /// REST calls issued so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.attempts.load(Ordering::Relaxed)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// CPU load used for player placement.
    pub fn penalty_load(&self) -> f64 {
        self.stats.read().load()
    }

    /// Open the socket. Failures are reported as events and retried.
    pub async fn connect(self: &Arc<Self>) {
        if self.is_connected() || self.is_destroyed() {
            return;
        }

        let request = match self.build_request() {
            Ok(request) => request,
            Err(e) => {
                warn!("[{}] Cannot build socket request: {}", self.id, e);
                self.emit_error(e);
                return;
            }
        };

        debug!("[{}] Connecting to {}", self.id, self.options.socket_url());
        match connect_async(request).await {
            Ok((stream, _)) => self.on_open(stream),
            Err(e) => {
                warn!("[{}] Connection failed: {}", self.id, e);
                self.emit_error(e.into());
                self.schedule_reconnect();
            }
        }
    }

    /// Queue a JSON object for the backend.
    ///
    /// Returns `Ok(false)` when no socket is open.
    pub fn send<T: Serialize + ?Sized>(&self, payload: &T) -> ClientResult<bool> {
        let value = serde_json::to_value(payload)?;
        match value.as_object() {
            Some(object) if !object.is_empty() => {}
            _ => return Err(ClientError::InvalidPayload),
        }

        let sender = self.sender.lock();
        let Some(tx) = sender.as_ref() else {
            return Ok(false);
        };
        let text = serde_json::to_string(&value)?;
        Ok(tx.send(Message::Text(text.into())).is_ok())
    }

    /// Close the socket for good and hand bound players to other nodes.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("[{}] Destroying node", self.id);

        if let Some(tx) = self.sender.lock().take() {
            let _ = tx.send(Message::Close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: Utf8Bytes::from_static(DESTROY_CLOSE_REASON),
            })));
        }
        self.connected.store(false, Ordering::Release);
        self.cancel.lock().cancel();
        if let Some(handle) = self.reconnect.lock().take() {
            handle.abort();
        }

        if let Some(manager) = self.manager.upgrade() {
            manager.on_node_destroyed(&self.id);
        }
    }

    fn build_request(&self) -> ClientResult<Request> {
        let manager = self.manager.upgrade().ok_or(ClientError::NotInitialised)?;
        let user_id = manager.client_id().ok_or(ClientError::NotInitialised)?;

        let mut request = self.options.socket_url().into_client_request()?;
        let headers = request.headers_mut();
        headers.insert("Authorization", header(&self.options.password)?);
        headers.insert("Num-Shards", header(&self.shards.to_string())?);
        headers.insert("User-Id", header(&user_id)?);
        headers.insert("Client-Name", header(&self.client_name)?);
        Ok(request)
    }

    fn on_open(self: &Arc<Self>, stream: Socket) {
        if self.is_destroyed() {
            return;
        }

        let (mut write, mut read) = stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        let token = CancellationToken::new();

        std::mem::replace(&mut *self.cancel.lock(), token.clone()).cancel();
        *self.sender.lock() = Some(tx);
        if let Some(handle) = self.reconnect.lock().take() {
            handle.abort();
        }
        self.attempts.store(0, Ordering::Relaxed);
        self.connected.store(true, Ordering::Release);

        info!("[{}] Connected", self.id);
        self.emit(ManagerEvent::NodeConnect {
            node: self.id.clone(),
        });

        let write_cancel = token.clone();
        let id = self.id.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    msg = rx.recv() => {
                        let Some(msg) = msg else { break };
                        let closing = matches!(msg, Message::Close(_));
                        if let Err(e) = write.send(msg).await {
                            warn!("[{}] WS write error: {}", id, e);
                            break;
                        }
                        if closing {
                            break;
                        }
                    }
                    _ = write_cancel.cancelled() => break,
                }
            }
            let _ = tokio::time::timeout(
                Duration::from_millis(WRITE_TASK_SHUTDOWN_MS),
                write.close(),
            )
            .await;
        });

        let node = Arc::clone(self);
        tokio::spawn(async move {
            let closed = loop {
                tokio::select! {
                    _ = token.cancelled() => break None,
                    msg = read.next() => match msg {
                        Some(Ok(Message::Text(text))) => node.handle_message(text.as_str()),
                        Some(Ok(Message::Close(frame))) => {
                            break Some(
                                frame
                                    .map(|cf| (u16::from(cf.code), cf.reason.to_string()))
                                    .unwrap_or((ABNORMAL_CLOSE_CODE, String::new())),
                            );
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!("[{}] WS read error: {}", node.id, e);
                            let reason = e.to_string();
                            node.emit_error(e.into());
                            break Some((ABNORMAL_CLOSE_CODE, reason));
                        }
                        None => break Some((ABNORMAL_CLOSE_CODE, "stream ended".to_string())),
                    }
                }
            };

            token.cancel();
            if let Some((code, reason)) = closed {
                node.on_close(code, reason);
            }
        });
    }

    fn on_close(self: &Arc<Self>, code: u16, reason: String) {
        self.connected.store(false, Ordering::Release);
        self.sender.lock().take();

        info!("[{}] Disconnected: code={}, reason='{}'", self.id, code, reason);
        let deliberate = code == NORMAL_CLOSE_CODE && reason == DESTROY_CLOSE_REASON;
        self.emit(ManagerEvent::NodeDisconnect {
            node: self.id.clone(),
            code,
            reason,
        });

        if deliberate || self.is_destroyed() {
            return;
        }
        self.schedule_reconnect();
    }

    /// Arms the single reconnect timer unless one is already pending.
    fn schedule_reconnect(self: &Arc<Self>) {
        if self.is_destroyed() {
            return;
        }

        let mut slot = self.reconnect.lock();
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        let delay = self.options.retry_delay();
        debug!("[{}] Reconnecting in {:?}", self.id, delay);
        let node = Arc::clone(self);
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            node.reconnect.lock().take();
            node.attempt_reconnect().await;
        }));
    }

    async fn attempt_reconnect(self: &Arc<Self>) {
        if self.is_destroyed() || self.is_connected() {
            return;
        }

        let attempts = self.attempts.load(Ordering::Relaxed);
        if attempts >= self.options.retry_amount {
            error!("[{}] Giving up after {} reconnect attempts", self.id, attempts);
            self.emit_error(ClientError::ReconnectExhausted(attempts));
            self.destroy();
            return;
        }

        self.attempts.fetch_add(1, Ordering::Relaxed);
        self.emit(ManagerEvent::NodeReconnect {
            node: self.id.clone(),
        });
        self.connect().await;
    }

    pub(crate) fn manager(&self) -> Option<Arc<Manager>> {
        self.manager.upgrade()
    }

    pub(crate) fn emit(&self, event: ManagerEvent) {
        if let Some(manager) = self.manager.upgrade() {
            manager.emit(event);
        }
    }

    pub(crate) fn emit_error(&self, error: ClientError) {
        self.emit(ManagerEvent::NodeError {
            node: self.id.clone(),
            error: Arc::new(error),
        });
    }

    pub(crate) fn store_stats(&self, stats: NodeStats) {
        *self.stats.write() = stats;
    }

    /// Stands in for an open socket; frames sent to the node land in the
    /// returned receiver.
    #[cfg(test)]
    pub(crate) fn attach_test_socket(&self) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.sender.lock() = Some(tx);
        self.connected.store(true, Ordering::Release);
        rx
    }

    #[cfg(test)]
    pub(crate) fn set_calls(&self, calls: u64) {
        self.calls.store(calls, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("connected", &self.is_connected())
            .field("destroyed", &self.is_destroyed())
            .field("calls", &self.calls())
            .finish()
    }
}

fn header(value: &str) -> ClientResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| ClientError::InvalidNodeOptions(format!("invalid header value: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::tests::{manager_with_socket, next_frame};
    use serde_json::json;

    #[tokio::test]
    async fn test_send_rejects_non_object_payloads() {
        let (manager, mut rx, _sends) = manager_with_socket();
        let node = manager.nodes().remove(0);

        assert!(matches!(node.send(&json!([1, 2])), Err(ClientError::InvalidPayload)));
        assert!(matches!(node.send(&json!({})), Err(ClientError::InvalidPayload)));
        assert!(matches!(node.send(&json!("stop")), Err(ClientError::InvalidPayload)));
        assert!(rx.try_recv().is_err());

        assert!(node.send(&json!({ "op": "stop", "guildId": "1" })).unwrap());
        assert_eq!(next_frame(&mut rx).await["op"], "stop");
    }

    #[tokio::test]
    async fn test_send_without_socket_returns_false() {
        let manager = Manager::new(
            ManagerConfig::default(),
            Vec::new(),
            crate::manager::tests::noop_send(),
        )
        .unwrap();
        let node = manager.nodes().remove(0);

        assert!(!node.is_connected());
        assert!(!node.send(&json!({ "op": "stop", "guildId": "1" })).unwrap());
    }

    #[tokio::test]
    async fn test_destroy_sends_close_frame_and_is_idempotent() {
        let (manager, mut rx, _sends) = manager_with_socket();
        let mut events = manager.subscribe();
        let node = manager.nodes().remove(0);

        node.destroy();
        node.destroy();

        match rx.recv().await {
            Some(Message::Close(Some(frame))) => {
                assert_eq!(frame.code, CloseCode::Normal);
                assert_eq!(frame.reason.as_str(), DESTROY_CLOSE_REASON);
            }
            other => panic!("expected close frame, got {:?}", other),
        }
        assert!(rx.recv().await.is_none());
        assert!(node.is_destroyed());
        assert!(manager.nodes().is_empty());

        let mut destroyed = 0;
        while let Ok(event) = events.try_recv() {
            if matches!(event, ManagerEvent::NodeDestroy { .. }) {
                destroyed += 1;
            }
        }
        assert_eq!(destroyed, 1);
    }

    #[tokio::test]
    async fn test_reconnect_exhaustion_destroys_once() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut options = NodeOptions::new("127.0.0.1", port);
        options.retry_amount = 3;
        options.retry_delay_ms = 10;
        let manager = Manager::new(
            ManagerConfig::default(),
            vec![options],
            crate::manager::tests::noop_send(),
        )
        .unwrap();
        let mut events = manager.subscribe();
        let node = manager.nodes().remove(0);

        manager.init("99").await;

        let mut fatal = 0;
        let mut reconnects = 0;
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
                .await
                .expect("node should give up in time")
                .unwrap();
            match event {
                ManagerEvent::NodeError { error, .. } if error.is_fatal() => fatal += 1,
                ManagerEvent::NodeReconnect { .. } => reconnects += 1,
                ManagerEvent::NodeDestroy { .. } => break,
                _ => {}
            }
        }

        assert_eq!(fatal, 1);
        assert_eq!(reconnects, 3);
        assert!(node.is_destroyed());
        assert!(manager.nodes().is_empty());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(events.try_recv().is_err());
        assert!(node.reconnect.lock().is_none());
    }
}
