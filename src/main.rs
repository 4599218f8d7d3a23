use std::sync::Arc;

use erelink::{
    Manager, ManagerEvent, SendFn,
    common::{logger, types::AnyResult},
    configs::Config,
};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> AnyResult<()> {
    let config = Config::load()?;
    logger::init(config.logging.as_ref());

    // Without a gateway connection, join/leave payloads are only logged.
    let send: SendFn = Arc::new(|guild_id, payload| {
        info!(
            "[{}] Gateway payload: {}",
            guild_id,
            serde_json::to_string(&payload).unwrap_or_default()
        );
    });

    let manager = Manager::new(config.manager.clone(), config.nodes.clone(), send)?;
    let mut events = manager.subscribe();
    let registry = Arc::downgrade(&manager);

    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ManagerEvent::NodeRaw { .. }) => {}
                Ok(ManagerEvent::NodeReconnect { node }) => {
                    let attempt = registry
                        .upgrade()
                        .and_then(|manager| manager.node(&node))
                        .map(|n| n.reconnect_attempts())
                        .unwrap_or_default();
                    info!("[{}] Reconnecting, attempt {}", node, attempt)
                }
                Ok(ManagerEvent::NodeError { node, error }) if error.is_fatal() => {
                    error!("[{}] {}", node, error)
                }
                Ok(ManagerEvent::NodeError { node, error }) => warn!("[{}] {}", node, error),
                Ok(event) => info!("{:?}", event),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Event listener lagged behind by {} events", skipped)
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let client_id = std::env::var("ERELINK_CLIENT_ID")
        .map_err(|_| "ERELINK_CLIENT_ID must be set to the bot's user id")?;
    manager.init(client_id).await;

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    for node in manager.nodes() {
        node.destroy();
    }
    Ok(())
}
