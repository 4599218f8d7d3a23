use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use super::Node;
use crate::{
    common::{BackendException, ClientError, Severity},
    manager::{Manager, ManagerEvent},
    player::{Player, TrackEndOutcome, track_end::apply_track_end},
    protocol::{
        BackendEvent, EVENT_TYPES, IncomingOp, NodeStats, PlayOptions, PlayerUpdate,
        TrackEndReason,
    },
};

impl Node {
    /// Dispatch one text frame from the backend.
    pub(crate) fn handle_message(&self, text: &str) {
        let payload: Value = match serde_json::from_str(text) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("[{}] Unreadable frame: {} - Text: {}", self.id, e, text);
                self.emit_error(e.into());
                return;
            }
        };

        let Some(op) = payload.get("op").filter(|op| !op.is_null()).cloned() else {
            debug!("[{}] Ignoring frame without op", self.id);
            return;
        };

        self.emit(ManagerEvent::NodeRaw {
            node: self.id.clone(),
            payload: payload.clone(),
        });

        match op.as_str().and_then(IncomingOp::parse) {
            Some(IncomingOp::Stats) => match serde_json::from_value::<NodeStats>(payload) {
                Ok(stats) => self.store_stats(stats),
                Err(e) => {
                    warn!("[{}] Malformed stats: {}", self.id, e);
                    self.emit_error(e.into());
                }
            },
            Some(IncomingOp::PlayerUpdate) => {
                match serde_json::from_value::<PlayerUpdate>(payload) {
                    Ok(update) => {
                        if let Some(player) =
                            self.manager().and_then(|m| m.get(&update.guild_id))
                        {
                            player.set_position(update.state.position);
                        }
                    }
                    Err(e) => {
                        warn!("[{}] Malformed playerUpdate: {}", self.id, e);
                        self.emit_error(e.into());
                    }
                }
            }
            Some(IncomingOp::Event) => self.handle_event(payload),
            None => {
                let op = op.as_str().map_or_else(|| op.to_string(), str::to_owned);
                warn!("[{}] Unexpected op \"{}\"", self.id, op);
                self.emit_error(ClientError::UnknownOp(op));
            }
        }
    }

    fn handle_event(&self, payload: Value) {
        let kind = payload
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if !EVENT_TYPES.contains(&kind.as_str()) {
            warn!("[{}] Unknown event type \"{}\"", self.id, kind);
            self.emit_error(ClientError::UnknownEvent(kind));
            return;
        }
        if payload.get("guildId").is_none_or(Value::is_null) {
            debug!("[{}] Ignoring {} without guild", self.id, kind);
            return;
        }

        let event: BackendEvent = match serde_json::from_value(payload) {
            Ok(event) => event,
            Err(e) => {
                warn!("[{}] Malformed {}: {}", self.id, kind, e);
                self.emit_error(e.into());
                return;
            }
        };

        let Some(manager) = self.manager() else {
            return;
        };
        let Some(player) = manager.get(event.guild_id()) else {
            debug!("[{}] {} for unknown guild {}", self.id, kind, event.guild_id());
            return;
        };

        let guild_id = player.guild_id().clone();
        match event {
            BackendEvent::TrackStart { .. } => {
                player.on_track_start();
                self.emit(ManagerEvent::TrackStart {
                    guild_id,
                    track: player.current(),
                });
            }
            BackendEvent::TrackEnd { reason, .. } => {
                self.track_end(&manager, &player, reason);
            }
            BackendEvent::TrackStuck { threshold_ms, .. } => {
                self.emit(ManagerEvent::TrackStuck {
                    guild_id,
                    track: player.current(),
                    threshold_ms,
                });
                self.stop_after_failure(&player);
            }
            BackendEvent::TrackException {
                exception, error, ..
            } => {
                let exception = exception.unwrap_or(BackendException {
                    message: error,
                    severity: Severity::Fault,
                    cause: None,
                });
                self.emit(ManagerEvent::TrackError {
                    guild_id,
                    track: player.current(),
                    error: Arc::new(ClientError::TrackException(exception)),
                });
                self.stop_after_failure(&player);
            }
            BackendEvent::WebSocketClosed {
                code,
                reason,
                by_remote,
                ..
            } => {
                self.emit(ManagerEvent::SocketClosed {
                    guild_id,
                    code,
                    reason,
                    by_remote,
                });
            }
        }
    }

    fn track_end(&self, manager: &Manager, player: &Arc<Player>, reason: TrackEndReason) {
        let (ended, outcome) = {
            let mut state = player.state.lock();
            let ended = state.queue.current().cloned();
            (ended, apply_track_end(&mut state, reason))
        };
        debug!(
            "[{}] Track end for {} ({:?}) -> {:?}",
            self.id,
            player.guild_id(),
            reason,
            outcome
        );

        let guild_id = player.guild_id().clone();
        match outcome {
            TrackEndOutcome::Replaced => self.emit(ManagerEvent::TrackEnd {
                guild_id,
                track: ended,
                reason,
            }),
            TrackEndOutcome::Advance => {
                self.emit(ManagerEvent::TrackEnd {
                    guild_id,
                    track: ended,
                    reason,
                });
                if manager.autoplay() {
                    let player = Arc::clone(player);
                    tokio::spawn(async move {
                        if let Err(e) = player.play(None, PlayOptions::default()).await {
                            warn!("[{}] Autoplay failed: {}", player.guild_id(), e);
                        }
                    });
                }
            }
            TrackEndOutcome::QueueEnd => self.emit(ManagerEvent::QueueEnd {
                guild_id,
                track: ended,
            }),
        }
    }

    fn stop_after_failure(&self, player: &Player) {
        if let Err(e) = player.stop(None) {
            warn!("[{}] Failed to stop {}: {}", self.id, player.guild_id(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        manager::tests::{drain, manager_with_socket, next_frame},
        player::PlayerOptions,
        track::tests::track,
    };
    use serde_json::json;

    fn send(node: &Node, payload: Value) {
        node.handle_message(&payload.to_string());
    }

    #[tokio::test]
    async fn test_stats_replace_snapshot() {
        let (manager, _rx, _sends) = manager_with_socket();
        let node = manager.nodes().remove(0);

        send(
            &node,
            json!({
                "op": "stats",
                "players": 3,
                "playingPlayers": 1,
                "uptime": 1000,
                "memory": { "free": 1, "used": 2, "allocated": 3, "reservable": 4 },
                "cpu": { "cores": 4, "systemLoad": 0.5, "lavalinkLoad": 0.1 }
            }),
        );

        let stats = node.stats();
        assert_eq!(stats.players, 3);
        assert_eq!(stats.playing_players, 1);
        assert!(stats.frame_stats.is_none());
        assert!((node.penalty_load() - 12.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_player_update_sets_position_only() {
        let (manager, _rx, _sends) = manager_with_socket();
        let node = manager.nodes().remove(0);
        let player = manager.create(PlayerOptions::new("1")).unwrap();

        send(
            &node,
            json!({ "op": "playerUpdate", "guildId": "1", "state": { "time": 1, "position": 4200 } }),
        );
        assert_eq!(player.position(), 4200);
        assert!(!player.playing());
    }

    #[tokio::test]
    async fn test_frames_without_op_are_ignored_and_unknown_ops_reported() {
        let (manager, _rx, _sends) = manager_with_socket();
        let mut events = manager.subscribe();
        let node = manager.nodes().remove(0);

        send(&node, json!({ "guildId": "1" }));
        assert!(events.try_recv().is_err());

        send(&node, json!({ "op": "mystery" }));
        let seen = drain(&mut events);
        assert!(matches!(seen[0], ManagerEvent::NodeRaw { .. }));
        match &seen[1] {
            ManagerEvent::NodeError { error, .. } => {
                assert!(matches!(**error, ClientError::UnknownOp(ref op) if op == "mystery"));
                assert!(!error.is_fatal());
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_string_op_is_reported_as_unknown() {
        let (manager, _rx, _sends) = manager_with_socket();
        let mut events = manager.subscribe();
        let node = manager.nodes().remove(0);

        send(&node, json!({ "op": null }));
        assert!(events.try_recv().is_err());

        send(&node, json!({ "op": 5 }));
        let seen = drain(&mut events);
        assert_eq!(seen.len(), 2);
        assert!(matches!(
            seen[0],
            ManagerEvent::NodeRaw { ref payload, .. } if payload["op"] == 5
        ));
        assert!(matches!(
            seen[1],
            ManagerEvent::NodeError { ref error, .. }
                if matches!(**error, ClientError::UnknownOp(ref op) if op == "5")
        ));
    }

    #[tokio::test]
    async fn test_track_start_marks_playing() {
        let (manager, _rx, _sends) = manager_with_socket();
        let node = manager.nodes().remove(0);
        let player = manager.create(PlayerOptions::new("1")).unwrap();
        player
            .with_queue(|q| q.add(vec![track("A", 1000).into()], None))
            .unwrap();
        player.pause(true);
        let mut events = manager.subscribe();

        send(
            &node,
            json!({ "op": "event", "type": "TrackStartEvent", "guildId": "1", "track": "encoded-A" }),
        );
        assert!(player.playing());
        assert!(!player.paused());
        assert!(drain(&mut events).iter().any(|e| matches!(
            e,
            ManagerEvent::TrackStart { track: Some(t), .. } if t.title() == "A"
        )));
    }

    #[tokio::test]
    async fn test_finished_with_empty_queue_emits_only_queue_end() {
        let (manager, _rx, _sends) = manager_with_socket();
        let node = manager.nodes().remove(0);
        let player = manager.create(PlayerOptions::new("1")).unwrap();
        player
            .with_queue(|q| q.add(vec![track("A", 1000).into()], None))
            .unwrap();
        player.on_track_start();
        let mut events = manager.subscribe();

        send(
            &node,
            json!({ "op": "event", "type": "TrackEndEvent", "guildId": "1", "track": "encoded-A", "reason": "FINISHED" }),
        );

        assert!(!player.playing());
        assert!(player.current().is_none());
        let seen = drain(&mut events);
        assert_eq!(
            seen.iter()
                .filter(|e| matches!(e, ManagerEvent::QueueEnd { .. }))
                .count(),
            1
        );
        assert!(!seen.iter().any(|e| matches!(e, ManagerEvent::TrackEnd { .. })));
    }

    #[tokio::test]
    async fn test_finished_autoplays_next_track() {
        let (manager, mut rx, _sends) = manager_with_socket();
        let node = manager.nodes().remove(0);
        let player = manager.create(PlayerOptions::new("1")).unwrap();
        player
            .with_queue(|q| q.add(vec![track("A", 1000).into(), track("B", 1000).into()], None))
            .unwrap();
        let mut events = manager.subscribe();

        send(
            &node,
            json!({ "op": "event", "type": "TrackEndEvent", "guildId": "1", "track": "encoded-A", "reason": "FINISHED" }),
        );

        assert_eq!(next_frame(&mut rx).await["track"], "encoded-B");
        assert_eq!(player.previous().map(|t| t.title().to_string()).as_deref(), Some("A"));
        assert!(drain(&mut events).iter().any(|e| matches!(
            e,
            ManagerEvent::TrackEnd { track: Some(t), reason: TrackEndReason::Finished, .. }
                if t.title() == "A"
        )));
    }

    #[tokio::test]
    async fn test_stuck_and_exception_stop_the_player() {
        let (manager, mut rx, _sends) = manager_with_socket();
        let node = manager.nodes().remove(0);
        let player = manager.create(PlayerOptions::new("1")).unwrap();
        player
            .with_queue(|q| q.add(vec![track("A", 1000).into()], None))
            .unwrap();
        let mut events = manager.subscribe();

        send(
            &node,
            json!({ "op": "event", "type": "TrackStuckEvent", "guildId": "1", "track": "encoded-A", "thresholdMs": 10000 }),
        );
        assert_eq!(next_frame(&mut rx).await, json!({ "op": "stop", "guildId": "1" }));

        send(
            &node,
            json!({
                "op": "event",
                "type": "TrackExceptionEvent",
                "guildId": "1",
                "track": "encoded-A",
                "exception": { "message": "boom", "severity": "COMMON", "cause": "x" }
            }),
        );
        assert_eq!(next_frame(&mut rx).await["op"], "stop");

        let seen = drain(&mut events);
        assert!(seen.iter().any(|e| matches!(
            e,
            ManagerEvent::TrackStuck { threshold_ms: 10000, .. }
        )));
        assert!(seen.iter().any(|e| matches!(
            e,
            ManagerEvent::TrackError { error, .. }
                if matches!(**error, ClientError::TrackException(ref ex) if ex.message.as_deref() == Some("boom"))
        )));
    }

    #[tokio::test]
    async fn test_socket_closed_and_unknown_events() {
        let (manager, _rx, _sends) = manager_with_socket();
        let node = manager.nodes().remove(0);
        manager.create(PlayerOptions::new("1")).unwrap();
        let mut events = manager.subscribe();

        send(
            &node,
            json!({ "op": "event", "type": "WebSocketClosedEvent", "guildId": "1", "code": 4006, "reason": "Session is no longer valid.", "byRemote": true }),
        );
        send(&node, json!({ "op": "event", "type": "SomethingNewEvent", "guildId": "1" }));
        send(&node, json!({ "op": "event", "type": "TrackStartEvent", "guildId": "404" }));

        let seen = drain(&mut events);
        assert!(seen.iter().any(|e| matches!(
            e,
            ManagerEvent::SocketClosed { code: 4006, by_remote: true, .. }
        )));
        assert!(seen.iter().any(|e| matches!(
            e,
            ManagerEvent::NodeError { error, .. }
                if matches!(**error, ClientError::UnknownEvent(ref t) if t == "SomethingNewEvent")
        )));
        assert!(!seen.iter().any(|e| matches!(e, ManagerEvent::TrackStart { .. })));
    }

    #[tokio::test]
    async fn test_unknown_event_type_reported_without_player() {
        let (manager, _rx, _sends) = manager_with_socket();
        let node = manager.nodes().remove(0);
        let mut events = manager.subscribe();

        send(&node, json!({ "op": "event", "type": "SomethingNewEvent", "guildId": "404" }));
        send(&node, json!({ "op": "event", "type": "TrackStartEvent" }));

        let errors: Vec<_> = drain(&mut events)
            .into_iter()
            .filter_map(|e| match e {
                ManagerEvent::NodeError { error, .. } => Some(error),
                _ => None,
            })
            .collect();
        assert_eq!(errors.len(), 1);
        assert!(matches!(*errors[0], ClientError::UnknownEvent(ref t) if t == "SomethingNewEvent"));
    }
}
