use crate::{
    player::state::PlayerState,
    protocol::TrackEndReason,
    track::QueueItem,
};

/// What the node does after the queue has been advanced for a track end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackEndOutcome {
    /// Another play was already in flight; only notify.
    Replaced,
    /// Notify track end, then play `current` when autoplay is on.
    Advance,
    /// Nothing left: notify queue end only.
    QueueEnd,
}

/// Advance the queue for a `TrackEndEvent` and report the follow-up.
pub(crate) fn apply_track_end(state: &mut PlayerState, reason: TrackEndReason) -> TrackEndOutcome {
    if matches!(reason, TrackEndReason::LoadFailed | TrackEndReason::Cleanup) {
        return advance(state);
    }

    if reason == TrackEndReason::Replaced {
        return TrackEndOutcome::Replaced;
    }

    let has_current = state.queue.current().is_some();

    if has_current && state.track_repeat {
        if reason == TrackEndReason::Stopped {
            return advance(state);
        }
        return TrackEndOutcome::Advance;
    }

    if has_current && state.queue_repeat {
        if reason == TrackEndReason::Stopped {
            return advance(state);
        }
        let ended = state.queue.current().cloned();
        state.queue.set_previous(ended.clone());
        if let Some(ended) = ended {
            state.queue.push(ended);
        }
        let next = state.queue.shift();
        state.queue.set_current(next);
        return TrackEndOutcome::Advance;
    }

    if !state.queue.is_empty() {
        return advance(state);
    }

    queue_end(state)
}

/// previous := current, current := next upcoming; empty means queue end.
fn advance(state: &mut PlayerState) -> TrackEndOutcome {
    let next = state.queue.shift();
    let ended = state.queue.set_current(next);
    if ended.is_some() {
        state.queue.set_previous(ended);
    }

    if state.queue.current().is_none() {
        return queue_end(state);
    }
    TrackEndOutcome::Advance
}

fn queue_end(state: &mut PlayerState) -> TrackEndOutcome {
    state.queue.set_current(None::<QueueItem>);
    state.playing = false;
    TrackEndOutcome::QueueEnd
}
