//! Presence and advisory lock tracking
//!
//! Client-side cache of the other participants in a project and which
//! elements they hold edit locks on, updated only by inbound messages.
//! Presence updates replace the list wholesale; `user_left` triggers a
//! presence re-request rather than a local removal, so the next roster
//! broadcast is the single source of truth.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use sitecraft_protocol::{MessageKind, Payload, Presence};

use crate::client::CollabClient;
use crate::dispatch::SubscriptionId;

/// Display palette for collaborator cursors and avatars.
const COLORS: &[&str] = &[
    "#ff6b6b", // red
    "#4ecdc4", // teal
    "#ffe66d", // yellow
    "#95e1d3", // mint
    "#f38181", // coral
    "#aa96da", // lavender
    "#fcbad3", // pink
    "#a8d8ea", // sky blue
];

/// A tracked remote collaborator: the wire presence record plus a
/// locally assigned display color.
#[derive(Debug, Clone, PartialEq)]
pub struct Participant {
    pub presence: Presence,
    pub color: String,
}

#[derive(Default)]
struct TrackerState {
    participants: Vec<Participant>,
    /// Element id -> user id holding the advisory lock.
    locks: HashMap<String, String>,
    next_color: usize,
}

/// Tracks presence and locks by subscribing to a client's events.
///
/// Subscriptions live until `detach` is called or the client's
/// `disconnect` clears the whole handler registry; after a fresh
/// `connect`, attach a new tracker.
pub struct PresenceTracker {
    client: CollabClient,
    state: Arc<Mutex<TrackerState>>,
    subscriptions: Vec<SubscriptionId>,
}

impl PresenceTracker {
    /// Subscribe to presence, lock, and departure events on `client`.
    pub fn attach(client: &CollabClient) -> Self {
        let state = Arc::new(Mutex::new(TrackerState::default()));
        let mut subscriptions = Vec::new();

        let roster_state = state.clone();
        let roster_client = client.clone();
        subscriptions.push(client.on(MessageKind::PresenceUpdate, move |message| {
            if let Payload::PresenceUpdate(list) = &message.payload {
                let own = roster_client.user_id();
                apply_roster(&mut lock(&roster_state), &list.presence, own.as_deref());
            }
        }));

        let lock_state = state.clone();
        subscriptions.push(client.on(MessageKind::Lock, move |message| {
            if let (Payload::Lock(element), Some(user_id)) = (&message.payload, &message.user_id) {
                apply_lock(&mut lock(&lock_state), &element.element_id, user_id);
            }
        }));

        let unlock_state = state.clone();
        subscriptions.push(client.on(MessageKind::Unlock, move |message| {
            if let Payload::Unlock(element) = &message.payload {
                apply_unlock(&mut lock(&unlock_state), &element.element_id);
            }
        }));

        // Departure is not applied locally: re-request presence and let
        // the next roster broadcast remove the user authoritatively.
        let departed_client = client.clone();
        subscriptions.push(client.on(MessageKind::UserLeft, move |_| {
            departed_client.request_presence();
        }));

        Self {
            client: client.clone(),
            state,
            subscriptions,
        }
    }

    /// Remove this tracker's subscriptions from the client.
    pub fn detach(&mut self) {
        for id in self.subscriptions.drain(..) {
            self.client.off(id);
        }
    }

    /// The other participants in the project, in roster order.
    pub fn participants(&self) -> Vec<Participant> {
        lock(&self.state).participants.clone()
    }

    pub fn participant_count(&self) -> usize {
        lock(&self.state).participants.len()
    }

    /// Who holds the advisory lock on `element_id`, if anyone.
    pub fn lock_holder(&self, element_id: &str) -> Option<String> {
        lock(&self.state).locks.get(element_id).cloned()
    }

    pub fn is_locked(&self, element_id: &str) -> bool {
        lock(&self.state).locks.contains_key(element_id)
    }

    /// Whether someone other than this client holds the lock.
    pub fn is_locked_by_other(&self, element_id: &str) -> bool {
        let holder = self.lock_holder(element_id);
        match (holder, self.client.user_id()) {
            (Some(holder), Some(own)) => holder != own,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}

fn lock(state: &Arc<Mutex<TrackerState>>) -> MutexGuard<'_, TrackerState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Replace the participant list wholesale, excluding our own entry.
/// Colors are kept for survivors and assigned from the palette for
/// newcomers.
fn apply_roster(state: &mut TrackerState, roster: &[Presence], own_user_id: Option<&str>) {
    let mut replaced = Vec::with_capacity(roster.len());
    for record in roster {
        if own_user_id == Some(record.user_id.as_str()) {
            continue;
        }
        let existing = state
            .participants
            .iter()
            .find(|p| p.presence.user_id == record.user_id)
            .map(|p| p.color.clone());
        let color = existing.unwrap_or_else(|| {
            let color = COLORS[state.next_color % COLORS.len()].to_string();
            state.next_color += 1;
            color
        });
        replaced.push(Participant {
            presence: record.clone(),
            color,
        });
    }
    state.participants = replaced;
}

fn apply_lock(state: &mut TrackerState, element_id: &str, user_id: &str) {
    state
        .locks
        .insert(element_id.to_string(), user_id.to_string());
}

/// Removing an already-unlocked element is a no-op.
fn apply_unlock(state: &mut TrackerState, element_id: &str) {
    state.locks.remove(element_id);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn presence(user_id: &str, user_name: &str) -> Presence {
        Presence {
            user_id: user_id.to_string(),
            user_name: user_name.to_string(),
            cursor: None,
            active_elements: None,
        }
    }

    #[test]
    fn roster_replaces_wholesale_and_excludes_self() {
        let mut state = TrackerState::default();
        apply_roster(
            &mut state,
            &[presence("a", "Ada"), presence("d", "Dijkstra")],
            Some("a"),
        );
        assert_eq!(state.participants.len(), 1);
        assert_eq!(state.participants[0].presence.user_id, "d");

        // A later roster without "d" makes "d" disappear.
        apply_roster(
            &mut state,
            &[presence("a", "Ada"), presence("b", "Babbage"), presence("c", "Curie")],
            Some("a"),
        );
        let ids: Vec<&str> = state
            .participants
            .iter()
            .map(|p| p.presence.user_id.as_str())
            .collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn colors_are_distinct_and_stable_across_replacements() {
        let mut state = TrackerState::default();
        apply_roster(&mut state, &[presence("b", "B"), presence("c", "C")], Some("a"));
        let color_b = state.participants[0].color.clone();
        let color_c = state.participants[1].color.clone();
        assert_ne!(color_b, color_c);

        // "b" survives the next replacement and keeps its color.
        apply_roster(&mut state, &[presence("b", "B"), presence("e", "E")], Some("a"));
        assert_eq!(state.participants[0].color, color_b);
        assert_ne!(state.participants[1].color, color_b);
    }

    #[test]
    fn lock_then_unlock_leaves_no_entry() {
        let mut state = TrackerState::default();
        apply_lock(&mut state, "hero-1", "b");
        assert_eq!(state.locks.get("hero-1").map(String::as_str), Some("b"));

        apply_unlock(&mut state, "hero-1");
        assert!(state.locks.is_empty());

        // Second unlock is a no-op.
        apply_unlock(&mut state, "hero-1");
        assert!(state.locks.is_empty());
    }

    #[test]
    fn later_lock_message_wins() {
        let mut state = TrackerState::default();
        apply_lock(&mut state, "hero-1", "b");
        apply_lock(&mut state, "hero-1", "c");
        assert_eq!(state.locks.get("hero-1").map(String::as_str), Some("c"));
        assert_eq!(state.locks.len(), 1);
    }
}
