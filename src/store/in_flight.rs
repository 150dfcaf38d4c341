use crate::store::models::{OptionId, PollId};
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Vote,
    Like,
}

/// At most one action of each kind may be outstanding per poll.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActionKey {
    pub poll_id: PollId,
    pub kind: ActionKind,
}

impl ActionKey {
    pub fn vote(poll_id: PollId) -> Self {
        Self {
            poll_id,
            kind: ActionKind::Vote,
        }
    }

    pub fn like(poll_id: PollId) -> Self {
        Self {
            poll_id,
            kind: ActionKind::Like,
        }
    }
}

#[derive(Debug, Clone)]
pub struct InFlightAction {
    pub key: ActionKey,
    /// Unique per mark, so a late result only ever clears its own marker.
    pub seq: u64,
    /// Chosen option for a vote; `None` for likes.
    pub option_id: Option<OptionId>,
    pub started_at: Instant,
}

#[derive(Debug, Clone, Default)]
pub struct InFlightTracker {
    actions: HashMap<ActionKey, InFlightAction>,
    next_seq: u64,
}

impl InFlightTracker {
    /// Returns the marker's sequence number, or `None` when an action with
    /// the same key is already pending.
    pub fn mark(&mut self, key: ActionKey, option_id: Option<OptionId>, now: Instant) -> Option<u64> {
        if self.actions.contains_key(&key) {
            return None;
        }
        self.next_seq += 1;
        let seq = self.next_seq;
        self.actions.insert(
            key.clone(),
            InFlightAction {
                key,
                seq,
                option_id,
                started_at: now,
            },
        );
        Some(seq)
    }

    pub fn clear(&mut self, key: &ActionKey) -> Option<InFlightAction> {
        self.actions.remove(key)
    }

    /// Clears the marker under `key` only if it is the one numbered `seq`.
    pub fn clear_if(&mut self, key: &ActionKey, seq: u64) -> Option<InFlightAction> {
        match self.actions.get(key) {
            Some(action) if action.seq == seq => self.actions.remove(key),
            _ => None,
        }
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&InFlightAction) -> bool) {
        self.actions.retain(|_, action| keep(action));
    }

    pub fn get(&self, key: &ActionKey) -> Option<&InFlightAction> {
        self.actions.get(key)
    }

    pub fn contains(&self, key: &ActionKey) -> bool {
        self.actions.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn clear_all(&mut self) {
        self.actions.clear();
    }

    /// Drops every marker older than `max_age` at `now`, returning them.
    pub fn expire(&mut self, now: Instant, max_age: Duration) -> Vec<InFlightAction> {
        let stale: Vec<ActionKey> = self
            .actions
            .values()
            .filter(|a| now.saturating_duration_since(a.started_at) > max_age)
            .map(|a| a.key.clone())
            .collect();

        stale
            .iter()
            .filter_map(|key| self.actions.remove(key))
            .collect()
    }
}
