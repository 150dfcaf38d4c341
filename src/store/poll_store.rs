use crate::push::models::UpdateEvent;
use crate::store::in_flight::{ActionKey, ActionKind, InFlightAction, InFlightTracker};
use crate::store::models::{LIKES_KEY, OptionId, PollId, PollView, UserId};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// What [`PollStore::apply_update`] did with an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Poll is not loaded in this view.
    UnknownPoll,
    /// Poll is loaded but the option does not belong to it.
    UnknownOption,
    /// Event carried a version not newer than the last one applied.
    Stale,
    Applied {
        /// The event was produced by the viewer's own action.
        own: bool,
        /// A pending marker for the viewer's action was cleared.
        confirmed: bool,
    },
}

/// Canonical client-side view of the polls on screen plus the viewer's
/// outstanding actions.
#[derive(Debug, Clone, Default)]
pub struct PollStore {
    polls: HashMap<PollId, PollView>,
    versions: HashMap<PollId, u64>,
    in_flight: InFlightTracker,
}

impl PollStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the polls. A pending marker survives while its poll is still
    /// listed and the fresh copy does not already show the action as done.
    pub fn load(&mut self, polls: Vec<PollView>) {
        self.polls = polls
            .into_iter()
            .map(|poll| (poll.id.clone(), poll.normalize()))
            .collect();
        self.versions.clear();

        let polls = &self.polls;
        self.in_flight.retain(|action| match polls.get(&action.key.poll_id) {
            None => false,
            Some(poll) => match action.key.kind {
                ActionKind::Vote => poll.user_has_voted.is_none(),
                ActionKind::Like => !poll.user_has_liked,
            },
        });
    }

    /// Inserts or replaces a single poll, e.g. one the viewer just created.
    pub fn upsert(&mut self, poll: PollView) {
        self.polls.insert(poll.id.clone(), poll.normalize());
    }

    pub fn get(&self, poll_id: &PollId) -> Option<&PollView> {
        self.polls.get(poll_id)
    }

    /// Polls newest first; polls without a timestamp sort last.
    pub fn polls(&self) -> Vec<&PollView> {
        let mut polls: Vec<&PollView> = self.polls.values().collect();
        polls.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        polls
    }

    pub fn len(&self) -> usize {
        self.polls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.polls.is_empty()
    }

    /// Merges a push event. Counts are absolute, so applying the same event
    /// twice leaves the store as the first application did.
    pub fn apply_update(&mut self, event: &UpdateEvent, viewer_id: Option<&UserId>) -> ApplyOutcome {
        let Some(poll) = self.polls.get_mut(event.poll_id()) else {
            debug!(poll_id = %event.poll_id(), "update for poll not in view");
            return ApplyOutcome::UnknownPoll;
        };

        if let UpdateEvent::VoteUpdate(update) = event {
            if !poll.has_option(&update.option_id) {
                debug!(poll_id = %update.poll_id, option_id = %update.option_id, "update for unknown option");
                return ApplyOutcome::UnknownOption;
            }
        }

        if let Some(version) = event.version() {
            match self.versions.get(event.poll_id()) {
                Some(&seen) if version <= seen => return ApplyOutcome::Stale,
                _ => {
                    self.versions.insert(event.poll_id().clone(), version);
                }
            }
        }

        let own = viewer_id == Some(event.user_id());
        let key = match event {
            UpdateEvent::VoteUpdate(update) => {
                set_count(poll, update.option_id.as_str(), update.new_count);
                if own {
                    poll.user_has_voted = Some(update.option_id.clone());
                }
                ActionKey::vote(update.poll_id.clone())
            }
            UpdateEvent::LikeUpdate(update) => {
                set_count(poll, LIKES_KEY, update.new_count);
                if own {
                    poll.user_has_liked = true;
                }
                ActionKey::like(update.poll_id.clone())
            }
        };

        let confirmed = own && self.in_flight.clear(&key).is_some();
        ApplyOutcome::Applied { own, confirmed }
    }

    pub fn derive_total_votes(&self, poll_id: &PollId) -> u64 {
        self.polls.get(poll_id).map_or(0, PollView::total_votes)
    }

    pub fn derive_percentage(&self, poll_id: &PollId, option_id: &OptionId) -> f64 {
        let Some(poll) = self.polls.get(poll_id) else {
            return 0.0;
        };
        let total = poll.total_votes();
        if total == 0 {
            return 0.0;
        }
        100.0 * poll.votes_for(option_id) as f64 / total as f64
    }

    /// Returns the marker's sequence number, or `None` if one is already held.
    pub fn mark_in_flight(&mut self, key: ActionKey, option_id: Option<OptionId>) -> Option<u64> {
        self.in_flight.mark(key, option_id, Instant::now())
    }

    pub fn clear_in_flight(&mut self, key: &ActionKey) -> Option<InFlightAction> {
        self.in_flight.clear(key)
    }

    pub fn clear_in_flight_if(&mut self, key: &ActionKey, seq: u64) -> Option<InFlightAction> {
        self.in_flight.clear_if(key, seq)
    }

    pub fn is_in_flight(&self, key: &ActionKey) -> bool {
        self.in_flight.contains(key)
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn expire_in_flight(&mut self, older_than: Duration) -> Vec<InFlightAction> {
        self.in_flight.expire(Instant::now(), older_than)
    }

    pub fn reset_in_flight(&mut self) {
        self.in_flight.clear_all();
    }
}

fn set_count(poll: &mut PollView, key: &str, new_count: u64) {
    let slot = poll.counts.entry(key.to_string()).or_insert(0);
    if new_count < *slot {
        debug!(poll_id = %poll.id, key, from = *slot, to = new_count, "count moved backwards");
    }
    *slot = new_count;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::push::models::{LikeUpdate, VoteUpdate};
    use crate::store::models::PollOption;

    fn poll(id: &str, options: &[&str]) -> PollView {
        PollView {
            id: id.into(),
            question: format!("question {id}"),
            user_id: None,
            created_at: None,
            options: options
                .iter()
                .map(|o| PollOption {
                    id: (*o).into(),
                    text: o.to_uppercase(),
                })
                .collect(),
            counts: HashMap::new(),
            user_has_voted: None,
            user_has_liked: false,
        }
    }

    fn vote(poll: &str, option: &str, count: u64, user: &str) -> UpdateEvent {
        UpdateEvent::VoteUpdate(VoteUpdate {
            poll_id: poll.into(),
            option_id: option.into(),
            new_count: count,
            user_id: user.into(),
            version: None,
        })
    }

    fn like(poll: &str, count: u64, user: &str) -> UpdateEvent {
        UpdateEvent::LikeUpdate(LikeUpdate {
            poll_id: poll.into(),
            new_count: count,
            user_id: user.into(),
            version: None,
        })
    }

    fn store_with(polls: Vec<PollView>) -> PollStore {
        let mut store = PollStore::new();
        store.load(polls);
        store
    }

    #[test]
    fn duplicate_delivery_does_not_double_count() {
        let mut store = store_with(vec![poll("P", &["A", "B"])]);
        let viewer = UserId::from("U");
        let event = vote("P", "A", 3, "U");

        store.apply_update(&event, Some(&viewer));
        let once = store.get(&"P".into()).cloned();
        store.apply_update(&event, Some(&viewer));

        assert_eq!(store.get(&"P".into()).cloned(), once);
        assert_eq!(store.get(&"P".into()).unwrap().votes_for(&"A".into()), 3);
    }

    #[test]
    fn foreign_events_update_counts_only() {
        let mut store = store_with(vec![poll("P", &["A", "B"])]);
        let viewer = UserId::from("U");

        store.apply_update(&vote("P", "B", 5, "someone-else"), Some(&viewer));
        store.apply_update(&like("P", 2, "someone-else"), Some(&viewer));

        let view = store.get(&"P".into()).unwrap();
        assert_eq!(view.votes_for(&"B".into()), 5);
        assert_eq!(view.likes(), 2);
        assert!(view.user_has_voted.is_none());
        assert!(!view.user_has_liked);
    }

    #[test]
    fn own_event_confirms_pending_vote() {
        let mut store = store_with(vec![poll("P", &["A", "B"])]);
        let viewer = UserId::from("U");
        assert!(store.mark_in_flight(ActionKey::vote("P".into()), Some("A".into())).is_some());

        let outcome = store.apply_update(&vote("P", "A", 1, "U"), Some(&viewer));

        assert_eq!(outcome, ApplyOutcome::Applied { own: true, confirmed: true });
        let view = store.get(&"P".into()).unwrap();
        assert_eq!(view.user_has_voted, Some("A".into()));
        assert_eq!(store.derive_total_votes(&"P".into()), 1);
        assert_eq!(store.derive_percentage(&"P".into(), &"A".into()), 100.0);
        assert_eq!(store.derive_percentage(&"P".into(), &"B".into()), 0.0);
        assert!(!store.is_in_flight(&ActionKey::vote("P".into())));
    }

    #[test]
    fn unknown_poll_is_ignored_and_not_created() {
        let mut store = store_with(vec![poll("P", &["A"])]);

        let outcome = store.apply_update(&vote("Q", "A", 1, "U"), None);

        assert_eq!(outcome, ApplyOutcome::UnknownPoll);
        assert_eq!(store.len(), 1);
        assert!(store.get(&"Q".into()).is_none());
    }

    #[test]
    fn unknown_option_is_ignored() {
        let mut store = store_with(vec![poll("P", &["A"])]);
        assert_eq!(
            store.apply_update(&vote("P", "Z", 9, "U"), None),
            ApplyOutcome::UnknownOption
        );
        assert_eq!(store.derive_total_votes(&"P".into()), 0);
    }

    #[test]
    fn percentages_are_zero_without_votes() {
        let store = store_with(vec![poll("P", &["A", "B"])]);
        assert_eq!(store.derive_total_votes(&"P".into()), 0);
        assert_eq!(store.derive_percentage(&"P".into(), &"A".into()), 0.0);
        assert_eq!(store.derive_total_votes(&"missing".into()), 0);
        assert_eq!(store.derive_percentage(&"missing".into(), &"A".into()), 0.0);
    }

    #[test]
    fn likes_are_excluded_from_vote_totals() {
        let mut store = store_with(vec![poll("P", &["A", "B"])]);
        store.apply_update(&vote("P", "A", 1, "x"), None);
        store.apply_update(&vote("P", "B", 3, "y"), None);
        store.apply_update(&like("P", 10, "z"), None);

        assert_eq!(store.derive_total_votes(&"P".into()), 4);
        assert_eq!(store.derive_percentage(&"P".into(), &"B".into()), 75.0);
    }

    #[test]
    fn stale_versions_are_rejected() {
        let mut store = store_with(vec![poll("P", &["A"])]);
        let versioned = |count, version| {
            UpdateEvent::VoteUpdate(VoteUpdate {
                poll_id: "P".into(),
                option_id: "A".into(),
                new_count: count,
                user_id: "x".into(),
                version: Some(version),
            })
        };
        let newer = versioned(4, 7);
        let older = versioned(2, 6);

        assert!(matches!(store.apply_update(&newer, None), ApplyOutcome::Applied { .. }));
        assert_eq!(store.apply_update(&older, None), ApplyOutcome::Stale);
        assert_eq!(store.apply_update(&newer, None), ApplyOutcome::Stale);
        assert_eq!(store.get(&"P".into()).unwrap().votes_for(&"A".into()), 4);
    }

    #[test]
    fn load_drops_markers_of_vanished_polls() {
        let mut store = store_with(vec![poll("P", &["A"])]);
        store.mark_in_flight(ActionKey::like("P".into()), None);

        store.load(vec![poll("Q", &["A"])]);

        assert!(store.get(&"P".into()).is_none());
        assert_eq!(store.in_flight_len(), 0);
    }

    #[test]
    fn load_keeps_markers_of_listed_polls() {
        let mut store = store_with(vec![poll("P", &["A", "B"]), poll("Q", &["A"])]);
        store.mark_in_flight(ActionKey::vote("P".into()), Some("A".into()));
        store.mark_in_flight(ActionKey::like("Q".into()), None);

        let mut liked = poll("Q", &["A"]);
        liked.user_has_liked = true;
        store.load(vec![poll("P", &["A", "B"]), liked]);

        assert!(store.is_in_flight(&ActionKey::vote("P".into())));
        assert!(!store.is_in_flight(&ActionKey::like("Q".into())));
        assert!(store.mark_in_flight(ActionKey::vote("P".into()), Some("B".into())).is_none());
    }
}
