use crate::error::ApiError;
use crate::push::models::{RawUpdate, decode_update};
use crate::store::{ActionKey, ActionKind, ApplyOutcome, InFlightAction, OptionId, PollId, PollStore, PollView, UserId};
use std::time::Duration;
use tracing::{debug, warn};

/// Why an intent was dropped without contacting the poll service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoredReason {
    NoViewer,
    UnknownPoll,
    UnknownOption,
    AlreadyVoted,
    AlreadyLiked,
    AlreadyPending,
}

/// Proof that an action was marked in flight; handed back with the
/// request's result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub key: ActionKey,
    pub option_id: Option<OptionId>,
    seq: u64,
    epoch: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Success(String),
    Failure {
        message: String,
        reason: String,
        session_expired: bool,
    },
}

impl Notification {
    pub fn failure(message: impl Into<String>, error: &ApiError) -> Self {
        Notification::Failure {
            message: message.into(),
            reason: error.to_string(),
            session_expired: error.is_unauthorized(),
        }
    }

    pub fn is_session_expired(&self) -> bool {
        matches!(
            self,
            Notification::Failure {
                session_expired: true,
                ..
            }
        )
    }
}

/// Pending/Confirmed bookkeeping for one viewer over a [`PollStore`].
///
/// Intents move an action Idle -> Pending. A rejected request moves it
/// back to Idle. A successful request leaves it Pending; only a push event
/// from the same viewer confirms it.
#[derive(Debug, Default)]
pub struct Reconciler {
    store: PollStore,
    viewer: Option<UserId>,
    epoch: u64,
}

impl Reconciler {
    pub fn new(viewer: Option<UserId>) -> Self {
        Self {
            store: PollStore::new(),
            viewer,
            epoch: 0,
        }
    }

    pub fn store(&self) -> &PollStore {
        &self.store
    }

    pub fn viewer(&self) -> Option<&UserId> {
        self.viewer.as_ref()
    }

    /// Bumped whenever the viewer changes; results tagged with an older
    /// epoch are discarded.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Returns true if the viewer actually changed. Pending markers belong
    /// to the previous viewer and are dropped.
    pub fn set_viewer(&mut self, viewer: Option<UserId>) -> bool {
        if self.viewer == viewer {
            return false;
        }
        self.viewer = viewer;
        self.epoch += 1;
        self.store.reset_in_flight();
        true
    }

    pub fn load(&mut self, polls: Vec<PollView>) {
        self.store.load(polls);
    }

    pub fn upsert(&mut self, poll: PollView) {
        self.store.upsert(poll);
    }

    pub fn begin_vote(&mut self, poll_id: &PollId, option_id: &OptionId) -> Result<Ticket, IgnoredReason> {
        if self.viewer.is_none() {
            return Err(IgnoredReason::NoViewer);
        }
        let poll = self.store.get(poll_id).ok_or(IgnoredReason::UnknownPoll)?;
        if !poll.has_option(option_id) {
            return Err(IgnoredReason::UnknownOption);
        }
        if poll.user_has_voted.is_some() {
            return Err(IgnoredReason::AlreadyVoted);
        }

        let key = ActionKey::vote(poll_id.clone());
        let seq = self
            .store
            .mark_in_flight(key.clone(), Some(option_id.clone()))
            .ok_or(IgnoredReason::AlreadyPending)?;

        Ok(Ticket {
            key,
            option_id: Some(option_id.clone()),
            seq,
            epoch: self.epoch,
        })
    }

    pub fn begin_like(&mut self, poll_id: &PollId) -> Result<Ticket, IgnoredReason> {
        if self.viewer.is_none() {
            return Err(IgnoredReason::NoViewer);
        }
        let poll = self.store.get(poll_id).ok_or(IgnoredReason::UnknownPoll)?;
        if poll.user_has_liked {
            return Err(IgnoredReason::AlreadyLiked);
        }

        let key = ActionKey::like(poll_id.clone());
        let seq = self
            .store
            .mark_in_flight(key.clone(), None)
            .ok_or(IgnoredReason::AlreadyPending)?;

        Ok(Ticket {
            key,
            option_id: None,
            seq,
            epoch: self.epoch,
        })
    }

    /// Folds a request result back in. Success keeps the action pending;
    /// failure reverts the ticket's own marker and leaves any newer one for
    /// the same key alone. Results from an older epoch yield nothing.
    pub fn finish(&mut self, ticket: Ticket, result: Result<(), ApiError>) -> Option<Notification> {
        if ticket.epoch != self.epoch {
            debug!(poll_id = %ticket.key.poll_id, "discarding result for previous viewer");
            return None;
        }

        let notification = match (ticket.key.kind, result) {
            (ActionKind::Vote, Ok(())) => Notification::Success("Vote recorded!".to_string()),
            (ActionKind::Like, Ok(())) => Notification::Success("Like updated!".to_string()),
            (kind, Err(e)) => {
                self.store.clear_in_flight_if(&ticket.key, ticket.seq);
                warn!(poll_id = %ticket.key.poll_id, ?kind, "action failed: {e}");
                match kind {
                    ActionKind::Vote => Notification::failure("Failed to vote. Please try again.", &e),
                    ActionKind::Like => Notification::failure("Failed to like poll. Please try again.", &e),
                }
            }
        };

        Some(notification)
    }

    /// Decodes and applies one push message. Malformed messages are dropped
    /// with a diagnostic and yield `None`.
    pub fn apply_push(&mut self, raw: &RawUpdate) -> Option<ApplyOutcome> {
        match decode_update(raw) {
            Ok(event) => Some(self.store.apply_update(&event, self.viewer.as_ref())),
            Err(e) => {
                warn!(kind = %raw.kind, "dropping push message: {e}");
                None
            }
        }
    }

    pub fn expire_in_flight(&mut self, older_than: Duration) -> Vec<InFlightAction> {
        self.store.expire_in_flight(older_than)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::PollOption;
    use std::collections::HashMap;

    fn poll(id: &str) -> PollView {
        PollView {
            id: id.into(),
            question: "Coffee or tea?".to_string(),
            user_id: None,
            created_at: None,
            options: vec![
                PollOption {
                    id: "A".into(),
                    text: "Coffee".to_string(),
                },
                PollOption {
                    id: "B".into(),
                    text: "Tea".to_string(),
                },
            ],
            counts: HashMap::new(),
            user_has_voted: None,
            user_has_liked: false,
        }
    }

    fn reconciler() -> Reconciler {
        let mut reconciler = Reconciler::new(Some("viewer".into()));
        reconciler.load(vec![poll("P")]);
        reconciler
    }

    fn server_error() -> ApiError {
        ApiError::Status {
            status: 500,
            detail: "HTTP error! status: 500".to_string(),
        }
    }

    #[test]
    fn vote_is_confirmed_only_by_own_push_event() {
        let mut r = reconciler();
        let ticket = r.begin_vote(&"P".into(), &"A".into()).unwrap();
        assert!(r.store().is_in_flight(&ActionKey::vote("P".into())));

        let note = r.finish(ticket, Ok(())).unwrap();
        assert_eq!(note, Notification::Success("Vote recorded!".to_string()));
        assert!(r.store().is_in_flight(&ActionKey::vote("P".into())));

        let outcome = r.apply_push(&RawUpdate::new(
            "vote-update",
            r#"{"poll_id":"P","option_id":"A","vote_count":1,"user_id":"viewer"}"#,
        ));
        assert_eq!(outcome, Some(ApplyOutcome::Applied { own: true, confirmed: true }));

        let store = r.store();
        let view = store.get(&"P".into()).unwrap();
        assert_eq!(view.votes_for(&"A".into()), 1);
        assert_eq!(view.votes_for(&"B".into()), 0);
        assert_eq!(store.derive_total_votes(&"P".into()), 1);
        assert_eq!(store.derive_percentage(&"P".into(), &"A".into()), 100.0);
        assert_eq!(view.user_has_voted, Some("A".into()));
        assert_eq!(store.in_flight_len(), 0);
    }

    #[test]
    fn push_may_arrive_before_the_response() {
        let mut r = reconciler();
        let ticket = r.begin_vote(&"P".into(), &"B".into()).unwrap();

        r.apply_push(&RawUpdate::new(
            "vote-update",
            r#"{"pollId":"P","optionId":"B","newCount":4,"userId":"viewer"}"#,
        ));
        assert_eq!(r.store().in_flight_len(), 0);

        assert!(matches!(r.finish(ticket, Ok(())), Some(Notification::Success(_))));
        assert_eq!(r.store().in_flight_len(), 0);
        assert_eq!(r.store().get(&"P".into()).unwrap().user_has_voted, Some("B".into()));
    }

    #[test]
    fn rejected_like_reverts_marker_and_notifies_once() {
        let mut r = reconciler();
        let before = r.store().get(&"P".into()).cloned();
        let ticket = r.begin_like(&"P".into()).unwrap();

        let note = r.finish(ticket, Err(server_error())).unwrap();

        assert!(matches!(
            note,
            Notification::Failure { ref message, session_expired: false, .. }
                if message == "Failed to like poll. Please try again."
        ));
        assert_eq!(r.store().in_flight_len(), 0);
        assert_eq!(r.store().get(&"P".into()).cloned(), before);
    }

    #[test]
    fn second_vote_while_pending_is_ignored() {
        let mut r = reconciler();
        r.begin_vote(&"P".into(), &"A".into()).unwrap();
        assert_eq!(
            r.begin_vote(&"P".into(), &"B".into()),
            Err(IgnoredReason::AlreadyPending)
        );
    }

    #[test]
    fn intents_are_checked_against_the_store() {
        let mut r = reconciler();
        assert_eq!(r.begin_vote(&"Q".into(), &"A".into()), Err(IgnoredReason::UnknownPoll));
        assert_eq!(r.begin_vote(&"P".into(), &"Z".into()), Err(IgnoredReason::UnknownOption));

        r.apply_push(&RawUpdate::new(
            "like-update",
            r#"{"poll_id":"P","like_count":1,"user_id":"viewer"}"#,
        ));
        assert_eq!(r.begin_like(&"P".into()), Err(IgnoredReason::AlreadyLiked));

        let mut anonymous = Reconciler::new(None);
        anonymous.load(vec![poll("P")]);
        assert_eq!(anonymous.begin_like(&"P".into()), Err(IgnoredReason::NoViewer));
    }

    #[test]
    fn voted_poll_rejects_further_votes() {
        let mut r = reconciler();
        let mut voted = poll("P");
        voted.user_has_voted = Some("A".into());
        r.load(vec![voted]);

        assert_eq!(r.begin_vote(&"P".into(), &"B".into()), Err(IgnoredReason::AlreadyVoted));
    }

    #[test]
    fn reload_keeps_the_pending_vote() {
        let mut r = reconciler();
        let first = r.begin_vote(&"P".into(), &"A".into()).unwrap();

        r.load(vec![poll("P")]);

        assert_eq!(
            r.begin_vote(&"P".into(), &"B".into()),
            Err(IgnoredReason::AlreadyPending)
        );
        r.finish(first, Err(server_error())).unwrap();
        assert_eq!(r.store().in_flight_len(), 0);
        assert!(r.begin_vote(&"P".into(), &"A".into()).is_ok());
    }

    #[test]
    fn late_failure_does_not_clear_a_newer_vote() {
        let mut r = reconciler();
        let first = r.begin_vote(&"P".into(), &"A".into()).unwrap();

        r.load(vec![]);
        r.load(vec![poll("P")]);
        let second = r.begin_vote(&"P".into(), &"B".into()).unwrap();

        assert!(r.finish(first, Err(server_error())).is_some());
        assert!(r.store().is_in_flight(&ActionKey::vote("P".into())));
        assert_eq!(
            r.begin_vote(&"P".into(), &"A".into()),
            Err(IgnoredReason::AlreadyPending)
        );

        r.finish(second, Err(server_error()));
        assert_eq!(r.store().in_flight_len(), 0);
    }

    #[test]
    fn results_after_viewer_change_are_discarded() {
        let mut r = reconciler();
        let ticket = r.begin_vote(&"P".into(), &"A".into()).unwrap();

        assert!(r.set_viewer(Some("someone-else".into())));
        assert_eq!(r.store().in_flight_len(), 0);
        assert!(r.finish(ticket, Err(server_error())).is_none());
        assert!(!r.set_viewer(Some("someone-else".into())));
    }

    #[test]
    fn unauthorized_failure_flags_session_expiry() {
        let mut r = reconciler();
        let ticket = r.begin_vote(&"P".into(), &"A".into()).unwrap();
        let note = r.finish(ticket, Err(ApiError::Unauthorized)).unwrap();
        assert!(note.is_session_expired());
    }

    #[test]
    fn malformed_push_is_dropped() {
        let mut r = reconciler();
        assert!(r.apply_push(&RawUpdate::new("vote-update", r#"{"poll_id":"P"}"#)).is_none());
        assert_eq!(r.store().derive_total_votes(&"P".into()), 0);
    }
}
