use crate::api::PollApi;
use crate::error::{ApiError, ClientError};
use crate::polls::NewPoll;
use crate::push::{PushStream, RawUpdate, UpdateSource};
use crate::reconciler::machine::{IgnoredReason, Notification, Reconciler, Ticket};
use crate::store::{ActionKind, ApplyOutcome, OptionId, PollId, PollStore, PollView, UserId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

/// Which polls the view shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    AllPolls,
    /// Polls created by the current viewer.
    ByViewer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Pending,
    Ignored(IgnoredReason),
}

/// What the presentation layer reads.
#[derive(Debug, Clone, Default)]
pub struct ViewState {
    pub store: PollStore,
    pub viewer: Option<UserId>,
    pub loading: bool,
    pub connected: bool,
}

type Reply<T> = oneshot::Sender<Result<T, ClientError>>;

enum Command {
    Vote {
        poll_id: PollId,
        option_id: OptionId,
        reply: oneshot::Sender<ActionOutcome>,
    },
    Like {
        poll_id: PollId,
        reply: oneshot::Sender<ActionOutcome>,
    },
    CreatePoll {
        question: String,
        options: Vec<String>,
        reply: Reply<PollView>,
    },
    Refresh,
    SetViewer(Option<UserId>),
    ExpireInFlight(Duration),
    Shutdown,
}

enum Completion {
    Action {
        ticket: Ticket,
        result: Result<(), ApiError>,
    },
    Loaded {
        epoch: u64,
        result: Result<Vec<PollView>, ApiError>,
    },
    Created {
        result: Result<PollView, ApiError>,
        reply: Reply<PollView>,
    },
}

/// Cloneable front door to a running live-update loop.
#[derive(Clone)]
pub struct LiveHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ViewState>,
    notifications: broadcast::Sender<Notification>,
}

impl LiveHandle {
    fn send(&self, command: Command) -> Result<(), ClientError> {
        self.commands.send(command).map_err(|_| ClientError::Closed)
    }

    pub async fn vote(&self, poll_id: PollId, option_id: OptionId) -> Result<ActionOutcome, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Vote {
            poll_id,
            option_id,
            reply,
        })?;
        rx.await.map_err(|_| ClientError::Closed)
    }

    pub async fn like(&self, poll_id: PollId) -> Result<ActionOutcome, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Like { poll_id, reply })?;
        rx.await.map_err(|_| ClientError::Closed)
    }

    pub async fn create_poll(&self, question: impl Into<String>, options: Vec<String>) -> Result<PollView, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::CreatePoll {
            question: question.into(),
            options,
            reply,
        })?;
        rx.await.map_err(|_| ClientError::Closed)?
    }

    pub fn refresh(&self) -> Result<(), ClientError> {
        self.send(Command::Refresh)
    }

    pub fn set_viewer(&self, viewer: Option<UserId>) -> Result<(), ClientError> {
        self.send(Command::SetViewer(viewer))
    }

    /// Reverts pending actions older than `older_than`.
    pub fn expire_in_flight(&self, older_than: Duration) -> Result<(), ClientError> {
        self.send(Command::ExpireInFlight(older_than))
    }

    pub fn shutdown(&self) {
        let _ = self.send(Command::Shutdown);
    }

    pub fn state(&self) -> watch::Receiver<ViewState> {
        self.state.clone()
    }

    pub fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }
}

/// Single owner of the reconciler. Commands, request completions and push
/// messages are handled one at a time, so the store needs no locking.
pub struct LiveUpdates<A, S> {
    api: Arc<A>,
    source: Arc<S>,
    scope: Scope,
    reconciler: Reconciler,
    loading: bool,
    commands: mpsc::UnboundedReceiver<Command>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions: mpsc::UnboundedReceiver<Completion>,
    push: Option<PushStream>,
    state: watch::Sender<ViewState>,
    notifications: broadcast::Sender<Notification>,
}

impl<A: PollApi, S: UpdateSource> LiveUpdates<A, S> {
    pub fn spawn(api: Arc<A>, source: Arc<S>, scope: Scope, viewer: Option<UserId>) -> (LiveHandle, JoinHandle<()>) {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (completions_tx, completions) = mpsc::unbounded_channel();
        let (state, state_rx) = watch::channel(ViewState {
            viewer: viewer.clone(),
            ..ViewState::default()
        });
        let (notifications, _) = broadcast::channel(64);

        let handle = LiveHandle {
            commands: commands_tx,
            state: state_rx,
            notifications: notifications.clone(),
        };

        let live = LiveUpdates {
            api,
            source,
            scope,
            reconciler: Reconciler::new(viewer),
            loading: false,
            commands,
            completions_tx,
            completions,
            push: None,
            state,
            notifications,
        };

        (handle, tokio::spawn(live.run()))
    }

    async fn run(mut self) {
        self.subscribe().await;
        self.refresh();
        self.publish();

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    None | Some(Command::Shutdown) => break,
                    Some(command) => self.handle_command(command).await,
                },
                Some(done) = self.completions.recv() => self.handle_completion(done),
                update = next_push(&mut self.push) => match update {
                    Some(raw) => self.handle_push(raw),
                    None => {
                        info!("push channel closed");
                        self.push = None;
                    }
                },
            }
            self.publish();
        }

        self.push = None;
        self.publish();
        info!("live updates stopped");
    }

    async fn subscribe(&mut self) {
        self.push = None;
        if self.reconciler.viewer().is_none() {
            return;
        }
        match self.source.subscribe().await {
            Ok(stream) => self.push = Some(stream),
            Err(e) => warn!("push subscription failed: {e}"),
        }
    }

    fn refresh(&mut self) {
        let api = self.api.clone();
        let epoch = self.reconciler.epoch();
        let done = self.completions_tx.clone();

        let viewer = match (self.scope, self.reconciler.viewer()) {
            (Scope::AllPolls, _) => None,
            (Scope::ByViewer, Some(viewer)) => Some(viewer.clone()),
            (Scope::ByViewer, None) => {
                debug!("no viewer, skipping fetch of own polls");
                return;
            }
        };

        self.loading = true;
        tokio::spawn(async move {
            let result = match viewer {
                Some(viewer) => api.list_polls_by_user(&viewer).await,
                None => api.list_polls().await,
            };
            let _ = done.send(Completion::Loaded { epoch, result });
        });
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Vote {
                poll_id,
                option_id,
                reply,
            } => {
                let outcome = self.reconciler.begin_vote(&poll_id, &option_id);
                let _ = reply.send(self.dispatch(outcome));
            }
            Command::Like { poll_id, reply } => {
                let outcome = self.reconciler.begin_like(&poll_id);
                let _ = reply.send(self.dispatch(outcome));
            }
            Command::CreatePoll {
                question,
                options,
                reply,
            } => self.create_poll(&question, options, reply),
            Command::Refresh => self.refresh(),
            Command::SetViewer(viewer) => {
                if self.reconciler.set_viewer(viewer) {
                    info!(viewer = ?self.reconciler.viewer(), "viewer changed");
                    self.subscribe().await;
                    self.refresh();
                }
            }
            Command::ExpireInFlight(older_than) => {
                for action in self.reconciler.expire_in_flight(older_than) {
                    warn!(poll_id = %action.key.poll_id, kind = ?action.key.kind, "expired unconfirmed action");
                }
            }
            Command::Shutdown => {}
        }
    }

    /// Sends the request for a freshly marked action. The marker is already
    /// set, so a second intent for the same target cannot race this one.
    fn dispatch(&self, outcome: Result<Ticket, IgnoredReason>) -> ActionOutcome {
        let ticket = match outcome {
            Ok(ticket) => ticket,
            Err(reason) => {
                debug!(?reason, "intent ignored");
                return ActionOutcome::Ignored(reason);
            }
        };

        let api = self.api.clone();
        let done = self.completions_tx.clone();
        tokio::spawn(async move {
            let poll_id = &ticket.key.poll_id;
            let result = match (ticket.key.kind, &ticket.option_id) {
                (ActionKind::Vote, Some(option_id)) => api.vote(poll_id, option_id).await,
                (ActionKind::Vote, None) => Ok(()),
                (ActionKind::Like, _) => api.like(poll_id).await,
            };
            let _ = done.send(Completion::Action { ticket, result });
        });

        ActionOutcome::Pending
    }

    fn create_poll(&mut self, question: &str, options: Vec<String>, reply: Reply<PollView>) {
        let Some(creator) = self.reconciler.viewer().cloned() else {
            let _ = reply.send(Err(ClientError::NoViewer));
            return;
        };

        let poll = match NewPoll::validate(question, options, creator) {
            Ok(poll) => poll,
            Err(e) => {
                let _ = reply.send(Err(e.into()));
                return;
            }
        };

        let api = self.api.clone();
        let done = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = api.create_poll(&poll).await;
            let _ = done.send(Completion::Created { result, reply });
        });
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Action { ticket, result } => {
                if let Some(notification) = self.reconciler.finish(ticket, result) {
                    self.notify(notification);
                }
            }
            Completion::Loaded { epoch, result } => {
                if epoch != self.reconciler.epoch() {
                    debug!("discarding poll list fetched for previous viewer");
                    return;
                }
                self.loading = false;
                match result {
                    Ok(polls) => {
                        info!(count = polls.len(), "polls loaded");
                        self.reconciler.load(polls);
                    }
                    Err(e) => {
                        warn!("Failed to fetch polls: {e}");
                        self.notify(Notification::failure("Failed to load polls", &e));
                    }
                }
            }
            Completion::Created { result, reply } => match result {
                Ok(poll) => {
                    info!(poll_id = %poll.id, "poll created");
                    self.reconciler.upsert(poll.clone());
                    self.notify(Notification::Success("Poll created successfully!".to_string()));
                    let _ = reply.send(Ok(poll));
                }
                Err(e) => {
                    warn!("Failed to create poll: {e}");
                    self.notify(Notification::failure("Failed to create poll. Please try again.", &e));
                    let _ = reply.send(Err(e.into()));
                }
            },
        }
    }

    fn handle_push(&mut self, raw: RawUpdate) {
        match self.reconciler.apply_push(&raw) {
            Some(ApplyOutcome::Applied { own, confirmed }) => {
                debug!(kind = %raw.kind, own, confirmed, "push update applied");
            }
            Some(ApplyOutcome::Stale) => debug!(kind = %raw.kind, "stale push update dropped"),
            Some(ApplyOutcome::UnknownPoll | ApplyOutcome::UnknownOption) | None => {}
        }
    }

    fn notify(&mut self, notification: Notification) {
        if notification.is_session_expired() {
            warn!("session expired, dropping viewer");
            self.reconciler.set_viewer(None);
            self.push = None;
        }
        let _ = self.notifications.send(notification);
    }

    fn publish(&self) {
        self.state.send_replace(ViewState {
            store: self.reconciler.store().clone(),
            viewer: self.reconciler.viewer().cloned(),
            loading: self.loading,
            connected: self.push.is_some(),
        });
    }
}

async fn next_push(push: &mut Option<PushStream>) -> Option<RawUpdate> {
    match push {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}
