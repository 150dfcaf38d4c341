//! Client core for QuickPoll: a poll store kept in sync with the poll
//! service through its REST API and live push channel.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod polls;
pub mod push;
pub mod reconciler;
pub mod session;
pub mod startup;
pub mod store;

pub use api::{HttpPollApi, PollApi};
pub use config::Config;
pub use error::ClientError;
pub use reconciler::{LiveHandle, LiveUpdates, Notification, Scope, ViewState};
pub use startup::ClientState;
pub use store::{PollStore, PollView};
