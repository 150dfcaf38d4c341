pub mod in_flight;
pub mod models;
pub mod poll_store;

pub use in_flight::{ActionKey, ActionKind, InFlightAction};
pub use models::*;
pub use poll_store::{ApplyOutcome, PollStore};
