mod driver;
mod machine;

pub use driver::{ActionOutcome, LiveHandle, LiveUpdates, Scope, ViewState};
pub use machine::{IgnoredReason, Notification, Reconciler, Ticket};
