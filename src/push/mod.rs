pub mod models;
pub use models::*;

mod broadcaster;
pub use broadcaster::BroadcastSource;

mod sse_source;
pub use sse_source::{SseFramer, SseSource, parse_frame};

use crate::error::PushError;
use async_trait::async_trait;
use futures::stream::BoxStream;

pub type PushStream = BoxStream<'static, RawUpdate>;

/// A connection to the push channel. One subscription carries vote and
/// like updates for every poll.
#[async_trait]
pub trait UpdateSource: Send + Sync + 'static {
    async fn subscribe(&self) -> Result<PushStream, PushError>;
}
