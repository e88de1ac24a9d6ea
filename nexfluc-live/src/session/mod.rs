//! Live sessions
//!
//! Each session is an actor task owning its transcript buffer, message log
//! and both derivation streams. Handles talk to it over an `mpsc` channel
//! and observe published snapshots through `watch` channels.
//!
//! - **transcript_buffer** - Committed text plus partial overlay
//! - **stream_state** - Debounce/epoch controller per derivation stream
//! - **session_orchestrator** - The actor loop and its handle
//! - **registry** - Concurrent sessions keyed by id

pub mod registry;
pub mod session_orchestrator;
pub mod stream_state;
pub mod transcript_buffer;

pub use registry::SessionRegistry;
pub use session_orchestrator::{
    SessionDeps, SessionError, SessionHandle, SessionSettings, SessionStatus, StreamStatus,
};
pub use stream_state::{Publication, StreamController, StreamState};
pub use transcript_buffer::TranscriptBuffer;

use crate::types::{GraphSnapshot, InsightRecord};
use std::sync::Arc;

/// Graph stream derivation
///
/// Returned snapshots carry epoch 0; the session stamps the epoch on publish.
#[async_trait::async_trait]
pub trait GraphDeriver: Send + Sync {
    async fn derive_graph(&self, text: &str, previous: Option<Arc<GraphSnapshot>>)
        -> GraphSnapshot;
}

/// Insight stream derivation
#[async_trait::async_trait]
pub trait InsightDeriver: Send + Sync {
    async fn derive_insight(&self, text: &str) -> InsightRecord;
}
