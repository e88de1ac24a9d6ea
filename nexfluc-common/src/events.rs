//! Event types for the Nexfluc event system
//!
//! Provides shared event definitions and the EventBus used for SSE broadcasting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Derivation stream identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DerivationStream {
    /// Entity graph + layout
    Graph,
    /// Structured insight record
    Insight,
}

impl DerivationStream {
    pub fn as_str(&self) -> &'static str {
        match self {
            DerivationStream::Graph => "graph",
            DerivationStream::Insight => "insight",
        }
    }
}

impl std::fmt::Display for DerivationStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Nexfluc event types
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
/// They are notifications only; snapshots are fetched from the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NexflucEvent {
    /// A session was created (connect)
    SessionConnected {
        session_id: Uuid,
        generation: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// A session was reset (disconnect/reconnect); counters and buffer cleared
    SessionReset {
        session_id: Uuid,
        generation: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// A session was closed and removed
    SessionClosed {
        session_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// A graph snapshot was accepted and published
    GraphPublished {
        session_id: Uuid,
        epoch: u64,
        node_count: usize,
        edge_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// An insight record was accepted and published
    InsightPublished {
        session_id: Uuid,
        epoch: u64,
        similar_item_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// A derivation resolved after its stream had moved on
    DerivationDiscarded {
        session_id: Uuid,
        stream: DerivationStream,
        epoch: u64,
        current_epoch: u64,
        timestamp: DateTime<Utc>,
    },

    /// A brand identity was generated for a session
    BrandGenerated {
        session_id: Uuid,
        timestamp: DateTime<Utc>,
    },
}

impl NexflucEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            NexflucEvent::SessionConnected { .. } => "SessionConnected",
            NexflucEvent::SessionReset { .. } => "SessionReset",
            NexflucEvent::SessionClosed { .. } => "SessionClosed",
            NexflucEvent::GraphPublished { .. } => "GraphPublished",
            NexflucEvent::InsightPublished { .. } => "InsightPublished",
            NexflucEvent::DerivationDiscarded { .. } => "DerivationDiscarded",
            NexflucEvent::BrandGenerated { .. } => "BrandGenerated",
        }
    }

    /// Session the event belongs to
    pub fn session_id(&self) -> Uuid {
        match self {
            NexflucEvent::SessionConnected { session_id, .. }
            | NexflucEvent::SessionReset { session_id, .. }
            | NexflucEvent::SessionClosed { session_id, .. }
            | NexflucEvent::GraphPublished { session_id, .. }
            | NexflucEvent::InsightPublished { session_id, .. }
            | NexflucEvent::DerivationDiscarded { session_id, .. }
            | NexflucEvent::BrandGenerated { session_id, .. } => *session_id,
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus
///
/// Uses tokio::broadcast internally:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use nexfluc_common::events::{EventBus, NexflucEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(NexflucEvent::SessionClosed {
///     session_id: uuid::Uuid::new_v4(),
///     timestamp: chrono::Utc::now(),
/// });
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<NexflucEvent>,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<NexflucEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: NexflucEvent,
    ) -> Result<usize, broadcast::error::SendError<NexflucEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: NexflucEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
