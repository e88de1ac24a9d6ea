//! Server-Sent Events for session lifecycle and publications
//!
//! Streams `SessionConnected`, `SessionReset`, `SessionClosed`,
//! `GraphPublished`, `InsightPublished`, `DerivationDiscarded` and
//! `BrandGenerated`. Snapshots themselves are fetched over REST.

use crate::AppState;
use axum::{
    extract::{Query, State},
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
pub struct EventStreamQuery {
    /// Only forward events for this session
    pub session_id: Option<Uuid>,
}

/// GET /events
pub async fn event_stream(
    State(state): State<AppState>,
    Query(query): Query<EventStreamQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    nexfluc_common::sse::create_event_sse_stream("nexfluc-live", &state.event_bus, query.session_id)
}
