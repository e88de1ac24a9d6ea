//! Session API handlers
//!
//! Connect/reconnect/close, transcript and message ingestion, and read access
//! to the latest published snapshots.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use nexfluc_common::events::NexflucEvent;
use serde::Serialize;
use uuid::Uuid;

use crate::db::records::{count_insights, load_insights, StoredInsight};
use crate::db::{save_detached, BrandSave, PersistedRecord};
use crate::error::{ApiError, ApiResult};
use crate::session::{SessionHandle, SessionStatus};
use crate::types::{BrandIdentity, ConversationMessage, GraphSnapshot, InsightRecord, TranscriptEvent};
use crate::AppState;

/// POST /sessions response
#[derive(Debug, Serialize)]
pub struct SessionCreatedResponse {
    pub session_id: Uuid,
    pub generation: Uuid,
    pub created_at: DateTime<Utc>,
}

/// GET /sessions entry
#[derive(Debug, Serialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub graph_epoch: Option<u64>,
    pub insight_epoch: Option<u64>,
}

/// GET /sessions/:id/status response
#[derive(Debug, Serialize)]
pub struct SessionStatusResponse {
    #[serde(flatten)]
    pub status: SessionStatus,
    pub persisted_insights: i64,
}

/// GET /sessions/:id/graph response
#[derive(Debug, Serialize)]
pub struct GraphResponse {
    pub session_id: Uuid,
    pub graph: Option<GraphSnapshot>,
}

/// GET /sessions/:id/insights response
#[derive(Debug, Serialize)]
pub struct InsightsResponse {
    pub session_id: Uuid,
    pub latest: Option<InsightRecord>,
    pub history: Vec<StoredInsight>,
}

/// POST /sessions/:id/reconnect response
#[derive(Debug, Serialize)]
pub struct ReconnectResponse {
    pub session_id: Uuid,
    pub generation: Uuid,
}

async fn find_session(state: &AppState, session_id: Uuid) -> ApiResult<SessionHandle> {
    state
        .sessions
        .get(session_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Session not found: {}", session_id)))
}

/// POST /sessions
///
/// Connect: spawn a new session actor.
pub async fn create_session(
    State(state): State<AppState>,
) -> ApiResult<(StatusCode, Json<SessionCreatedResponse>)> {
    let session = state.sessions.create().await;
    let status = session.status().await?;

    Ok((
        StatusCode::CREATED,
        Json(SessionCreatedResponse {
            session_id: session.id(),
            generation: status.generation,
            created_at: session.created_at(),
        }),
    ))
}

/// GET /sessions
pub async fn list_sessions(State(state): State<AppState>) -> Json<Vec<SessionSummary>> {
    let sessions = state
        .sessions
        .list()
        .await
        .into_iter()
        .map(|s| SessionSummary {
            session_id: s.id(),
            created_at: s.created_at(),
            graph_epoch: s.latest_graph().map(|g| g.epoch),
            insight_epoch: s.latest_insight().map(|i| i.epoch),
        })
        .collect();

    Json(sessions)
}

/// POST /sessions/:id/transcript
///
/// Accepts one `partial` or `committed` speech event.
pub async fn push_transcript(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(event): Json<TranscriptEvent>,
) -> ApiResult<StatusCode> {
    let session = find_session(&state, session_id).await?;
    session.push_transcript(event).await?;
    Ok(StatusCode::ACCEPTED)
}

/// POST /sessions/:id/messages
pub async fn push_message(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(message): Json<ConversationMessage>,
) -> ApiResult<StatusCode> {
    if message.message.trim().is_empty() {
        return Err(ApiError::BadRequest("Message text is empty".to_string()));
    }

    let session = find_session(&state, session_id).await?;
    session.push_message(message).await?;
    Ok(StatusCode::ACCEPTED)
}

/// GET /sessions/:id/status
pub async fn get_status(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<SessionStatusResponse>> {
    let session = find_session(&state, session_id).await?;
    let status = session.status().await?;
    let persisted_insights = count_insights(&state.db, session_id).await?;

    Ok(Json(SessionStatusResponse {
        status,
        persisted_insights,
    }))
}

/// GET /sessions/:id/graph
///
/// Latest accepted graph snapshot, `null` before the first publication.
pub async fn get_graph(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<GraphResponse>> {
    let session = find_session(&state, session_id).await?;
    Ok(Json(GraphResponse {
        session_id,
        graph: session.latest_graph().as_deref().cloned(),
    }))
}

/// GET /sessions/:id/insights
///
/// Latest accepted insight record plus the persisted history.
pub async fn get_insights(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<InsightsResponse>> {
    let session = find_session(&state, session_id).await?;
    let history = load_insights(&state.db, session_id).await?;

    Ok(Json(InsightsResponse {
        session_id,
        latest: session.latest_insight().as_deref().cloned(),
        history,
    }))
}

/// POST /sessions/:id/reconnect
///
/// Counters to zero, buffer and snapshots cleared, new generation.
pub async fn reconnect_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<ReconnectResponse>> {
    let session = find_session(&state, session_id).await?;
    let generation = session.reconnect().await?;

    Ok(Json(ReconnectResponse {
        session_id,
        generation,
    }))
}

/// DELETE /sessions/:id
pub async fn close_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state
        .sessions
        .remove(session_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Session not found: {}", session_id)))?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /sessions/:id/brand
///
/// Generate a brand identity from the transcript and the latest insight.
/// Never fails on provider errors; the default brand is returned instead.
pub async fn generate_brand(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<BrandIdentity>> {
    let session = find_session(&state, session_id).await?;
    let transcript = session.insight_input().await?;
    if transcript.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "Session has no transcript to generate a brand from".to_string(),
        ));
    }

    let insight = session.latest_insight();
    let brand = state.brand.synthesize(&transcript, insight.as_deref()).await;

    tracing::info!(
        session_id = %session_id,
        names = brand.name.len(),
        "Brand identity generated"
    );

    if let Some(sink) = &state.sessions.deps().sink {
        save_detached(
            sink.clone(),
            PersistedRecord::Brand(BrandSave {
                session_id,
                transcript,
                insight,
                brand: brand.clone(),
            }),
        );
    }

    state.event_bus.emit_lossy(NexflucEvent::BrandGenerated {
        session_id,
        timestamp: Utc::now(),
    });

    Ok(Json(brand))
}

/// Build session routes
pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/sessions", post(create_session).get(list_sessions))
        .route("/sessions/:id", axum::routing::delete(close_session))
        .route("/sessions/:id/transcript", post(push_transcript))
        .route("/sessions/:id/messages", post(push_message))
        .route("/sessions/:id/status", get(get_status))
        .route("/sessions/:id/graph", get(get_graph))
        .route("/sessions/:id/insights", get(get_insights))
        .route("/sessions/:id/reconnect", post(reconnect_session))
        .route("/sessions/:id/brand", post(generate_brand))
}
