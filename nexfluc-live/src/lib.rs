//! nexfluc-live library interface
//!
//! Live transcript in, versioned entity graphs and insight records out.
//! Exposes public APIs for integration testing.

pub mod api;
pub mod config;
pub mod db;
pub mod enrichment;
pub mod error;
pub mod extractors;
pub mod graph;
pub mod providers;
pub mod session;
pub mod synthesis;
pub mod types;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use nexfluc_common::config::PipelineSettings;
use nexfluc_common::events::EventBus;
use session::{SessionDeps, SessionRegistry, SessionSettings};
use sqlx::SqlitePool;
use std::sync::Arc;
use synthesis::BrandSynthesizer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Live sessions
    pub sessions: SessionRegistry,
    /// Brand generation on request
    pub brand: Arc<BrandSynthesizer>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    /// Production wiring: pipeline derivers, SQLite sink
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        pipeline: config::Pipeline,
        settings: &PipelineSettings,
    ) -> Self {
        let deps = SessionDeps {
            graph: pipeline.graph,
            insight: pipeline.insight,
            sink: Some(Arc::new(db::SqliteRecordSink::new(db.clone()))),
            event_bus: event_bus.clone(),
            settings: SessionSettings::from(settings),
        };
        Self::with_sessions(db, event_bus, SessionRegistry::new(deps), pipeline.brand)
    }

    pub fn with_sessions(
        db: SqlitePool,
        event_bus: EventBus,
        sessions: SessionRegistry,
        brand: Arc<BrandSynthesizer>,
    ) -> Self {
        Self {
            db,
            event_bus,
            sessions,
            brand,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::session_routes())
        .route("/events", get(api::event_stream))
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
