//! Database access for nexfluc-live
//!
//! SQLite store for published insights and generated brand identities.

pub mod records;

pub use records::{
    save_detached, InsightSave, BrandSave, PersistedRecord, RecordSink, SqliteRecordSink,
};

use nexfluc_common::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::Path;

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "nexfluc.db";

/// Initialize database connection pool
///
/// Creates the parent directory and the database file when missing.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // mode=rwc: read, write, create
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

/// In-memory database with tables initialized
///
/// Single connection: every pooled connection to `sqlite::memory:` would
/// otherwise see its own empty database.
pub async fn init_memory_pool() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    init_tables(&pool).await?;
    Ok(pool)
}

/// Create tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS insights (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            epoch INTEGER NOT NULL,
            transcription TEXT NOT NULL,
            summary TEXT NOT NULL,
            differentiation TEXT NOT NULL DEFAULT '[]',
            similar_items TEXT NOT NULL DEFAULT '[]',
            research_notes TEXT,
            network_nodes TEXT NOT NULL DEFAULT '[]',
            network_edges TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS brand_identities (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            transcription TEXT NOT NULL,
            insights_summary TEXT,
            insights_differentiation TEXT NOT NULL DEFAULT '[]',
            insights_similar_items TEXT NOT NULL DEFAULT '[]',
            brand_name TEXT NOT NULL,
            brand_tagline TEXT NOT NULL,
            brand_color_palette TEXT NOT NULL,
            brand_design_rationale TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_insights_session ON insights (session_id)")
        .execute(pool)
        .await?;

    tracing::info!("Database tables initialized (insights, brand_identities)");

    Ok(())
}
