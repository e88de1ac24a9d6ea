//! Record persistence
//!
//! Published insights and generated brands go through a `RecordSink`.
//! Saves are spawned fire-and-forget: a failing sink is logged and never
//! affects the session that produced the record.

use crate::types::{BrandIdentity, Edge, Entity, InsightRecord};
use chrono::{DateTime, Utc};
use nexfluc_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Insight published by a session, with the context it was derived from
#[derive(Debug, Clone)]
pub struct InsightSave {
    pub session_id: Uuid,
    pub transcript: String,
    pub record: Arc<InsightRecord>,
    pub nodes: Vec<Entity>,
    pub edges: Vec<Edge>,
}

/// Brand identity generated for a session
#[derive(Debug, Clone)]
pub struct BrandSave {
    pub session_id: Uuid,
    pub transcript: String,
    pub insight: Option<Arc<InsightRecord>>,
    pub brand: BrandIdentity,
}

#[derive(Debug, Clone)]
pub enum PersistedRecord {
    Insight(InsightSave),
    Brand(BrandSave),
}

impl PersistedRecord {
    pub fn kind(&self) -> &'static str {
        match self {
            PersistedRecord::Insight(_) => "insight",
            PersistedRecord::Brand(_) => "brand",
        }
    }
}

/// Destination for persisted records
#[async_trait::async_trait]
pub trait RecordSink: Send + Sync {
    async fn save(&self, record: PersistedRecord) -> Result<()>;
}

/// Spawn a save without awaiting it; failures are logged only
pub fn save_detached(sink: Arc<dyn RecordSink>, record: PersistedRecord) {
    tokio::spawn(async move {
        let kind = record.kind();
        match sink.save(record).await {
            Ok(()) => debug!(kind, "Record saved"),
            Err(e) => warn!(kind, error = %e, "Failed to save record"),
        }
    });
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

/// SQLite-backed sink
#[derive(Clone)]
pub struct SqliteRecordSink {
    pool: SqlitePool,
}

impl SqliteRecordSink {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn save_insight(&self, save: &InsightSave) -> Result<()> {
        let record = &save.record;

        sqlx::query(
            r#"
            INSERT INTO insights (
                id, session_id, epoch, transcription, summary, differentiation,
                similar_items, research_notes, network_nodes, network_edges, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(save.session_id.to_string())
        .bind(record.epoch as i64)
        .bind(&save.transcript)
        .bind(&record.summary)
        .bind(to_json(&record.differentiation)?)
        .bind(to_json(&record.similar_items)?)
        .bind(record.research_notes.as_deref())
        .bind(to_json(&save.nodes)?)
        .bind(to_json(&save.edges)?)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_brand(&self, save: &BrandSave) -> Result<()> {
        let insight = save.insight.as_deref();
        let differentiation = insight.map(|i| i.differentiation.clone()).unwrap_or_default();
        let similar_items = insight.map(|i| i.similar_items.clone()).unwrap_or_default();

        sqlx::query(
            r#"
            INSERT INTO brand_identities (
                id, session_id, transcription, insights_summary, insights_differentiation,
                insights_similar_items, brand_name, brand_tagline, brand_color_palette,
                brand_design_rationale, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(save.session_id.to_string())
        .bind(&save.transcript)
        .bind(insight.map(|i| i.summary.as_str()))
        .bind(to_json(&differentiation)?)
        .bind(to_json(&similar_items)?)
        .bind(to_json(&save.brand.name)?)
        .bind(to_json(&save.brand.tagline)?)
        .bind(to_json(&save.brand.color_palette)?)
        .bind(&save.brand.design_rationale)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl RecordSink for SqliteRecordSink {
    async fn save(&self, record: PersistedRecord) -> Result<()> {
        match &record {
            PersistedRecord::Insight(save) => self.save_insight(save).await,
            PersistedRecord::Brand(save) => self.save_brand(save).await,
        }
    }
}

/// Summary row of a stored insight
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct StoredInsight {
    pub epoch: u64,
    pub summary: String,
    pub node_count: usize,
    pub created_at: DateTime<Utc>,
}

/// Count insights stored for a session
pub async fn count_insights(pool: &SqlitePool, session_id: Uuid) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM insights WHERE session_id = ?")
        .bind(session_id.to_string())
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Stored insights for a session, oldest first
pub async fn load_insights(pool: &SqlitePool, session_id: Uuid) -> Result<Vec<StoredInsight>> {
    let rows = sqlx::query(
        r#"
        SELECT epoch, summary, network_nodes, created_at
        FROM insights
        WHERE session_id = ?
        ORDER BY created_at ASC
        "#,
    )
    .bind(session_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            let nodes: String = row.get("network_nodes");
            let nodes: Vec<serde_json::Value> = serde_json::from_str(&nodes)
                .map_err(|e| Error::CorruptRecord {
                    table: "insights",
                    detail: format!("network_nodes: {}", e),
                })?;
            let created_at: String = row.get("created_at");
            let created_at = DateTime::parse_from_rfc3339(&created_at)
                .map_err(|e| Error::CorruptRecord {
                    table: "insights",
                    detail: format!("created_at: {}", e),
                })?
                .with_timezone(&Utc);

            Ok(StoredInsight {
                epoch: row.get::<i64, _>("epoch") as u64,
                summary: row.get("summary"),
                node_count: nodes.len(),
                created_at,
            })
        })
        .collect()
}

/// Count brand identities stored for a session
pub async fn count_brands(pool: &SqlitePool, session_id: Uuid) -> Result<i64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM brand_identities WHERE session_id = ?")
            .bind(session_id.to_string())
            .fetch_one(pool)
            .await?;
    Ok(count)
}
