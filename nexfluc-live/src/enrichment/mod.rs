//! Enrichment Fanout
//!
//! Applies the search chain concurrently across extracted entities.
//!
//! - Bounded concurrency via `futures::stream::buffer_unordered`
//! - Results re-keyed by input index, never by arrival order
//! - Per-entity failure isolation: a failed lookup returns the entity unmodified

use crate::providers::{SearchChain, SearchDepth, SearchRequest, SearchResponse};
use crate::types::{Entity, SourceRef};
use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

/// Results requested per entity lookup
const RESULTS_PER_ENTITY: u32 = 3;

/// Maximum sources attached to an entity
const MAX_SOURCES: usize = 3;

/// Concurrent entity enrichment through a search provider chain
#[derive(Clone)]
pub struct EnrichmentFanout {
    chain: SearchChain,
    concurrency: usize,
}

impl EnrichmentFanout {
    /// Create a fanout; `concurrency` of 0 is treated as 1
    pub fn new(chain: SearchChain, concurrency: usize) -> Self {
        Self {
            chain,
            concurrency: concurrency.max(1),
        }
    }

    /// Enrich every entity
    ///
    /// Total: the output has the same length and order as the input whatever
    /// the providers do.
    pub async fn enrich(&self, entities: Vec<Entity>) -> Vec<Entity> {
        if entities.is_empty() {
            return entities;
        }
        if self.chain.is_empty() {
            debug!("No search providers configured, skipping enrichment");
            return entities;
        }

        let total = entities.len();
        let chain = &self.chain;

        let mut enriched: Vec<(usize, Entity)> = stream::iter(entities.into_iter().enumerate())
            .map(|(index, entity)| async move { (index, enrich_one(chain, entity).await) })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        enriched.sort_by_key(|(index, _)| *index);

        let described = enriched
            .iter()
            .filter(|(_, e)| e.description.is_some())
            .count();
        debug!(total, described, "Enrichment fanout complete");

        enriched.into_iter().map(|(_, entity)| entity).collect()
    }
}

async fn enrich_one(chain: &SearchChain, entity: Entity) -> Entity {
    let request = SearchRequest::new(
        format!("{} {}", entity.label, entity.kind),
        SearchDepth::Basic,
        RESULTS_PER_ENTITY,
    );

    match chain.search(&request).await {
        Ok(success) => {
            debug!(
                entity = %entity.id,
                provider = %success.provider_used,
                "Entity enriched"
            );
            apply(entity, &success.value)
        }
        Err(e) => {
            warn!(entity = %entity.id, error = %e, "Enrichment failed, keeping entity as-is");
            entity
        }
    }
}

/// Merge a search response into an entity
///
/// Fills `description` only when absent; attaches up to `MAX_SOURCES` sources.
fn apply(mut entity: Entity, response: &SearchResponse) -> Entity {
    if entity.description.is_none() {
        entity.description = response.best_text().map(str::to_string);
    }

    let sources: Vec<SourceRef> = response
        .results
        .iter()
        .take(MAX_SOURCES)
        .map(|r| SourceRef {
            title: r.title.clone(),
            url: r.url.clone(),
        })
        .collect();

    if !sources.is_empty() {
        entity.sources = sources;
    }

    entity
}
