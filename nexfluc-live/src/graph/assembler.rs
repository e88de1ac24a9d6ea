//! Graph assembly
//!
//! Scores every unordered pair of entities from independent signals and
//! materializes an undirected edge only when the clamped score exceeds the
//! threshold. Pure and deterministic.

use crate::types::{Edge, Entity};
use nexfluc_common::config::PipelineSettings;
use std::collections::HashSet;

/// Words carrying no relational meaning in labels
const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "our", "you", "your", "are", "was", "were",
    "has", "have", "had", "but", "not", "from", "they", "them", "its", "into", "about", "what",
    "which", "who", "will", "would", "can", "could", "should", "just", "also", "some", "more",
    "very", "like", "than", "then", "there", "their", "been", "being", "all", "any", "out",
];

/// Prefix words introduced by labelled entities ("Feature: ...")
const KIND_PREFIX_WORDS: &[&str] = &["feature", "market", "concept", "startup"];

/// Edge scoring weights and threshold
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeWeights {
    pub kind_match: f32,
    pub label_overlap: f32,
    pub description_containment: f32,
    /// Edges are kept only when `score > threshold`
    pub threshold: f32,
}

impl Default for EdgeWeights {
    fn default() -> Self {
        Self::from(&PipelineSettings::default())
    }
}

impl From<&PipelineSettings> for EdgeWeights {
    fn from(settings: &PipelineSettings) -> Self {
        Self {
            kind_match: settings.kind_match_weight,
            label_overlap: settings.label_overlap_weight,
            description_containment: settings.description_containment_weight,
            threshold: settings.edge_threshold,
        }
    }
}

/// Nodes and materialized edges
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssembledGraph {
    pub nodes: Vec<Entity>,
    pub edges: Vec<Edge>,
}

/// Assemble a weighted undirected graph from entities
///
/// Nodes keep input order (duplicate ids after the first are dropped).
/// Edges are canonicalized `source_id < target_id` and sorted by
/// `(source_id, target_id)`.
pub fn assemble(entities: &[Entity], weights: &EdgeWeights) -> AssembledGraph {
    let mut seen = HashSet::new();
    let nodes: Vec<Entity> = entities
        .iter()
        .filter(|e| seen.insert(e.id.as_str()))
        .cloned()
        .collect();

    let features: Vec<NodeFeatures> = nodes.iter().map(NodeFeatures::new).collect();

    let mut edges = Vec::new();
    for i in 0..nodes.len() {
        for j in (i + 1)..nodes.len() {
            let strength = score(&nodes[i], &features[i], &nodes[j], &features[j], weights);
            if strength > weights.threshold {
                let (source_id, target_id) = if nodes[i].id < nodes[j].id {
                    (nodes[i].id.clone(), nodes[j].id.clone())
                } else {
                    (nodes[j].id.clone(), nodes[i].id.clone())
                };
                edges.push(Edge {
                    source_id,
                    target_id,
                    strength,
                });
            }
        }
    }

    edges.sort_by(|a, b| {
        a.source_id
            .cmp(&b.source_id)
            .then_with(|| a.target_id.cmp(&b.target_id))
    });

    AssembledGraph { nodes, edges }
}

/// Per-node precomputed comparison data
struct NodeFeatures {
    label_lower: String,
    description_lower: Option<String>,
    tokens: HashSet<String>,
}

impl NodeFeatures {
    fn new(entity: &Entity) -> Self {
        Self {
            label_lower: entity.label.to_lowercase(),
            description_lower: entity.description.as_ref().map(|d| d.to_lowercase()),
            tokens: label_tokens(&entity.label),
        }
    }

    fn description_mentions(&self, other: &NodeFeatures) -> bool {
        !other.label_lower.is_empty()
            && self
                .description_lower
                .as_deref()
                .is_some_and(|d| d.contains(&other.label_lower))
    }
}

/// Significant label tokens: 3+ alphanumeric chars, no stopwords, no kind prefixes
fn label_tokens(label: &str) -> HashSet<String> {
    label
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 3)
        .filter(|t| !STOPWORDS.contains(t) && !KIND_PREFIX_WORDS.contains(t))
        .map(str::to_string)
        .collect()
}

fn score(
    a: &Entity,
    fa: &NodeFeatures,
    b: &Entity,
    fb: &NodeFeatures,
    weights: &EdgeWeights,
) -> f32 {
    let mut total = 0.0;

    if a.kind == b.kind {
        total += weights.kind_match;
    }
    if !fa.tokens.is_disjoint(&fb.tokens) {
        total += weights.label_overlap;
    }
    if fa.description_mentions(fb) || fb.description_mentions(fa) {
        total += weights.description_containment;
    }

    total.min(1.0)
}
