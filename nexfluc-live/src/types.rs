//! Core domain types for nexfluc-live
//!
//! Defines the values that flow through the derivation pipeline:
//! - **Input:** TranscriptEvent, ConversationMessage
//! - **Graph stream:** Entity, Edge, Position, GraphSnapshot
//! - **Insight stream:** InsightRecord, SimilarItem
//! - **Brand synthesis:** BrandIdentity
//!
//! Snapshots are immutable once published and shared as `Arc`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// Input Types
// ============================================================================

/// Speech-to-text event
///
/// A partial replaces the previous partial; a committed event appends to the
/// committed transcript and clears the partial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TranscriptEvent {
    Partial { text: String },
    Committed { text: String },
}

/// Who sent a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Ai,
}

impl Speaker {
    /// Prefix used when rendering the conversation for the insight stream
    pub fn render_prefix(&self) -> &'static str {
        match self {
            Speaker::User => "User",
            Speaker::Ai => "AI Agent",
        }
    }
}

/// Discrete conversation message (second insight input source)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub source: Speaker,
    pub message: String,
}

impl ConversationMessage {
    pub fn render(&self) -> String {
        format!("{}: {}", self.source.render_prefix(), self.message)
    }
}

// ============================================================================
// Graph Stream
// ============================================================================

/// Entity category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Startup,
    Concept,
    Feature,
    Market,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Startup => "startup",
            EntityKind::Concept => "concept",
            EntityKind::Feature => "feature",
            EntityKind::Market => "market",
        }
    }

    /// Display weight assigned by the extractor for sentence-level hits
    pub fn default_weight(&self) -> u32 {
        match self {
            EntityKind::Startup => 10,
            EntityKind::Feature => 8,
            EntityKind::Market => 9,
            EntityKind::Concept => 12,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// External reference attached during enrichment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub title: String,
    pub url: String,
}

/// Graph node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Slug of the normalized label; equal labels (any case) share an id
    pub id: String,
    pub label: String,
    pub kind: EntityKind,
    pub weight: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<SourceRef>,
}

impl Entity {
    pub fn new(
        label: impl Into<String>,
        kind: EntityKind,
        weight: u32,
        description: Option<String>,
    ) -> Self {
        let label = label.into();
        Self {
            id: entity_id(&label),
            label,
            kind,
            weight,
            description,
            sources: Vec::new(),
        }
    }
}

/// Derive a stable entity id from a label
///
/// Lowercases, maps every run of non-alphanumeric characters to a single `-`
/// and strips leading/trailing dashes. Whitespace differences and case do not
/// change the id.
pub fn entity_id(label: &str) -> String {
    let mut id = String::with_capacity(label.len());
    let mut pending_dash = false;

    for c in label.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            if pending_dash && !id.is_empty() {
                id.push('-');
            }
            pending_dash = false;
            id.push(c);
        } else {
            pending_dash = true;
        }
    }

    id
}

/// Undirected weighted edge, canonicalized so `source_id < target_id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub source_id: String,
    pub target_id: String,
    /// In (threshold, 1.0]
    pub strength: f32,
}

/// 2D layout coordinate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Published graph state for one epoch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub epoch: u64,
    pub nodes: Vec<Entity>,
    pub edges: Vec<Edge>,
    pub positions: BTreeMap<String, Position>,
}

// ============================================================================
// Insight Stream
// ============================================================================

/// Comparable concept or company surfaced by the insight synthesizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarItem {
    pub name: String,
    /// Clamped to [0, 1]
    pub similarity: f32,
    pub description: String,
    pub tags: Vec<String>,
}

/// Published insight state for one epoch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsightRecord {
    pub epoch: u64,
    pub summary: String,
    pub differentiation: Vec<String>,
    pub similar_items: Vec<SimilarItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub research_notes: Option<String>,
}

// ============================================================================
// Brand Synthesis
// ============================================================================

/// Named palette entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorSwatch {
    pub name: String,
    pub hex: String,
}

/// Generated brand identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrandIdentity {
    pub name: Vec<String>,
    pub tagline: Vec<String>,
    pub color_palette: Vec<ColorSwatch>,
    pub design_rationale: String,
}

impl Default for BrandIdentity {
    fn default() -> Self {
        let swatch = |name: &str, hex: &str| ColorSwatch {
            name: name.to_string(),
            hex: hex.to_string(),
        };

        Self {
            name: vec![
                "Nexfluc".to_string(),
                "InnovateHub".to_string(),
                "FutureVentures".to_string(),
            ],
            tagline: vec![
                "Your AI Idea Verifier".to_string(),
                "Transform Ideas into Reality".to_string(),
            ],
            color_palette: vec![
                swatch("Primary", "#FF7A1A"),
                swatch("Secondary", "#46C3FF"),
                swatch("Accent", "#C06FFF"),
            ],
            design_rationale: "Modern, tech-forward design that stands out from competitors."
                .to_string(),
        }
    }
}
