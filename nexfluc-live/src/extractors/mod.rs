//! Text Extractors
//!
//! Turns transcript text into candidate graph entities.
//!
//! # Extractors
//! 1. **entity_extractor** - Keyword/sentence/phrase heuristics → `Vec<Entity>`
//!
//! Extraction is pure and total: it never fails and never performs I/O.
//! Enrichment of the extracted entities happens later in `enrichment`.

pub mod entity_extractor;

pub use entity_extractor::extract;
