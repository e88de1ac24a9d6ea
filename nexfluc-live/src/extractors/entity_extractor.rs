//! Heuristic entity extraction
//!
//! Two independent passes over the text:
//! 1. Sentence pass: each sentence is tested against four keyword sets.
//!    Startup hits contribute capitalized names; feature/market/concept hits
//!    contribute one labelled entity carrying the sentence as description.
//! 2. Phrase pass: 2-grams then 3-grams over the whole token stream.
//!    Phrase entities carry no description so enrichment can supply one.
//!
//! Output is deduplicated by id (first occurrence wins) and capped.

use crate::types::{Entity, EntityKind};
use std::collections::HashSet;

/// Inputs shorter than this (after trimming) yield no entities
pub const MIN_INPUT_CHARS: usize = 20;

/// Maximum number of entities returned
pub const MAX_ENTITIES: usize = 20;

/// Sentences must be longer than this to be considered
const MIN_SENTENCE_CHARS: usize = 10;

const MAX_PHRASES: usize = 10;
const MAX_PHRASE_CHARS: usize = 50;
const MIN_BIGRAM_CHARS: usize = 5;
const MIN_TRIGRAM_CHARS: usize = 8;
const PHRASE_WEIGHT: u32 = 7;

const STARTUP_DESCRIPTION_CHARS: usize = 100;
const LABEL_EXCERPT_CHARS: usize = 30;

const STARTUP_KEYWORDS: &[&str] = &[
    "startup",
    "company",
    "business",
    "venture",
    "enterprise",
    "platform",
    "app",
    "application",
    "service",
];

const FEATURE_KEYWORDS: &[&str] = &[
    "feature",
    "functionality",
    "capability",
    "tool",
    "system",
    "integration",
    "api",
    "dashboard",
    "analytics",
];

const MARKET_KEYWORDS: &[&str] = &[
    "market", "industry", "sector", "niche", "audience", "customer", "user", "demand",
];

const CONCEPT_KEYWORDS: &[&str] = &[
    "idea",
    "concept",
    "solution",
    "problem",
    "opportunity",
    "strategy",
    "approach",
    "method",
    "model",
];

/// Extract candidate entities from transcript text
///
/// Pure and deterministic: the same text always yields the same entities in
/// the same order.
///
/// # Example
/// ```
/// use nexfluc_live::extractors::extract;
/// use nexfluc_live::types::EntityKind;
///
/// let entities = extract("Our startup Acme builds a feature for market analytics.");
/// assert!(entities.iter().any(|e| e.label == "Acme" && e.kind == EntityKind::Startup));
/// assert!(extract("too short").is_empty());
/// ```
pub fn extract(text: &str) -> Vec<Entity> {
    if text.trim().chars().count() < MIN_INPUT_CHARS {
        return Vec::new();
    }

    let mut candidates = Vec::new();

    for sentence in split_sentences(text) {
        extract_from_sentence(sentence, &mut candidates);
    }

    for phrase in key_phrases(text) {
        if phrase.chars().count() < MAX_PHRASE_CHARS {
            let kind = phrase_kind(&phrase);
            candidates.push(Entity::new(phrase, kind, PHRASE_WEIGHT, None));
        }
    }

    dedup_capped(candidates)
}

fn split_sentences(text: &str) -> impl Iterator<Item = &str> {
    text.split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| s.chars().count() > MIN_SENTENCE_CHARS)
}

/// Lowercase whitespace tokens with punctuation trimmed from both edges
fn tokens(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

fn mentions_any(words: &HashSet<String>, keywords: &[&str]) -> bool {
    keywords.iter().any(|kw| words.contains(*kw))
}

fn extract_from_sentence(sentence: &str, out: &mut Vec<Entity>) {
    let words: HashSet<String> = tokens(sentence).into_iter().collect();

    if mentions_any(&words, STARTUP_KEYWORDS) {
        let description = truncate_chars(sentence, STARTUP_DESCRIPTION_CHARS);
        for name in capitalized_words(sentence).filter(|w| w.len() > 3) {
            out.push(Entity::new(
                name,
                EntityKind::Startup,
                EntityKind::Startup.default_weight(),
                Some(description.to_string()),
            ));
        }
    }

    let labelled = [
        (FEATURE_KEYWORDS, EntityKind::Feature, "Feature"),
        (MARKET_KEYWORDS, EntityKind::Market, "Market"),
        (CONCEPT_KEYWORDS, EntityKind::Concept, "Concept"),
    ];

    for (keywords, kind, prefix) in labelled {
        if mentions_any(&words, keywords) {
            let excerpt = truncate_chars(sentence, LABEL_EXCERPT_CHARS).trim_end();
            out.push(Entity::new(
                format!("{}: {}", prefix, excerpt),
                kind,
                kind.default_weight(),
                Some(sentence.to_string()),
            ));
        }
    }
}

/// Words shaped like a proper name: one ASCII capital followed by lowercase letters
fn capitalized_words(sentence: &str) -> impl Iterator<Item = &str> {
    sentence
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|w| {
            let mut chars = w.chars();
            matches!(chars.next(), Some(first) if first.is_ascii_uppercase())
                && w.len() > 1
                && chars.all(|c| c.is_ascii_lowercase())
        })
}

/// First 2-grams then 3-grams of the whole text, unique, at most `MAX_PHRASES`
fn key_phrases(text: &str) -> Vec<String> {
    let words = tokens(text);
    let mut phrases: Vec<String> = Vec::new();

    let bigrams = words
        .windows(2)
        .map(|w| w.join(" "))
        .filter(|p| p.chars().count() > MIN_BIGRAM_CHARS);
    let trigrams = words
        .windows(3)
        .map(|w| w.join(" "))
        .filter(|p| p.chars().count() > MIN_TRIGRAM_CHARS);

    for phrase in bigrams.chain(trigrams) {
        if phrases.len() == MAX_PHRASES {
            break;
        }
        if !phrases.contains(&phrase) {
            phrases.push(phrase);
        }
    }

    phrases
}

fn phrase_kind(phrase: &str) -> EntityKind {
    let contains_any = |needles: &[&str]| needles.iter().any(|n| phrase.contains(n));

    if contains_any(&["startup", "company", "business"]) {
        EntityKind::Startup
    } else if contains_any(&["feature", "tool", "function"]) {
        EntityKind::Feature
    } else if contains_any(&["market", "industry", "customer"]) {
        EntityKind::Market
    } else {
        EntityKind::Concept
    }
}

fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn dedup_capped(candidates: Vec<Entity>) -> Vec<Entity> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|e| !e.id.is_empty() && seen.insert(e.id.clone()))
        .take(MAX_ENTITIES)
        .collect()
}
