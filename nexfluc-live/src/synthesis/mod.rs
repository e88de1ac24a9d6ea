//! Language-model synthesis
//!
//! - **json_recovery** - Direct / embedded / default reply recovery
//! - **insight_synthesizer** - Research + structured insight record
//! - **brand_synthesizer** - Competitor research + brand identity

pub mod brand_synthesizer;
pub mod insight_synthesizer;
pub mod json_recovery;

pub use brand_synthesizer::BrandSynthesizer;
pub use insight_synthesizer::{parse_insight_reply, InsightSynthesizer};
pub use json_recovery::{first_balanced_object, recover, Recovered, RecoveryPath};

/// Prefix of `s` holding at most `max_chars` characters
pub(crate) fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
