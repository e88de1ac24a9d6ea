//! Insight synthesis
//!
//! Research pass through the search chain, then a structured-output request
//! through the language model chain, then reply recovery. Total: every path
//! ends in an `InsightRecord`.

use super::json_recovery::{recover, RecoveryPath};
use super::truncate_chars;
use crate::providers::{
    CompletionRequest, LanguageModelChain, SearchChain, SearchDepth, SearchRequest,
};
use crate::session::InsightDeriver;
use crate::types::{InsightRecord, SimilarItem};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

const RESEARCH_RESULTS: u32 = 5;
const RESEARCH_NOTES_MAX_CHARS: usize = 1000;
const RESEARCH_QUERY_MAX_CHARS: usize = 350;

const SYSTEM_PROMPT: &str = "You analyze startup ideas discussed in a live conversation. \
Reply with ONLY a JSON object, no other text, with this shape: \
{\"summary\": string, \"differentiation\": [string], \
\"similarItems\": [{\"name\": string, \"similarity\": number between 0 and 1, \
\"description\": string, \"tags\": [string]}]}. \
List 3-5 similar companies or products and 3-5 concrete differentiation strategies.";

/// Language model reply, read field by field
///
/// Only a reply with no JSON object at all falls back to the empty record. Within
/// the object, `startups` is accepted as an alias of `similarItems`, a bare string
/// counts as a one-element list, a numeric string counts as a similarity, and
/// anything that cannot be coerced drops just that field or item.
#[derive(Debug, Default)]
struct InsightReply {
    summary: String,
    differentiation: Vec<String>,
    similar_items: Vec<SimilarItem>,
}

impl InsightReply {
    fn from_object(object: &Map<String, Value>) -> Self {
        let similar_items = object
            .get("similarItems")
            .or_else(|| object.get("startups"))
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(similar_item).collect())
            .unwrap_or_default();

        Self {
            summary: object.get("summary").and_then(text).unwrap_or_default(),
            differentiation: object.get("differentiation").map(text_list).unwrap_or_default(),
            similar_items,
        }
    }

    fn into_record(self, research_notes: Option<String>) -> InsightRecord {
        InsightRecord {
            epoch: 0,
            summary: self.summary,
            differentiation: self.differentiation,
            similar_items: self.similar_items,
            research_notes,
        }
    }
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn text_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(text).collect(),
        Value::String(s) if !s.trim().is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

fn similarity(value: &Value) -> f32 {
    let raw = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    raw.filter(|s| s.is_finite()).unwrap_or(0.0).clamp(0.0, 1.0) as f32
}

/// Items that are not objects are dropped
fn similar_item(value: &Value) -> Option<SimilarItem> {
    let item = value.as_object()?;
    Some(SimilarItem {
        name: item.get("name").and_then(text).unwrap_or_default(),
        similarity: item.get("similarity").map(similarity).unwrap_or(0.0),
        description: item.get("description").and_then(text).unwrap_or_default(),
        tags: item.get("tags").map(text_list).unwrap_or_default(),
    })
}

/// Parse a reply into a record, reporting which recovery step succeeded
pub fn parse_insight_reply(reply: &str, research_notes: Option<String>) -> (InsightRecord, RecoveryPath) {
    let recovered = recover::<Map<String, Value>>(reply);
    let record = InsightReply::from_object(&recovered.value).into_record(research_notes);
    (record, recovered.path)
}

/// Research + language model insight synthesizer
#[derive(Clone)]
pub struct InsightSynthesizer {
    search: SearchChain,
    models: LanguageModelChain,
}

impl InsightSynthesizer {
    pub fn new(search: SearchChain, models: LanguageModelChain) -> Self {
        Self { search, models }
    }

    /// Gather research notes for the text
    ///
    /// Answer if present, else joined result content truncated to 1000 chars.
    /// Any failure yields `None`.
    pub async fn research(&self, text: &str) -> Option<String> {
        let query = format!(
            "startups and products similar to: {}",
            truncate_chars(text.trim(), RESEARCH_QUERY_MAX_CHARS)
        );
        let request = SearchRequest::new(query, SearchDepth::Advanced, RESEARCH_RESULTS);

        match self.search.search(&request).await {
            Ok(success) => {
                let response = success.value;
                let notes = match response.answer.filter(|a| !a.trim().is_empty()) {
                    Some(answer) => answer,
                    None => {
                        let joined = response
                            .results
                            .iter()
                            .map(|r| r.content.as_str())
                            .filter(|c| !c.trim().is_empty())
                            .collect::<Vec<_>>()
                            .join("\n");
                        truncate_chars(&joined, RESEARCH_NOTES_MAX_CHARS).to_string()
                    }
                };
                (!notes.trim().is_empty()).then_some(notes)
            }
            Err(e) => {
                warn!(error = %e, "Insight research failed, continuing without notes");
                None
            }
        }
    }

    /// Synthesize an insight record; the epoch is left at 0 for the caller to stamp
    ///
    /// Research runs only when `prior_research` is not supplied.
    pub async fn synthesize(&self, text: &str, prior_research: Option<String>) -> InsightRecord {
        let research_notes = match prior_research {
            Some(notes) => Some(notes),
            None => self.research(text).await,
        };

        let request = CompletionRequest {
            system_prompt: SYSTEM_PROMPT.to_string(),
            user_prompt: build_user_prompt(text, research_notes.as_deref()),
        };

        match self.models.complete(&request).await {
            Ok(success) => {
                let (record, path) = parse_insight_reply(&success.value.text, research_notes);
                info!(
                    provider = %success.provider_used,
                    recovery = ?path,
                    similar_items = record.similar_items.len(),
                    "Insight synthesized"
                );
                record
            }
            Err(e) => {
                warn!(error = %e, "Language model chain exhausted, using empty insight");
                InsightRecord {
                    research_notes,
                    ..Default::default()
                }
            }
        }
    }
}

fn build_user_prompt(text: &str, research_notes: Option<&str>) -> String {
    let mut prompt = format!("Conversation so far:\n\n{}\n", text.trim());
    if let Some(notes) = research_notes {
        prompt.push_str("\n=== MARKET RESEARCH ===\n");
        prompt.push_str(notes);
        prompt.push('\n');
    }
    prompt.push_str("\nReturn the JSON object now.");
    prompt
}

#[async_trait::async_trait]
impl InsightDeriver for InsightSynthesizer {
    async fn derive_insight(&self, text: &str) -> InsightRecord {
        debug!(chars = text.len(), "Deriving insight");
        self.synthesize(text, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::{model_chain, search_chain, MockModel, MockSearch};

    #[test]
    fn test_reply_embedded_in_prose() {
        let (record, path) = parse_insight_reply(
            "Here is the data: {\"summary\":\"x\",\"differentiation\":[],\"similarItems\":[]} thanks!",
            None,
        );
        assert_eq!(record.summary, "x");
        assert_eq!(path, RecoveryPath::Embedded);
    }

    #[test]
    fn test_startups_alias_and_clamping() {
        let (record, _) = parse_insight_reply(
            r#"{"summary":"s","startups":[
                {"name":"A","similarity":1.7,"description":"d","tags":["t"]},
                {"name":"B","similarity":-0.2},
                {"name":"C"}
            ]}"#,
            None,
        );
        assert_eq!(record.similar_items.len(), 3);
        assert_eq!(record.similar_items[0].similarity, 1.0);
        assert_eq!(record.similar_items[1].similarity, 0.0);
        assert_eq!(record.similar_items[2].similarity, 0.0);
        assert!(record.similar_items[2].tags.is_empty());
        assert!(record.differentiation.is_empty());
    }

    #[test]
    fn test_nulls_default_to_empty() {
        let (record, path) =
            parse_insight_reply(r#"{"summary":null,"differentiation":null}"#, None);
        assert_eq!(path, RecoveryPath::Direct);
        assert_eq!(record.summary, "");
    }

    #[test]
    fn test_numeric_string_similarity_is_coerced() {
        let (record, path) = parse_insight_reply(
            r#"{"summary":"Analytics for shops","differentiation":["cheaper"],
                "similarItems":[{"name":"Mixpanel","similarity":"0.8","description":"d","tags":[]}]}"#,
            None,
        );
        assert_eq!(path, RecoveryPath::Direct);
        assert_eq!(record.summary, "Analytics for shops");
        assert_eq!(record.differentiation, vec!["cheaper".to_string()]);
        assert_eq!(record.similar_items.len(), 1);
        assert!((record.similar_items[0].similarity - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_bare_string_differentiation_becomes_list() {
        let (record, path) = parse_insight_reply(
            r#"{"summary":"s","differentiation":"be cheaper","similarItems":[]}"#,
            None,
        );
        assert_eq!(path, RecoveryPath::Direct);
        assert_eq!(record.summary, "s");
        assert_eq!(record.differentiation, vec!["be cheaper".to_string()]);
    }

    #[test]
    fn test_uncoercible_fields_drop_alone() {
        let (record, _) = parse_insight_reply(
            r#"Sure: {"summary":"kept","differentiation":{"a":1},
                "similarItems":["not an item",{"name":"A","similarity":"high","tags":"b2b"},{"name":"B","similarity":0.5}]}"#,
            None,
        );
        assert_eq!(record.summary, "kept");
        assert!(record.differentiation.is_empty());
        assert_eq!(record.similar_items.len(), 2);
        assert_eq!(record.similar_items[0].name, "A");
        assert_eq!(record.similar_items[0].similarity, 0.0);
        assert_eq!(record.similar_items[0].tags, vec!["b2b".to_string()]);
        assert_eq!(record.similar_items[1].similarity, 0.5);
    }

    #[test]
    fn test_top_level_array_is_not_an_object() {
        let (record, path) = parse_insight_reply(r#"["summary"]"#, None);
        assert_eq!(path, RecoveryPath::Default);
        assert_eq!(record, InsightRecord::default());
    }

    #[test]
    fn test_garbage_is_default_record() {
        let (record, path) = parse_insight_reply("I cannot help with that.", Some("n".into()));
        assert_eq!(path, RecoveryPath::Default);
        assert_eq!(record.summary, "");
        assert_eq!(record.research_notes.as_deref(), Some("n"));
    }

    #[tokio::test]
    async fn test_research_feeds_notes() {
        let search = MockSearch::answering("search", "market is crowded");
        let model = MockModel::replying("model", r#"{"summary":"ok"}"#);
        let synth = InsightSynthesizer::new(search_chain(vec![search.clone()]), model_chain(vec![model]));

        let record = synth.synthesize("a long enough idea description", None).await;
        assert_eq!(record.summary, "ok");
        assert_eq!(record.research_notes.as_deref(), Some("market is crowded"));
        assert_eq!(search.call_count(), 1);
    }

    #[tokio::test]
    async fn test_prior_research_skips_search() {
        let search = MockSearch::answering("search", "unused");
        let model = MockModel::replying("model", r#"{"summary":"ok"}"#);
        let synth = InsightSynthesizer::new(search_chain(vec![search.clone()]), model_chain(vec![model]));

        let record = synth
            .synthesize("a long enough idea description", Some("prior".to_string()))
            .await;
        assert_eq!(record.research_notes.as_deref(), Some("prior"));
        assert_eq!(search.call_count(), 0);
    }

    #[tokio::test]
    async fn test_exhausted_models_yield_empty_record() {
        let synth = InsightSynthesizer::new(
            search_chain(vec![MockSearch::failing("search")]),
            model_chain(vec![MockModel::failing("a"), MockModel::failing("b")]),
        );
        let record = synth.synthesize("a long enough idea description", None).await;
        assert_eq!(record, InsightRecord::default());
    }
}
