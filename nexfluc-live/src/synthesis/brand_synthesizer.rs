//! Brand identity synthesis
//!
//! Competitor and design-trend research through the search chain, then a
//! brand request through the language model chain. Missing reply fields fall
//! back to the built-in default brand.

use super::json_recovery::recover;
use super::truncate_chars;
use crate::providers::{
    CompletionRequest, LanguageModelChain, SearchChain, SearchDepth, SearchRequest,
};
use crate::types::{BrandIdentity, ColorSwatch, InsightRecord};
use serde::Deserialize;
use tracing::{debug, info, warn};

const COMPETITOR_NAMES: usize = 3;
const COMPETITOR_CONTENT_MAX_CHARS: usize = 800;
const QUERY_CONTEXT_MAX_CHARS: usize = 200;

const SYSTEM_PROMPT: &str = "You are a brand strategist for early-stage startups. \
Return ONLY valid JSON, no other text, with this shape: \
{\"name\": [string], \"tagline\": [string], \
\"colorPalette\": [{\"name\": string, \"hex\": \"#RRGGBB\"}], \"designRationale\": string}.";

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct BrandReply {
    name: Option<Vec<String>>,
    tagline: Option<Vec<String>>,
    color_palette: Option<Vec<ColorSwatch>>,
    design_rationale: Option<String>,
}

impl BrandReply {
    /// Fill absent or empty fields from the default brand
    fn into_identity(self) -> BrandIdentity {
        let fallback = BrandIdentity::default();
        let non_empty = |v: Option<Vec<String>>| {
            v.map(|items| {
                items
                    .into_iter()
                    .filter(|s| !s.trim().is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|items| !items.is_empty())
        };

        BrandIdentity {
            name: non_empty(self.name).unwrap_or(fallback.name),
            tagline: non_empty(self.tagline).unwrap_or(fallback.tagline),
            color_palette: self
                .color_palette
                .map(|p| p.into_iter().filter(|c| is_hex_color(&c.hex)).collect::<Vec<_>>())
                .filter(|p| !p.is_empty())
                .unwrap_or(fallback.color_palette),
            design_rationale: self
                .design_rationale
                .filter(|r| !r.trim().is_empty())
                .unwrap_or(fallback.design_rationale),
        }
    }
}

fn is_hex_color(hex: &str) -> bool {
    let digits = match hex.strip_prefix('#') {
        Some(d) => d,
        None => return false,
    };
    matches!(digits.len(), 3 | 6) && digits.chars().all(|c| c.is_ascii_hexdigit())
}

/// Research collected before the brand request
#[derive(Debug, Default, Clone, PartialEq)]
struct BrandResearch {
    competitor_info: Option<String>,
    competitor_content: Option<String>,
    design_trends: Option<String>,
    logo_styles: Option<String>,
}

#[derive(Clone)]
pub struct BrandSynthesizer {
    search: SearchChain,
    models: LanguageModelChain,
}

impl BrandSynthesizer {
    pub fn new(search: SearchChain, models: LanguageModelChain) -> Self {
        Self { search, models }
    }

    /// Generate a brand identity for the idea in `transcript`
    ///
    /// Never fails; falls back to `BrandIdentity::default()`.
    pub async fn synthesize(
        &self,
        transcript: &str,
        insight: Option<&InsightRecord>,
    ) -> BrandIdentity {
        let research = self.research(transcript, insight).await;

        let request = CompletionRequest {
            system_prompt: SYSTEM_PROMPT.to_string(),
            user_prompt: build_user_prompt(transcript, insight, &research),
        };

        match self.models.complete(&request).await {
            Ok(success) => {
                let recovered = recover::<BrandReply>(&success.value.text);
                info!(
                    provider = %success.provider_used,
                    recovery = ?recovered.path,
                    "Brand identity synthesized"
                );
                recovered.value.into_identity()
            }
            Err(e) => {
                warn!(error = %e, "Language model chain exhausted, using default brand");
                BrandIdentity::default()
            }
        }
    }

    async fn research(&self, transcript: &str, insight: Option<&InsightRecord>) -> BrandResearch {
        let mut research = BrandResearch::default();

        let competitors: Vec<&str> = insight
            .map(|i| {
                i.similar_items
                    .iter()
                    .map(|s| s.name.as_str())
                    .filter(|n| !n.trim().is_empty())
                    .take(COMPETITOR_NAMES)
                    .collect()
            })
            .unwrap_or_default();

        if competitors.is_empty() {
            debug!("No similar items known, skipping competitor research");
        } else {
            let query = format!(
                "{} brand identity logo color palette design style",
                competitors.join(", ")
            );
            if let Some(response) = self.lookup(query, SearchDepth::Advanced, 5).await {
                research.competitor_info = response.answer.filter(|a| !a.trim().is_empty());
                let joined = response
                    .results
                    .iter()
                    .map(|r| r.content.as_str())
                    .collect::<Vec<_>>()
                    .join("\n");
                if !joined.trim().is_empty() {
                    research.competitor_content =
                        Some(truncate_chars(&joined, COMPETITOR_CONTENT_MAX_CHARS).to_string());
                }
            }
        }

        let context = insight
            .map(|i| i.summary.as_str())
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(transcript);
        let context = truncate_chars(context.trim(), QUERY_CONTEXT_MAX_CHARS);

        let trend_query = format!(
            "startup logo design trends {} color schemes visual identity",
            context
        );
        research.design_trends = self
            .lookup(trend_query, SearchDepth::Advanced, 5)
            .await
            .and_then(|r| r.answer);

        let logo_query = format!(
            "modern startup logo design patterns {} minimalist geometric abstract",
            context
        );
        research.logo_styles = self
            .lookup(logo_query, SearchDepth::Basic, 3)
            .await
            .and_then(|r| r.answer);

        research
    }

    async fn lookup(
        &self,
        query: String,
        depth: SearchDepth,
        max_results: u32,
    ) -> Option<crate::providers::SearchResponse> {
        let request = SearchRequest::new(query, depth, max_results);
        match self.search.search(&request).await {
            Ok(success) => Some(success.value),
            Err(e) => {
                debug!(error = %e, "Brand research lookup failed");
                None
            }
        }
    }
}

fn build_user_prompt(
    transcript: &str,
    insight: Option<&InsightRecord>,
    research: &BrandResearch,
) -> String {
    let idea = if !transcript.trim().is_empty() {
        transcript.trim()
    } else {
        insight
            .map(|i| i.summary.as_str())
            .filter(|s| !s.trim().is_empty())
            .unwrap_or("A new innovative startup")
    };

    let mut prompt = format!("Based on this startup idea: \"{}\"\n", idea);

    if let Some(insight) = insight {
        if !insight.similar_items.is_empty() {
            prompt.push_str("\n=== COMPETITOR STARTUPS ===\n");
            for item in &insight.similar_items {
                prompt.push_str(&format!(
                    "- {} ({}% similar): {}\n  Tags: {}\n",
                    item.name,
                    (item.similarity * 100.0).round() as u32,
                    item.description,
                    item.tags.join(", ")
                ));
            }
        }
        if !insight.differentiation.is_empty() {
            prompt.push_str("\n=== DIFFERENTIATION STRATEGIES ===\n");
            for (i, strategy) in insight.differentiation.iter().enumerate() {
                prompt.push_str(&format!("{}. {}\n", i + 1, strategy));
            }
        }
    }

    let sections = [
        ("COMPETITOR ANALYSIS", &research.competitor_info),
        ("COMPETITOR COLOR SCHEMES", &research.competitor_content),
        ("COMPETITOR LOGO STYLES", &research.logo_styles),
        ("DESIGN TRENDS", &research.design_trends),
    ];
    for (title, body) in sections {
        if let Some(body) = body {
            prompt.push_str(&format!("\n=== {} ===\n{}\n", title, body));
        }
    }

    prompt.push_str(
        "\nGenerate a brand identity that reflects the differentiation strategies: \
         2-3 name options, 1-2 taglines, a 3-5 color palette distinct from competitors, \
         and a design rationale.",
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::{model_chain, search_chain, MockModel, MockSearch};
    use crate::types::SimilarItem;

    fn insight() -> InsightRecord {
        InsightRecord {
            epoch: 3,
            summary: "Analytics for small shops".to_string(),
            differentiation: vec!["Cheaper".to_string()],
            similar_items: vec![SimilarItem {
                name: "Shopify".to_string(),
                similarity: 0.8,
                description: "commerce".to_string(),
                tags: vec!["retail".to_string()],
            }],
            research_notes: None,
        }
    }

    #[tokio::test]
    async fn test_reply_is_used() {
        let model = MockModel::replying(
            "model",
            r##"Sure! {"name":["Lumen"],"tagline":["See more"],
                "colorPalette":[{"name":"Primary","hex":"#112233"}],
                "designRationale":"Calm"}"##,
        );
        let synth = BrandSynthesizer::new(
            search_chain(vec![MockSearch::answering("s", "trend")]),
            model_chain(vec![model]),
        );

        let brand = synth.synthesize("idea text", Some(&insight())).await;
        assert_eq!(brand.name, vec!["Lumen"]);
        assert_eq!(brand.color_palette[0].hex, "#112233");
        assert_eq!(brand.design_rationale, "Calm");
    }

    #[tokio::test]
    async fn test_missing_fields_use_defaults() {
        let model = MockModel::replying(
            "model",
            r##"{"name":["Lumen"],"colorPalette":[{"name":"Bad","hex":"blue"}]}"##,
        );
        let synth = BrandSynthesizer::new(
            search_chain(vec![MockSearch::failing("s")]),
            model_chain(vec![model]),
        );

        let brand = synth.synthesize("idea text", None).await;
        let fallback = BrandIdentity::default();
        assert_eq!(brand.name, vec!["Lumen"]);
        assert_eq!(brand.tagline, fallback.tagline);
        assert_eq!(brand.color_palette, fallback.color_palette);
    }

    #[tokio::test]
    async fn test_exhausted_chain_returns_default_brand() {
        let synth = BrandSynthesizer::new(
            search_chain(vec![]),
            model_chain(vec![MockModel::failing("m")]),
        );
        assert_eq!(
            synth.synthesize("idea text", None).await,
            BrandIdentity::default()
        );
    }

    #[tokio::test]
    async fn test_competitor_research_only_with_similar_items() {
        let search = MockSearch::answering("s", "answer");
        let synth = BrandSynthesizer::new(
            search_chain(vec![search.clone()]),
            model_chain(vec![MockModel::failing("m")]),
        );

        synth.synthesize("idea text", None).await;
        assert_eq!(search.call_count(), 2);

        synth.synthesize("idea text", Some(&insight())).await;
        assert_eq!(search.call_count(), 5);
    }

    #[test]
    fn test_prompt_lists_competitors() {
        let prompt = build_user_prompt("", Some(&insight()), &BrandResearch::default());
        assert!(prompt.contains("\"Analytics for small shops\""));
        assert!(prompt.contains("Shopify (80% similar)"));
        assert!(prompt.contains("1. Cheaper"));
    }

    #[test]
    fn test_hex_validation() {
        assert!(is_hex_color("#FF7A1A"));
        assert!(is_hex_color("#abc"));
        assert!(!is_hex_color("FF7A1A"));
        assert!(!is_hex_color("#GG0000"));
    }
}
