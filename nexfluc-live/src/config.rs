//! Configuration resolution for nexfluc-live
//!
//! Provider keys resolve with ENV → TOML priority. At least one language
//! model key is required; a missing search key only disables enrichment and
//! research.

use crate::enrichment::EnrichmentFanout;
use crate::graph::{EdgeWeights, GraphPipeline, LayoutConfig};
use crate::providers::gemini_client::GeminiClient;
use crate::providers::openai_client::OpenAiClient;
use crate::providers::tavily_client::TavilyClient;
use crate::providers::{
    LanguageModelChain, LanguageModelProvider, ProviderError, SearchChain, SearchProvider,
};
use crate::synthesis::{BrandSynthesizer, InsightSynthesizer};
use nexfluc_common::config::{write_toml_config, PipelineSettings, TomlConfig};
use nexfluc_common::{Error, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const OPENAI_KEY_ENV: &str = "OPENAI_API_KEY";
pub const GEMINI_KEY_ENV: &str = "GEMINI_API_KEY";
pub const TAVILY_KEY_ENV: &str = "TAVILY_API_KEY";

/// Write a template config holding the compiled defaults if none exists yet
///
/// Best effort: a failed write is logged and startup continues on defaults.
/// Returns whether a file was written.
pub fn write_default_config(toml_path: &Path) -> bool {
    if toml_path.exists() {
        return false;
    }

    match write_toml_config(&TomlConfig::default(), toml_path) {
        Ok(()) => {
            info!("Wrote default config to {}", toml_path.display());
            true
        }
        Err(e) => {
            warn!("Default config write failed, continuing on defaults: {}", e);
            false
        }
    }
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Provider keys after resolution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedKeys {
    pub openai: Option<String>,
    pub gemini: Option<String>,
    pub tavily: Option<String>,
}

/// Resolve one key: environment first, then TOML
fn resolve_key(label: &str, env_var: &str, toml_key: Option<&String>) -> Option<String> {
    let env_key = std::env::var(env_var).ok().filter(|k| is_valid_key(k));
    let toml_key = toml_key.filter(|k| is_valid_key(k)).cloned();

    if env_key.is_some() && toml_key.is_some() {
        warn!(
            "{} API key found in environment and TOML. Using environment (highest priority).",
            label
        );
    }

    if let Some(key) = env_key {
        info!("{} API key loaded from environment variable", label);
        return Some(key);
    }
    if let Some(key) = toml_key {
        info!("{} API key loaded from TOML config", label);
        return Some(key);
    }
    None
}

/// Resolve all provider keys
///
/// Fails with `Error::Config` when no language model key is available.
pub fn resolve_provider_keys(toml_config: &TomlConfig) -> Result<ResolvedKeys> {
    let keys = &toml_config.providers;
    let resolved = ResolvedKeys {
        openai: resolve_key("OpenAI", OPENAI_KEY_ENV, keys.openai_api_key.as_ref()),
        gemini: resolve_key("Gemini", GEMINI_KEY_ENV, keys.gemini_api_key.as_ref()),
        tavily: resolve_key("Tavily", TAVILY_KEY_ENV, keys.tavily_api_key.as_ref()),
    };

    if resolved.openai.is_none() && resolved.gemini.is_none() {
        return Err(Error::Config(format!(
            "No language model API key configured. Please configure using one of:\n\
             1. Environment: {}=... or {}=...\n\
             2. TOML config: ~/.config/nexfluc/nexfluc-live.toml ([providers] openai_api_key = \"...\")",
            OPENAI_KEY_ENV, GEMINI_KEY_ENV
        )));
    }

    if resolved.tavily.is_none() {
        warn!("No search API key configured; enrichment and research are disabled");
    }

    Ok(resolved)
}

fn provider_error(e: ProviderError) -> Error {
    Error::Config(format!("Failed to build provider client: {}", e))
}

/// Provider chains built from resolved keys
#[derive(Clone)]
pub struct ProviderChains {
    pub search: SearchChain,
    pub models: LanguageModelChain,
}

impl ProviderChains {
    /// OpenAI before Gemini; Tavily as the only search provider
    pub fn from_keys(keys: &ResolvedKeys, settings: &PipelineSettings) -> Result<Self> {
        let timeout = Duration::from_millis(settings.provider_timeout_ms);

        let mut search: Vec<Arc<dyn SearchProvider>> = Vec::new();
        if let Some(key) = &keys.tavily {
            let client = TavilyClient::new(key.clone(), timeout, settings.search_requests_per_second)
                .map_err(provider_error)?;
            search.push(Arc::new(client));
        }

        let mut models: Vec<Arc<dyn LanguageModelProvider>> = Vec::new();
        if let Some(key) = &keys.openai {
            models.push(Arc::new(
                OpenAiClient::new(key.clone(), timeout).map_err(provider_error)?,
            ));
        }
        if let Some(key) = &keys.gemini {
            models.push(Arc::new(
                GeminiClient::new(key.clone(), timeout).map_err(provider_error)?,
            ));
        }

        let chains = Self {
            search: SearchChain::new(search, timeout),
            models: LanguageModelChain::new(models, timeout),
        };
        info!(
            search = ?chains.search.provider_names(),
            models = ?chains.models.provider_names(),
            "Provider chains configured"
        );
        Ok(chains)
    }
}

/// Derivation components shared by every session
#[derive(Clone)]
pub struct Pipeline {
    pub graph: Arc<GraphPipeline>,
    pub insight: Arc<InsightSynthesizer>,
    pub brand: Arc<BrandSynthesizer>,
}

impl Pipeline {
    pub fn new(chains: ProviderChains, settings: &PipelineSettings) -> Self {
        let fanout = EnrichmentFanout::new(chains.search.clone(), settings.enrichment_concurrency);
        Self {
            graph: Arc::new(GraphPipeline::new(
                fanout,
                EdgeWeights::from(settings),
                LayoutConfig::from(settings),
            )),
            insight: Arc::new(InsightSynthesizer::new(
                chains.search.clone(),
                chains.models.clone(),
            )),
            brand: Arc::new(BrandSynthesizer::new(chains.search, chains.models)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexfluc_common::config::ProviderKeys;
    use serial_test::serial;

    fn clear_env() {
        for var in [OPENAI_KEY_ENV, GEMINI_KEY_ENV, TAVILY_KEY_ENV] {
            std::env::remove_var(var);
        }
    }

    fn toml_with(keys: ProviderKeys) -> TomlConfig {
        TomlConfig {
            providers: keys,
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("nexfluc-live.toml");

        assert!(write_default_config(&path));
        let written = nexfluc_common::config::load_toml_config(&path).unwrap();
        assert_eq!(written.pipeline.graph_debounce_ms, 1000);
        assert!(written.providers.openai_api_key.is_none());

        std::fs::write(&path, "[logging]\nlevel = \"debug\"\n").unwrap();
        assert!(!write_default_config(&path));
        let kept = std::fs::read_to_string(&path).unwrap();
        assert!(kept.contains("debug"));
    }

    #[test]
    fn test_is_valid_key() {
        assert!(is_valid_key("sk-123"));
        assert!(!is_valid_key(""));
        assert!(!is_valid_key("   "));
    }

    #[test]
    #[serial]
    fn test_env_overrides_toml() {
        clear_env();
        std::env::set_var(OPENAI_KEY_ENV, "env-key");

        let keys = resolve_provider_keys(&toml_with(ProviderKeys {
            openai_api_key: Some("toml-key".to_string()),
            tavily_api_key: Some("toml-tavily".to_string()),
            ..Default::default()
        }))
        .unwrap();

        assert_eq!(keys.openai.as_deref(), Some("env-key"));
        assert_eq!(keys.tavily.as_deref(), Some("toml-tavily"));
        assert!(keys.gemini.is_none());
        clear_env();
    }

    #[test]
    #[serial]
    fn test_missing_model_keys_is_config_error() {
        clear_env();
        std::env::set_var(TAVILY_KEY_ENV, "search-only");

        let result = resolve_provider_keys(&toml_with(ProviderKeys {
            gemini_api_key: Some("  ".to_string()),
            ..Default::default()
        }));

        assert!(matches!(result, Err(Error::Config(_))));
        clear_env();
    }

    #[test]
    fn test_chain_order() {
        let keys = ResolvedKeys {
            openai: Some("a".to_string()),
            gemini: Some("b".to_string()),
            tavily: None,
        };
        let chains = ProviderChains::from_keys(&keys, &PipelineSettings::default()).unwrap();
        assert_eq!(chains.models.provider_names(), vec!["openai", "gemini"]);
        assert!(chains.search.is_empty());
    }
}
