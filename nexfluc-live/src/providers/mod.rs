//! External Providers
//!
//! Black-box search and language-model backends behind uniform traits, plus
//! the ordered fallback chain that every caller goes through.
//!
//! # Providers
//! 1. **tavily_client** - Web search (Tavily-compatible), rate limited
//! 2. **openai_client** - Chat completions (primary language model)
//! 3. **gemini_client** - generateContent (secondary language model)
//!
//! # Failure Containment
//! A single provider call may fail in any way (network, non-2xx status,
//! malformed payload, timeout). The chain logs the failure with the provider
//! name and advances. Callers always hold a local fallback value, so a
//! `ChainError` never propagates past them.

pub mod gemini_client;
pub mod openai_client;
pub mod tavily_client;

pub use gemini_client::GeminiClient;
pub use openai_client::OpenAiClient;
pub use tavily_client::TavilyClient;

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

// ============================================================================
// Errors
// ============================================================================

/// A single provider call failed
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Transport failure (connect, DNS, body read)
    #[error("Network error: {0}")]
    Network(String),

    /// Non-2xx response
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Response could not be decoded or failed its schema check
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// Call exceeded the per-call timeout
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Provider lacks credentials or configuration
    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Network(format!("request timed out: {}", err))
        } else if err.is_decode() {
            ProviderError::Malformed(err.to_string())
        } else {
            ProviderError::Network(err.to_string())
        }
    }
}

/// One failed attempt recorded by the chain
#[derive(Debug)]
pub struct ProviderAttempt {
    pub provider: String,
    pub error: ProviderError,
}

/// Every provider in a chain failed (or none were configured)
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("No providers configured")]
    NoProviders,

    #[error("All providers exhausted ({} attempts)", .attempts.len())]
    AllProvidersExhausted { attempts: Vec<ProviderAttempt> },
}

// ============================================================================
// Provider Traits
// ============================================================================

/// Common provider identity
pub trait Provider: Send + Sync {
    /// Provider name for logs and provenance
    fn name(&self) -> &str;
}

/// Schema check applied to every provider result before it is accepted
///
/// HTTP success alone does not make a result usable.
pub trait ValidatedResponse {
    fn validate(&self) -> Result<(), String>;
}

/// Web search backend
#[async_trait::async_trait]
pub trait SearchProvider: Provider {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, ProviderError>;
}

/// Language model backend
#[async_trait::async_trait]
pub trait LanguageModelProvider: Provider {
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError>;
}

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchDepth {
    Basic,
    Advanced,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub search_depth: SearchDepth,
    pub max_results: u32,
    pub include_answer: bool,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, search_depth: SearchDepth, max_results: u32) -> Self {
        Self {
            query: query.into(),
            search_depth,
            max_results,
            include_answer: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub results: Vec<SearchResult>,
}

impl SearchResponse {
    /// Best available text: the answer, else the first non-empty result content
    pub fn best_text(&self) -> Option<&str> {
        self.answer
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .or_else(|| {
                self.results
                    .iter()
                    .map(|r| r.content.trim())
                    .find(|c| !c.is_empty())
            })
    }
}

impl ValidatedResponse for SearchResponse {
    fn validate(&self) -> Result<(), String> {
        let has_answer = self
            .answer
            .as_deref()
            .is_some_and(|a| !a.trim().is_empty());

        if !has_answer && self.results.is_empty() {
            return Err("search response has neither answer nor results".to_string());
        }
        if let Some(idx) = self.results.iter().position(|r| r.url.trim().is_empty()) {
            return Err(format!("search result {} has no url", idx));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_prompt: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub text: String,
}

impl ValidatedResponse for CompletionResponse {
    fn validate(&self) -> Result<(), String> {
        if self.text.trim().is_empty() {
            Err("completion text is empty".to_string())
        } else {
            Ok(())
        }
    }
}

// ============================================================================
// Provider Chain
// ============================================================================

/// Accepted chain result with provenance
#[derive(Debug, Clone)]
pub struct ChainSuccess<T> {
    pub value: T,
    pub provider_used: String,
}

/// Ordered provider fallback chain
///
/// Providers are tried strictly in order; the first result that passes
/// `ValidatedResponse::validate` wins. Every call is bounded by `timeout`.
///
/// # Example
/// ```rust,ignore
/// let chain: ProviderChain<dyn LanguageModelProvider> =
///     ProviderChain::new(vec![openai, gemini], Duration::from_secs(15));
///
/// match chain.complete(&request).await {
///     Ok(success) => use_reply(success.value.text),
///     Err(e) => fall_back_to_default(e),
/// }
/// ```
pub struct ProviderChain<P: ?Sized> {
    providers: Vec<Arc<P>>,
    timeout: Duration,
}

impl<P: ?Sized> Clone for ProviderChain<P> {
    fn clone(&self) -> Self {
        Self {
            providers: self.providers.clone(),
            timeout: self.timeout,
        }
    }
}

impl<P: ?Sized + Provider> ProviderChain<P> {
    pub fn new(providers: Vec<Arc<P>>, timeout: Duration) -> Self {
        Self { providers, timeout }
    }

    /// Chain with no providers; every invocation yields `ChainError::NoProviders`
    pub fn empty(timeout: Duration) -> Self {
        Self::new(Vec::new(), timeout)
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    /// Invoke providers in order until one yields a valid result
    pub async fn invoke<T, F, Fut>(&self, mut call: F) -> Result<ChainSuccess<T>, ChainError>
    where
        T: ValidatedResponse,
        F: FnMut(Arc<P>) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        if self.providers.is_empty() {
            return Err(ChainError::NoProviders);
        }

        let mut attempts = Vec::with_capacity(self.providers.len());

        for provider in &self.providers {
            let name = provider.name().to_string();

            let error = match tokio::time::timeout(self.timeout, call(Arc::clone(provider))).await
            {
                Ok(Ok(value)) => match value.validate() {
                    Ok(()) => {
                        debug!(provider = %name, "Provider returned a valid result");
                        return Ok(ChainSuccess {
                            value,
                            provider_used: name,
                        });
                    }
                    Err(reason) => ProviderError::Malformed(reason),
                },
                Ok(Err(e)) => e,
                Err(_) => ProviderError::Timeout(self.timeout),
            };

            warn!(provider = %name, error = %error, "Provider failed, advancing chain");
            attempts.push(ProviderAttempt {
                provider: name,
                error,
            });
        }

        Err(ChainError::AllProvidersExhausted { attempts })
    }
}

impl ProviderChain<dyn SearchProvider> {
    pub async fn search(
        &self,
        request: &SearchRequest,
    ) -> Result<ChainSuccess<SearchResponse>, ChainError> {
        self.invoke(|provider| async move { provider.search(request).await })
            .await
    }
}

impl ProviderChain<dyn LanguageModelProvider> {
    pub async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<ChainSuccess<CompletionResponse>, ChainError> {
        self.invoke(|provider| async move { provider.complete(request).await })
            .await
    }
}

pub type SearchChain = ProviderChain<dyn SearchProvider>;
pub type LanguageModelChain = ProviderChain<dyn LanguageModelProvider>;

// ============================================================================
// Mock Providers (for testing)
// ============================================================================

/// Scripted providers for unit tests
#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub enum Behavior<T> {
        Succeed(T),
        Fail,
        Hang,
    }

    pub struct MockSearch {
        pub name: String,
        pub behavior: Behavior<SearchResponse>,
        pub calls: AtomicUsize,
    }

    impl MockSearch {
        pub fn new(name: &str, behavior: Behavior<SearchResponse>) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                behavior,
                calls: AtomicUsize::new(0),
            })
        }

        pub fn answering(name: &str, answer: &str) -> Arc<Self> {
            Self::new(
                name,
                Behavior::Succeed(SearchResponse {
                    answer: Some(answer.to_string()),
                    results: vec![
                        SearchResult {
                            title: "First".to_string(),
                            url: "https://example.com/1".to_string(),
                            content: "first content".to_string(),
                        },
                        SearchResult {
                            title: "Second".to_string(),
                            url: "https://example.com/2".to_string(),
                            content: "second content".to_string(),
                        },
                    ],
                }),
            )
        }

        pub fn failing(name: &str) -> Arc<Self> {
            Self::new(name, Behavior::Fail)
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Provider for MockSearch {
        fn name(&self) -> &str {
            &self.name
        }
    }

    #[async_trait::async_trait]
    impl SearchProvider for MockSearch {
        async fn search(&self, _request: &SearchRequest) -> Result<SearchResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behavior {
                Behavior::Succeed(response) => Ok(response.clone()),
                Behavior::Fail => Err(ProviderError::Status {
                    status: 432,
                    body: "quota".to_string(),
                }),
                Behavior::Hang => std::future::pending().await,
            }
        }
    }

    pub struct MockModel {
        pub name: String,
        pub behavior: Behavior<String>,
        pub calls: AtomicUsize,
    }

    impl MockModel {
        pub fn replying(name: &str, text: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                behavior: Behavior::Succeed(text.to_string()),
                calls: AtomicUsize::new(0),
            })
        }

        pub fn failing(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                behavior: Behavior::Fail,
                calls: AtomicUsize::new(0),
            })
        }

        pub fn hanging(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                behavior: Behavior::Hang,
                calls: AtomicUsize::new(0),
            })
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Provider for MockModel {
        fn name(&self) -> &str {
            &self.name
        }
    }

    #[async_trait::async_trait]
    impl LanguageModelProvider for MockModel {
        async fn complete(
            &self,
            _request: &CompletionRequest,
        ) -> Result<CompletionResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behavior {
                Behavior::Succeed(text) => Ok(CompletionResponse { text: text.clone() }),
                Behavior::Fail => Err(ProviderError::Network("connection refused".to_string())),
                Behavior::Hang => std::future::pending().await,
            }
        }
    }

    pub fn search_chain(providers: Vec<Arc<MockSearch>>) -> SearchChain {
        ProviderChain::new(
            providers
                .into_iter()
                .map(|p| p as Arc<dyn SearchProvider>)
                .collect(),
            Duration::from_secs(15),
        )
    }

    pub fn model_chain(providers: Vec<Arc<MockModel>>) -> LanguageModelChain {
        ProviderChain::new(
            providers
                .into_iter()
                .map(|p| p as Arc<dyn LanguageModelProvider>)
                .collect(),
            Duration::from_secs(15),
        )
    }
}
