//! Tavily search API client
//!
//! POST `{base_url}/search` with the API key in the body.
//! Rate limited per client instance with a token bucket.
//!
//! API Documentation: https://docs.tavily.com/

use super::{Provider, ProviderError, SearchProvider, SearchRequest, SearchResponse};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::Serialize;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.tavily.com";

#[derive(Debug, Serialize)]
struct TavilySearchBody<'a> {
    api_key: &'a str,
    #[serde(flatten)]
    request: &'a SearchRequest,
}

/// Tavily search client
pub struct TavilyClient {
    /// HTTP client with configured timeouts
    client: Client,
    base_url: String,
    api_key: String,
    /// Requests per second, enforced before each call
    rate_limiter: RateLimiter<
        governor::state::direct::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
}

impl TavilyClient {
    /// Create a client
    ///
    /// `requests_per_second` of 0 is treated as 1.
    pub fn new(
        api_key: String,
        timeout: Duration,
        requests_per_second: u32,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| ProviderError::Network(format!("Failed to build HTTP client: {}", e)))?;

        let per_second = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = RateLimiter::direct(Quota::per_second(per_second));

        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
            rate_limiter,
        })
    }

    /// Point the client at a different endpoint (tests, proxies)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn search_url(&self) -> String {
        format!("{}/search", self.base_url)
    }
}

impl Provider for TavilyClient {
    fn name(&self) -> &str {
        "tavily"
    }
}

#[async_trait::async_trait]
impl SearchProvider for TavilyClient {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, ProviderError> {
        if self.api_key.trim().is_empty() {
            return Err(ProviderError::NotConfigured(
                "TAVILY_API_KEY is empty".to_string(),
            ));
        }

        self.rate_limiter.until_ready().await;

        debug!(query = %request.query, depth = ?request.search_depth, "Querying Tavily");

        let response = self
            .client
            .post(self.search_url())
            .json(&TavilySearchBody {
                api_key: &self.api_key,
                request,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(format!("Tavily response: {}", e)))?;

        debug!(
            has_answer = parsed.answer.is_some(),
            results = parsed.results.len(),
            "Tavily search complete"
        );

        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::SearchDepth;

    #[test]
    fn test_base_url_override_strips_trailing_slash() {
        let client = TavilyClient::new("key".to_string(), Duration::from_secs(1), 5)
            .unwrap()
            .with_base_url("http://127.0.0.1:9999/");
        assert_eq!(client.search_url(), "http://127.0.0.1:9999/search");
    }

    #[test]
    fn test_body_flattens_request() {
        let request = SearchRequest::new("acme startup", SearchDepth::Basic, 3);
        let body = serde_json::to_value(TavilySearchBody {
            api_key: "k",
            request: &request,
        })
        .unwrap();

        assert_eq!(body["api_key"], "k");
        assert_eq!(body["query"], "acme startup");
        assert_eq!(body["search_depth"], "basic");
        assert_eq!(body["max_results"], 3);
        assert_eq!(body["include_answer"], true);
    }

    #[tokio::test]
    async fn test_empty_key_is_not_configured() {
        let client = TavilyClient::new("  ".to_string(), Duration::from_secs(1), 0).unwrap();
        let request = SearchRequest::new("q", SearchDepth::Basic, 1);
        assert!(matches!(
            client.search(&request).await,
            Err(ProviderError::NotConfigured(_))
        ));
    }
}
