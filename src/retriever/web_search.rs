//! HTTP web search provider (Tavily-compatible JSON API)

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{RetrieverError, SearchHit, SearchProvider, USER_AGENT};

const DEFAULT_ENDPOINT: &str = "https://api.tavily.com/search";

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    url: String,
    title: Option<String>,
    #[serde(default)]
    content: String,
}

/// Search client used when `SEARCH_API_KEY` is configured
pub struct WebSearchClient {
    client: Client,
    endpoint: Url,
    api_key: String,
}

impl WebSearchClient {
    pub fn new(api_key: String, endpoint: Option<Url>) -> Result<Self, RetrieverError> {
        let endpoint = match endpoint {
            Some(url) => url,
            None => Url::parse(DEFAULT_ENDPOINT)
                .map_err(|e| RetrieverError::ParseError(e.to_string()))?,
        };

        let client = Client::builder().user_agent(USER_AGENT).build()?;

        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }
}

#[async_trait]
impl SearchProvider for WebSearchClient {
    fn name(&self) -> &'static str {
        "web_search"
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, RetrieverError> {
        tracing::debug!(query = %query, "Sending web search query");

        let response = self
            .client
            .post(self.endpoint.as_str())
            .json(&SearchRequest {
                api_key: &self.api_key,
                query,
                max_results,
            })
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            tracing::warn!(query = %query, "Search provider rate limited");
            return Err(RetrieverError::RateLimited);
        }

        if !response.status().is_success() {
            return Err(RetrieverError::ParseError(format!(
                "HTTP {}: {}",
                response.status(),
                self.endpoint
            )));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| RetrieverError::ParseError(e.to_string()))?;

        Ok(into_hits(body))
    }
}

/// Keep provider order; drop results with unparseable URLs or no text
fn into_hits(body: SearchResponse) -> Vec<SearchHit> {
    body.results
        .into_iter()
        .filter_map(|r| {
            let url = Url::parse(&r.url).ok()?;
            let text = r.content.trim().to_string();
            if text.is_empty() {
                return None;
            }
            Some(SearchHit {
                url,
                title: r.title,
                text,
            })
        })
        .collect()
}
