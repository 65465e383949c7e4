//! Evidence sources for company research
//!
//! A `SearchProvider` is the consumed search interface. Providers return hits
//! in their own ranking order; nothing here re-ranks them.

mod ir_pages;
mod web_search;

use async_trait::async_trait;
use url::Url;

pub use ir_pages::IrPageCollector;
pub use web_search::WebSearchClient;

const USER_AGENT: &str = "evp-analyst/0.1";

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RetrieverError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Search provider not configured")]
    Disabled,

    #[error("Not found: {0}")]
    NotFound(String),
}

impl RetrieverError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, RetrieverError::RateLimited)
    }
}

/// A single provider result
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub url: Url,
    pub title: Option<String>,
    pub text: String,
}

/// Trait for search/evidence providers
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Run a query, returning hits in provider order
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, RetrieverError>;

    /// Provider name for logs
    fn name(&self) -> &'static str;
}

/// Bare company domain from a homepage URL: scheme optional, `www.` stripped
pub fn extract_domain(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let with_scheme = if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("https://{}", raw)
    };

    let url = Url::parse(&with_scheme).ok()?;
    let host = url.host_str()?.to_lowercase();
    Some(host.strip_prefix("www.").unwrap_or(&host).to_string())
}

/// Convert HTML to Markdown
fn html_to_markdown(html: &str) -> String {
    htmd::convert(html).unwrap_or_else(|_| html.to_string())
}

/// Truncate on a char boundary
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
