//! Investor-relations page collector
//!
//! Probes the conventional IR locations of a company domain and keeps the
//! first page that answers.

use reqwest::Client;
use scraper::{Html, Selector};
use url::Url;

use super::{RetrieverError, SearchHit, USER_AGENT, extract_domain, html_to_markdown, truncate_chars};

/// Characters of normalized page content kept as evidence
const MAX_CONTENT_CHARS: usize = 2000;

pub struct IrPageCollector {
    client: Client,
}

impl IrPageCollector {
    pub fn new(timeout: std::time::Duration) -> Self {
        Self {
            client: Client::builder()
                .user_agent(USER_AGENT)
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    /// Candidate IR URLs for a domain, in probe order
    pub fn candidate_urls(domain: &str) -> Vec<Url> {
        [
            format!("https://{}/ir/", domain),
            format!("https://{}/investor/", domain),
            format!("https://ir.{}/", domain),
        ]
        .iter()
        .filter_map(|u| Url::parse(u).ok())
        .collect()
    }

    /// Collect the first reachable IR page for a homepage URL.
    ///
    /// Unreachable candidates are skipped; an empty result is not an error.
    pub async fn collect(&self, homepage: &str) -> Vec<SearchHit> {
        let Some(domain) = extract_domain(homepage) else {
            tracing::debug!(homepage = %homepage, "No domain in homepage URL, skipping IR pages");
            return Vec::new();
        };

        for url in Self::candidate_urls(&domain) {
            tracing::debug!(url = %url, "Probing IR page");
            match self.fetch(&url, &domain).await {
                Ok(hit) => {
                    tracing::info!(url = %url, "Collected IR page");
                    return vec![hit];
                }
                Err(e) => {
                    tracing::debug!(url = %url, error = %e, "IR page unavailable");
                }
            }
        }

        Vec::new()
    }

    async fn fetch(&self, url: &Url, domain: &str) -> Result<SearchHit, RetrieverError> {
        let response = self.client.get(url.as_str()).send().await?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(RetrieverError::RateLimited);
        }
        if !response.status().is_success() {
            return Err(RetrieverError::NotFound(format!(
                "HTTP {}: {}",
                response.status(),
                url
            )));
        }

        let html = response.text().await?;
        Ok(parse_ir_page(url, domain, &html))
    }
}

/// Turn an IR page into a hit: `<title>` (or a domain-based fallback) and the
/// leading part of the markdown-normalized body
fn parse_ir_page(url: &Url, domain: &str, html: &str) -> SearchHit {
    let document = Html::parse_document(html);
    let title = Selector::parse("title")
        .ok()
        .and_then(|selector| {
            document
                .select(&selector)
                .next()
                .map(|el| el.text().collect::<String>().trim().to_string())
        })
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| format!("IR information - {}", domain));

    let markdown = html_to_markdown(html);
    SearchHit {
        url: url.clone(),
        title: Some(title),
        text: truncate_chars(markdown.trim(), MAX_CONTENT_CHARS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_urls_order() {
        let urls = IrPageCollector::candidate_urls("example.co.jp");
        let urls: Vec<&str> = urls.iter().map(|u| u.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://example.co.jp/ir/",
                "https://example.co.jp/investor/",
                "https://ir.example.co.jp/",
            ]
        );
    }

    #[test]
    fn test_parse_ir_page_title_and_fallback() {
        let url = Url::parse("https://example.co.jp/ir/").unwrap();
        let html = "<html><head><title> Investor Relations </title></head><body><p>Revenue grew.</p></body></html>";
        let hit = parse_ir_page(&url, "example.co.jp", html);
        assert_eq!(hit.title.as_deref(), Some("Investor Relations"));
        assert!(hit.text.contains("Revenue grew."));

        let untitled = parse_ir_page(&url, "example.co.jp", "<html><body>Hi</body></html>");
        assert_eq!(untitled.title.as_deref(), Some("IR information - example.co.jp"));
    }

    #[tokio::test]
    #[ignore] // Requires network access
    async fn test_collect_live_site() {
        let collector = IrPageCollector::new(std::time::Duration::from_secs(10));
        let hits = collector.collect("https://www.toyota.co.jp").await;
        assert!(hits.len() <= 1);
    }
}
