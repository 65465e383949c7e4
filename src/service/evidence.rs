//! Evidence retrieval with fallback mode
//!
//! Wraps an optional `SearchProvider`. A missing provider, a provider error or
//! a timeout yields an empty snippet list; retrieval never fails a phase.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use crate::model::{EvidenceSnippet, RetrieverConfig};
use crate::retriever::{IrPageCollector, RetrieverError, SearchHit, SearchProvider};
use crate::service::limiter::{BackoffPolicy, ProviderLimiter, RateLimitSignal};

impl RateLimitSignal for RetrieverError {
    fn is_rate_limited(&self) -> bool {
        RetrieverError::is_rate_limited(self)
    }
}

/// Outcome of one query issued through `retrieve_many`
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub query: String,
    pub snippets: Vec<EvidenceSnippet>,
    /// Set when the provider failed or timed out for this query
    pub failure: Option<String>,
}

impl QueryOutcome {
    pub fn failed(&self) -> bool {
        self.failure.is_some()
    }
}

pub struct EvidenceRetriever {
    provider: Option<Arc<dyn SearchProvider>>,
    ir_pages: Option<IrPageCollector>,
    limiter: ProviderLimiter,
    config: RetrieverConfig,
}

impl EvidenceRetriever {
    pub fn new(
        provider: Option<Arc<dyn SearchProvider>>,
        ir_pages: Option<IrPageCollector>,
        config: RetrieverConfig,
    ) -> Self {
        match &provider {
            Some(p) => tracing::info!(provider = p.name(), "Evidence retrieval enabled"),
            None => tracing::info!("No search provider configured, running in no-evidence mode"),
        }
        if !config.allow.is_empty() {
            tracing::info!(allow = ?config.allow, "Evidence whitelist configured");
        }
        if !config.deny.is_empty() {
            tracing::info!(deny = ?config.deny, "Evidence blacklist configured");
        }

        let limiter = ProviderLimiter::new(
            "search",
            config.max_concurrent,
            BackoffPolicy::new(config.max_retries, config.initial_backoff_ms),
        );

        Self {
            provider,
            ir_pages,
            limiter,
            config,
        }
    }

    /// Retriever with no provider at all
    pub fn disabled() -> Self {
        Self::new(None, None, RetrieverConfig::default())
    }

    pub fn is_enabled(&self) -> bool {
        self.provider.is_some()
    }

    pub fn max_results(&self) -> usize {
        self.config.max_results
    }

    /// Retrieve up to `max_results` snippets; empty on any failure
    pub async fn retrieve(&self, query: &str, max_results: usize) -> Vec<EvidenceSnippet> {
        match self.try_retrieve(query, max_results).await {
            Ok(snippets) => snippets,
            Err(RetrieverError::Disabled) => Vec::new(),
            Err(e) => {
                tracing::warn!(query = %query, error = %e, "Evidence retrieval failed, continuing without evidence");
                Vec::new()
            }
        }
    }

    /// Issue queries concurrently and report each outcome separately
    pub async fn retrieve_many(&self, queries: &[String], max_results: usize) -> Vec<QueryOutcome> {
        let futures: Vec<_> = queries
            .iter()
            .map(|query| async move {
                match self.try_retrieve(query, max_results).await {
                    Ok(snippets) => QueryOutcome {
                        query: query.clone(),
                        snippets,
                        failure: None,
                    },
                    Err(RetrieverError::Disabled) => QueryOutcome {
                        query: query.clone(),
                        snippets: Vec::new(),
                        failure: None,
                    },
                    Err(e) => {
                        tracing::warn!(query = %query, error = %e, "Evidence query failed");
                        QueryOutcome {
                            query: query.clone(),
                            snippets: Vec::new(),
                            failure: Some(e.to_string()),
                        }
                    }
                }
            })
            .collect();

        join_all(futures).await
    }

    /// IR pages reachable from the company homepage, when collection is enabled
    pub async fn collect_ir_pages(&self, homepage: &str) -> Vec<EvidenceSnippet> {
        let Some(collector) = &self.ir_pages else {
            return Vec::new();
        };
        let hits = collector.collect(homepage).await;
        self.to_snippets(hits, usize::MAX)
    }

    async fn try_retrieve(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<EvidenceSnippet>, RetrieverError> {
        let provider = self.provider.as_ref().ok_or(RetrieverError::Disabled)?;
        let timeout = self.config.timeout();

        let hits = self
            .limiter
            .call(|| bounded_search(provider.as_ref(), query, max_results, timeout))
            .await?;

        let snippets = self.to_snippets(hits, max_results);
        tracing::debug!(query = %query, snippets = snippets.len(), "Evidence retrieved");
        Ok(snippets)
    }

    /// Filter by domain lists and truncate, keeping provider order
    fn to_snippets(&self, hits: Vec<SearchHit>, max_results: usize) -> Vec<EvidenceSnippet> {
        hits.into_iter()
            .filter(|hit| {
                let allowed = self.config.is_url_allowed(&hit.url);
                if !allowed {
                    tracing::debug!(url = %hit.url, "Evidence URL blocked by configuration");
                }
                allowed
            })
            .take(max_results)
            .map(|hit| EvidenceSnippet::new(hit.url, hit.title, hit.text))
            .collect()
    }
}

async fn bounded_search(
    provider: &dyn SearchProvider,
    query: &str,
    max_results: usize,
    timeout: Duration,
) -> Result<Vec<SearchHit>, RetrieverError> {
    match tokio::time::timeout(timeout, provider.search(query, max_results)).await {
        Ok(result) => result,
        Err(_) => Err(RetrieverError::Timeout(timeout.as_secs())),
    }
}
