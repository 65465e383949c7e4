//! Service initialization
//!
//! Builds the analysis pipeline from configuration and environment.

use std::sync::Arc;

use crate::model::Config;
use crate::retriever::{IrPageCollector, SearchProvider, WebSearchClient};
use crate::service::{EvidenceRetriever, LlmClient, Pipeline};

const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";

/// Everything a run needs, built once per process
pub struct AppState {
    pub pipeline: Arc<Pipeline<LlmClient>>,
}

impl AppState {
    /// Initialize the pipeline
    ///
    /// This performs:
    /// 1. LLM client initialization (requires OPENAI_API_KEY)
    /// 2. Search provider initialization (optional; absent means no-evidence mode)
    /// 3. Pipeline construction with the configured policies
    pub fn new(config: Config) -> Result<Self, AppError> {
        let api_key = std::env::var(ENV_OPENAI_API_KEY)
            .map_err(|_| AppError::MissingConfig(ENV_OPENAI_API_KEY))?;

        let llm_client =
            LlmClient::new(&api_key).map_err(|_| AppError::InvalidConfig("Invalid OPENAI_API_KEY"))?;

        let retriever = Self::build_retriever(&config);
        let pipeline = Pipeline::new(Arc::new(llm_client), retriever, &config);

        Ok(Self {
            pipeline: Arc::new(pipeline),
        })
    }

    /// Search-backed retriever, or fallback mode when no key is configured
    fn build_retriever(config: &Config) -> EvidenceRetriever {
        let Some(api_key) = config.search_api_key.clone() else {
            return EvidenceRetriever::new(None, None, config.retrieval.clone());
        };

        match WebSearchClient::new(api_key, config.search_endpoint.clone()) {
            Ok(client) => {
                let provider: Arc<dyn SearchProvider> = Arc::new(client);
                EvidenceRetriever::new(
                    Some(provider),
                    Some(IrPageCollector::new(config.retrieval.timeout())),
                    config.retrieval.clone(),
                )
            }
            Err(e) => {
                tracing::warn!(error = %e, "Search provider unavailable, running without evidence");
                EvidenceRetriever::new(None, None, config.retrieval.clone())
            }
        }
    }
}

/// Application-level errors
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum AppError {
    /// Missing required configuration
    #[error("Missing required configuration: {0}")]
    MissingConfig(&'static str),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

impl AppError {
    pub fn reason_code(&self) -> &'static str {
        match self {
            AppError::MissingConfig(_) | AppError::InvalidConfig(_) => "configuration",
        }
    }
}
