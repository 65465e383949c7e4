//! Shared LLM client and interaction utilities
//!
//! `LanguageModel` is the structured-output seam every phase talks to.
//! `LlmClient` implements it with rig's OpenAI extractor; `ModelGateway`
//! adds the per-call timeout and the provider access policy.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::extractor::ExtractionError;
use rig::providers::openai;
use schemars::JsonSchema;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::service::limiter::{ProviderLimiter, RateLimitSignal};

/// Which phase a model call serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelTask {
    Identity,
    Extraction,
    Synthesis,
}

impl ModelTask {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelTask::Identity => "identity",
            ModelTask::Extraction => "extraction",
            ModelTask::Synthesis => "synthesis",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub task: ModelTask,
    pub model: String,
    pub preamble: &'static str,
    pub prompt: String,
}

#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum LlmError {
    #[error("LLM provider error: {0}")]
    Provider(String),

    #[error("LLM provider rate limited: {0}")]
    RateLimited(String),

    #[error("LLM call timed out after {0}s")]
    Timeout(u64),

    #[error("Malformed LLM output: {0}")]
    MalformedOutput(String),
}

impl LlmError {
    /// The provider could not be reached or refused service
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            LlmError::Provider(_) | LlmError::RateLimited(_) | LlmError::Timeout(_)
        )
    }
}

impl RateLimitSignal for LlmError {
    fn is_rate_limited(&self) -> bool {
        matches!(self, LlmError::RateLimited(_))
    }
}

/// Structured-output language model
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn extract<T>(&self, request: CompletionRequest) -> Result<T, LlmError>
    where
        T: JsonSchema + DeserializeOwned + Serialize + Send + Sync + 'static;
}

/// Shared LLM client wrapper
#[derive(Clone)]
pub struct LlmClient {
    client: openai::Client,
}

impl LlmClient {
    /// Create a new LLM client with the provided API key
    pub fn new(api_key: &str) -> Result<Self, String> {
        let client = openai::Client::new(api_key);

        Ok(Self { client })
    }
}

#[async_trait]
impl LanguageModel for LlmClient {
    async fn extract<T>(&self, request: CompletionRequest) -> Result<T, LlmError>
    where
        T: JsonSchema + DeserializeOwned + Serialize + Send + Sync + 'static,
    {
        // temperature=0.0 and a fixed seed keep reruns reproducible
        let extractor = self
            .client
            .extractor::<T>(&request.model)
            .preamble(request.preamble)
            .additional_params(serde_json::json!({
                "temperature": 0.0,
                "seed": 42
            }))
            .build();

        extractor
            .extract(&request.prompt)
            .await
            .map_err(classify_extraction_error)
    }
}

fn classify_extraction_error(error: ExtractionError) -> LlmError {
    let message = error.to_string();
    match error {
        ExtractionError::CompletionError(_) if is_rate_limit_message(&message) => {
            LlmError::RateLimited(message)
        }
        ExtractionError::CompletionError(_) => LlmError::Provider(message),
        _ => LlmError::MalformedOutput(message),
    }
}

fn is_rate_limit_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("429") || lower.contains("rate limit") || lower.contains("rate_limit")
}

/// Model access with timeout, bounded concurrency and rate-limit backoff
pub struct ModelGateway<M> {
    model: Arc<M>,
    limiter: ProviderLimiter,
    timeout: Duration,
}

impl<M> Clone for ModelGateway<M> {
    fn clone(&self) -> Self {
        Self {
            model: Arc::clone(&self.model),
            limiter: self.limiter.clone(),
            timeout: self.timeout,
        }
    }
}

impl<M: LanguageModel> ModelGateway<M> {
    pub fn new(model: Arc<M>, limiter: ProviderLimiter, timeout: Duration) -> Self {
        Self {
            model,
            limiter,
            timeout,
        }
    }

    pub async fn extract<T>(&self, request: CompletionRequest) -> Result<T, LlmError>
    where
        T: JsonSchema + DeserializeOwned + Serialize + Send + Sync + 'static,
    {
        let task = request.task.as_str();
        let model_name = request.model.clone();
        let prompt_length = request.prompt.len();
        let start_time = Instant::now();

        tracing::debug!(
            task = task,
            model = %model_name,
            prompt_length = prompt_length,
            "Initiating LLM call"
        );

        let result = self
            .limiter
            .call(|| {
                let request = request.clone();
                async move {
                    match tokio::time::timeout(self.timeout, self.model.extract::<T>(request)).await
                    {
                        Ok(result) => result,
                        Err(_) => Err(LlmError::Timeout(self.timeout.as_secs())),
                    }
                }
            })
            .await;

        let elapsed = start_time.elapsed();
        match &result {
            Ok(_) => tracing::info!(
                task = task,
                model = %model_name,
                elapsed_ms = elapsed.as_millis(),
                prompt_length = prompt_length,
                "LLM call completed successfully"
            ),
            Err(e) => tracing::error!(
                task = task,
                model = %model_name,
                elapsed_ms = elapsed.as_millis(),
                prompt_length = prompt_length,
                error = %e,
                "LLM call failed"
            ),
        }

        result
    }
}
