//! Scripted providers for tests

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::model::EvidenceSnippet;
use crate::retriever::{RetrieverError, SearchHit, SearchProvider};
use crate::service::limiter::{BackoffPolicy, ProviderLimiter};
use crate::service::llm::{CompletionRequest, LanguageModel, LlmError, ModelGateway, ModelTask};

/// Search provider answering from substring rules
#[derive(Default)]
pub struct ScriptedSearch {
    rules: Vec<(String, Vec<SearchHit>)>,
    failing: Vec<String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedSearch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queries containing `pattern` (case-insensitive) return these hits
    pub fn with_hits(mut self, pattern: &str, hits: &[(&str, &str)]) -> Self {
        let hits = hits
            .iter()
            .map(|(url, text)| SearchHit {
                url: Url::parse(url).expect("test url"),
                title: None,
                text: text.to_string(),
            })
            .collect();
        self.rules.push((pattern.to_lowercase(), hits));
        self
    }

    /// Queries containing `pattern` fail
    pub fn failing_on(mut self, pattern: &str) -> Self {
        self.failing.push(pattern.to_lowercase());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchProvider for ScriptedSearch {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, RetrieverError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let query = query.to_lowercase();
        if self.failing.iter().any(|p| query.contains(p)) {
            return Err(RetrieverError::ParseError("scripted failure".into()));
        }

        Ok(self
            .rules
            .iter()
            .filter(|(pattern, _)| query.contains(pattern))
            .flat_map(|(_, hits)| hits.iter().cloned())
            .take(max_results)
            .collect())
    }
}

/// Language model replaying queued JSON responses per task.
///
/// The last queued response for a task is repeated once the queue drains.
#[derive(Default)]
pub struct ScriptedModel {
    responses: Mutex<HashMap<ModelTask, VecDeque<Result<serde_json::Value, LlmError>>>>,
    calls: Mutex<HashMap<ModelTask, usize>>,
    prompts: Mutex<Vec<(ModelTask, String)>>,
    delays: HashMap<ModelTask, Duration>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(self, task: ModelTask, value: serde_json::Value) -> Self {
        self.push(task, Ok(value));
        self
    }

    pub fn with_error(self, task: ModelTask, error: LlmError) -> Self {
        self.push(task, Err(error));
        self
    }

    /// Calls for `task` take `delay` before answering
    pub fn with_delay(mut self, task: ModelTask, delay: Duration) -> Self {
        self.delays.insert(task, delay);
        self
    }

    fn push(&self, task: ModelTask, response: Result<serde_json::Value, LlmError>) {
        self.responses
            .lock()
            .unwrap()
            .entry(task)
            .or_default()
            .push_back(response);
    }

    pub fn calls(&self, task: ModelTask) -> usize {
        self.calls.lock().unwrap().get(&task).copied().unwrap_or(0)
    }

    pub fn prompts(&self, task: ModelTask) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| *t == task)
            .map(|(_, p)| p.clone())
            .collect()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn extract<T>(&self, request: CompletionRequest) -> Result<T, LlmError>
    where
        T: JsonSchema + DeserializeOwned + Serialize + Send + Sync + 'static,
    {
        *self.calls.lock().unwrap().entry(request.task).or_default() += 1;
        self.prompts
            .lock()
            .unwrap()
            .push((request.task, request.prompt.clone()));

        if let Some(delay) = self.delays.get(&request.task) {
            tokio::time::sleep(*delay).await;
        }

        let response = {
            let mut responses = self.responses.lock().unwrap();
            let queue = responses.entry(request.task).or_default();
            if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            }
        };

        match response {
            Some(Ok(value)) => serde_json::from_value(value)
                .map_err(|e| LlmError::MalformedOutput(e.to_string())),
            Some(Err(e)) => Err(e),
            None => Err(LlmError::Provider(format!(
                "no scripted response for {}",
                request.task.as_str()
            ))),
        }
    }
}

/// Gateway without backoff delays
pub fn gateway(model: Arc<ScriptedModel>) -> ModelGateway<ScriptedModel> {
    ModelGateway::new(
        model,
        ProviderLimiter::new("llm", 4, BackoffPolicy::new(0, 1)),
        Duration::from_secs(30),
    )
}

pub fn snippet(url: &str, text: &str) -> EvidenceSnippet {
    EvidenceSnippet::new(Url::parse(url).expect("test url"), None, text.to_string())
}
