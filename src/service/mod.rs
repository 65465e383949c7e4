pub mod evidence;
pub mod extraction;
pub mod identity;
pub mod limiter;
pub mod llm;
pub mod pipeline;
pub mod scoring;
pub mod synthesis;
pub mod validation;

#[cfg(test)]
pub(crate) mod testing;

pub use evidence::EvidenceRetriever;
pub use extraction::IrExtractor;
pub use identity::IdentityResolver;
pub use llm::{LanguageModel, LlmClient, ModelGateway};
pub use pipeline::{Pipeline, PipelineError};
pub use scoring::QualityScorer;
pub use synthesis::Synthesizer;
pub use validation::ConsistencyValidator;
