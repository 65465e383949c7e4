//! Caller-facing pipeline failures

use thiserror::Error;

use super::state::TransitionError;

/// Fatal outcomes of a run. Non-fatal conditions are reported as caveats.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PipelineError {
    #[error("Company identity could not be resolved: {0}")]
    IdentityUnresolved(String),

    #[error("Language model provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Report synthesis incomplete: {0}")]
    SynthesisIncomplete(String),

    #[error("Analysis cancelled")]
    Cancelled,

    #[error("Internal phase state error: {0}")]
    State(#[from] TransitionError),
}

impl PipelineError {
    /// Stable machine-readable code
    pub fn reason_code(&self) -> &'static str {
        match self {
            PipelineError::IdentityUnresolved(_) => "identity_unresolved",
            PipelineError::ProviderUnavailable(_) => "provider_unavailable",
            PipelineError::SynthesisIncomplete(_) => "synthesis_incomplete",
            PipelineError::Cancelled => "cancelled",
            PipelineError::State(_) => "internal_state",
        }
    }
}
