//! Error types for identity resolution

use thiserror::Error;

use crate::service::llm::LlmError;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IdentityError {
    #[error("Company name is empty")]
    EmptyName,

    #[error("No industry label could be determined for '{0}'")]
    Unresolved(String),

    #[error("Identity model call failed: {0}")]
    Model(#[from] LlmError),
}

impl IdentityError {
    /// The language model itself could not be reached
    pub fn is_provider_unavailable(&self) -> bool {
        matches!(self, IdentityError::Model(e) if e.is_unavailable())
    }
}
