//! Error types for IR extraction

use thiserror::Error;

use crate::service::llm::LlmError;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExtractionError {
    #[error("IR extraction model call failed: {0}")]
    Model(#[from] LlmError),
}
