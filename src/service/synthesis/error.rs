//! Error types for report synthesis

use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SynthesisError {
    #[error("Cannot synthesize a report without a resolved company identity")]
    MissingIdentity,
}
