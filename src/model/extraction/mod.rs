//! LLM-extractable models
//!
//! These are the structured-output shapes requested from the language model.
//! They are converted into domain models only after grounding checks.

pub mod facts;
pub mod identity;
pub mod narrative;

pub use facts::{ExtractedFact, ExtractedFacts, ExtractedProvenance};
pub use identity::{ExtractedCompetitor, ExtractedIdentity};
pub use narrative::{ExtractedBusiness, ExtractedEvp, ExtractedNarrative};
