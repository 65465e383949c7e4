use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::model::IndustryLabel;

/// Phase 1 model output
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExtractedIdentity {
    pub canonical_name: String,
    /// `None` when the company fits no taxonomy entry
    pub industry: Option<IndustryLabel>,
    #[serde(default)]
    pub alternative_industries: Vec<IndustryLabel>,
    /// Self-reported confidence in `industry`, 0.0 to 1.0
    pub confidence: f64,
    #[serde(default)]
    pub competitors: Vec<ExtractedCompetitor>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExtractedCompetitor {
    pub name: String,
    pub industry: IndustryLabel,
    pub rationale: String,
}
