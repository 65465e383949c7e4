use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::identity::ExtractedCompetitor;
use crate::model::{IrField, SegmentAmount, Unit};

/// Phase 2 model output
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExtractedFacts {
    pub facts: Vec<ExtractedFact>,
    #[serde(default)]
    pub competitors: Vec<ExtractedCompetitor>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExtractedFact {
    pub field: IrField,
    pub amount: Option<f64>,
    #[serde(default)]
    pub segments: Vec<SegmentAmount>,
    pub unit: Option<Unit>,
    pub provenance: ExtractedProvenance,
    /// Id of the evidence snippet the value was read from
    pub citation_id: Option<String>,
    /// Verbatim text from the cited snippet
    pub excerpt: Option<String>,
    pub estimation_rationale: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExtractedProvenance {
    IrDisclosed,
    Estimated,
    Unknown,
}
