use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Phase 4 model output
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExtractedNarrative {
    pub evp: ExtractedEvp,
    pub business_analysis: ExtractedBusiness,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExtractedEvp {
    pub rewards: String,
    pub opportunity: String,
    pub organization: String,
    pub people: String,
    pub work: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExtractedBusiness {
    pub industry_market: String,
    pub market_position: String,
    pub differentiation: String,
    pub business_portfolio: String,
}
