use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use super::company::{CompanyIdentity, CompetitorCandidate, IndustryLabel, ResolutionSource};
use super::ir::IrFact;
use super::validation::ValidationFinding;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    pub total: u8,
    /// Keyed by metric name; mirrors the five ratios below
    pub sub_scores: BTreeMap<String, f64>,
    pub factual_basis_ratio: f64,
    pub ir_coverage_ratio: f64,
    pub business_logic_consistency: f64,
    pub speculation_disclosure_rate: f64,
    pub citation_rate: f64,
    /// Set when the no-evidence cap lowered the weighted total
    pub capped: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaveatKind {
    EvidenceUnavailable,
    ExtractionDegraded,
    ValidationBlocked,
    UnsupportedFigure,
    SynthesisDegraded,
    NarrativeCorrected,
}

/// A non-fatal condition disclosed to the reader of the report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Caveat {
    pub kind: CaveatKind,
    pub detail: String,
}

impl Caveat {
    pub fn new(kind: CaveatKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseName {
    Identity,
    Extraction,
    Validation,
    Synthesis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseState {
    Pending,
    Running,
    Validated,
    Retrying,
    Degraded,
    Failed,
}

/// Final state of one phase, as recorded in the report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub phase: PhaseName,
    pub state: PhaseState,
    pub retries_used: u8,
    pub retry_budget: u8,
    pub notes: Vec<String>,
}

impl PhaseRecord {
    pub fn retries_remaining(&self) -> u8 {
        self.retry_budget.saturating_sub(self.retries_used)
    }
}

/// The five EVP dimensions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvpSections {
    pub rewards: String,
    pub opportunity: String,
    pub organization: String,
    pub people: String,
    pub work: String,
}

/// The four business-analysis dimensions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BusinessSections {
    pub industry_market: String,
    pub market_position: String,
    pub differentiation: String,
    pub business_portfolio: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndustryClassification {
    pub label: IndustryLabel,
    pub confidence: f64,
    pub resolution_source: ResolutionSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub focus_area: String,
    pub homepage_url: Option<Url>,
    pub company: CompanyIdentity,
    pub industry: IndustryClassification,
    pub evp: EvpSections,
    pub business_analysis: BusinessSections,
    pub competitors: Vec<CompetitorCandidate>,
    pub ir_facts: Vec<IrFact>,
    pub findings: Vec<ValidationFinding>,
    pub quality_score: QualityScore,
    pub caveats: Vec<Caveat>,
    pub phases: Vec<PhaseRecord>,
    pub evidence_sources: Vec<Url>,
}

impl AnalysisReport {
    pub fn phase(&self, phase: PhaseName) -> Option<&PhaseRecord> {
        self.phases.iter().find(|p| p.phase == phase)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
