pub mod company;
pub mod config;
pub mod evidence;
pub mod extraction;
pub mod ir;
pub mod report;
pub mod validation;

pub use company::{
    CompanyIdentity, CompetitorCandidate, IndustryLabel, ResolutionSource, normalize_company_name,
};
pub use config::{Config, ConfigError, RetrieverConfig};
pub use evidence::EvidenceSnippet;
pub use ir::{
    Citation, FactValue, IrFact, IrField, Provenance, SegmentAmount, Unit, format_number,
};
pub use report::{
    AnalysisReport, BusinessSections, Caveat, CaveatKind, EvpSections, IndustryClassification,
    PhaseName, PhaseRecord, PhaseState, QualityScore,
};
pub use validation::{FindingCategory, Severity, ValidationFinding};
