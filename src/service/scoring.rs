//! Quality score computation
//!
//! Deterministic: the same identity, facts, findings and narrative labeling
//! always produce the same total.

use std::collections::{BTreeMap, BTreeSet};

use crate::model::config::{BlockingWeights, ScoringConfig, ScoringWeights, ValidationConfig};
use crate::model::{
    CompanyIdentity, FindingCategory, IrFact, IrField, QualityScore, ResolutionSource,
    ValidationFinding,
};

/// The five sub-metrics, each in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ratios {
    pub factual_basis: f64,
    pub ir_coverage: f64,
    pub business_logic: f64,
    pub speculation_disclosure: f64,
    pub citation: f64,
}

#[derive(Debug, Clone)]
pub struct QualityScorer {
    scoring: ScoringConfig,
    blocking_weights: BlockingWeights,
    blocking_baseline: f64,
}

impl Default for QualityScorer {
    fn default() -> Self {
        Self::new(ScoringConfig::default(), &ValidationConfig::default())
    }
}

impl QualityScorer {
    pub fn new(scoring: ScoringConfig, validation: &ValidationConfig) -> Self {
        Self {
            scoring,
            blocking_weights: validation.blocking_weights.clone(),
            blocking_baseline: validation.blocking_baseline,
        }
    }

    /// `labeled_estimates` holds the estimated fields explicitly marked in the narrative
    pub fn score(
        &self,
        identity: &CompanyIdentity,
        facts: &[IrFact],
        findings: &[ValidationFinding],
        labeled_estimates: &BTreeSet<IrField>,
    ) -> QualityScore {
        let ratios = Ratios {
            factual_basis: factual_basis_ratio(facts),
            ir_coverage: ir_coverage_ratio(facts),
            business_logic: self.business_logic_consistency(findings),
            speculation_disclosure: speculation_disclosure_rate(facts, labeled_estimates),
            citation: citation_rate(facts),
        };

        let weighted = weighted_total(&self.scoring.weights, &ratios);
        let evidence_grounded = identity.resolution_source == ResolutionSource::EvidenceBacked
            || facts.iter().any(|f| f.provenance.is_disclosed());
        let capped = !evidence_grounded && weighted > self.scoring.model_only_cap;
        let total = if capped {
            self.scoring.model_only_cap
        } else {
            weighted
        };

        tracing::debug!(
            factual_basis = ratios.factual_basis,
            ir_coverage = ratios.ir_coverage,
            business_logic = ratios.business_logic,
            speculation_disclosure = ratios.speculation_disclosure,
            citation = ratios.citation,
            weighted_total = weighted,
            total = total,
            capped = capped,
            "Computed quality score"
        );

        let sub_scores = BTreeMap::from([
            ("factual_basis_ratio".to_string(), ratios.factual_basis),
            ("ir_coverage_ratio".to_string(), ratios.ir_coverage),
            ("business_logic_consistency".to_string(), ratios.business_logic),
            (
                "speculation_disclosure_rate".to_string(),
                ratios.speculation_disclosure,
            ),
            ("citation_rate".to_string(), ratios.citation),
        ]);

        QualityScore {
            total,
            sub_scores,
            factual_basis_ratio: ratios.factual_basis,
            ir_coverage_ratio: ratios.ir_coverage,
            business_logic_consistency: ratios.business_logic,
            speculation_disclosure_rate: ratios.speculation_disclosure,
            citation_rate: ratios.citation,
            capped,
        }
    }

    /// 1 - (weighted blocking count / baseline), floored at 0
    fn business_logic_consistency(&self, findings: &[ValidationFinding]) -> f64 {
        let weighted: f64 = findings
            .iter()
            .filter(|f| f.is_blocking())
            .map(|f| match f.category {
                FindingCategory::IndustryMismatch => self.blocking_weights.industry_mismatch,
                FindingCategory::CompetitorMismatch => self.blocking_weights.competitor_mismatch,
                FindingCategory::Contradiction => self.blocking_weights.contradiction,
                FindingCategory::UnsupportedFigure => self.blocking_weights.unsupported_figure,
            })
            .sum();

        if weighted <= 0.0 {
            return 1.0;
        }
        if self.blocking_baseline <= 0.0 {
            return 0.0;
        }
        (1.0 - weighted / self.blocking_baseline).clamp(0.0, 1.0)
    }
}

/// round(100 * sum(w_i * r_i)), clamped to [0, 100]
pub fn weighted_total(weights: &ScoringWeights, ratios: &Ratios) -> u8 {
    let sum = weights.factual_basis * ratios.factual_basis
        + weights.ir_coverage * ratios.ir_coverage
        + weights.business_logic * ratios.business_logic
        + weights.speculation_disclosure * ratios.speculation_disclosure
        + weights.citation * ratios.citation;
    (sum * 100.0).round().clamp(0.0, 100.0) as u8
}

pub fn factual_basis_ratio(facts: &[IrFact]) -> f64 {
    if facts.is_empty() {
        return 0.0;
    }
    let disclosed = facts.iter().filter(|f| f.provenance.is_disclosed()).count();
    disclosed as f64 / facts.len() as f64
}

pub fn ir_coverage_ratio(facts: &[IrFact]) -> f64 {
    let covered: BTreeSet<IrField> = facts
        .iter()
        .filter(|f| !f.provenance.is_unknown() && f.value.is_some())
        .map(|f| f.field)
        .collect();
    covered.len() as f64 / IrField::ALL.len() as f64
}

/// 1 when there is nothing to disclose
pub fn speculation_disclosure_rate(facts: &[IrFact], labeled: &BTreeSet<IrField>) -> f64 {
    let estimated: Vec<IrField> = facts
        .iter()
        .filter(|f| f.provenance.is_estimated())
        .map(|f| f.field)
        .collect();
    if estimated.is_empty() {
        return 1.0;
    }
    let disclosed = estimated.iter().filter(|f| labeled.contains(*f)).count();
    disclosed as f64 / estimated.len() as f64
}

/// 1 when there are no disclosed facts
pub fn citation_rate(facts: &[IrFact]) -> f64 {
    let disclosed: Vec<&IrFact> = facts.iter().filter(|f| f.provenance.is_disclosed()).collect();
    if disclosed.is_empty() {
        return 1.0;
    }
    let cited = disclosed
        .iter()
        .filter(|f| f.provenance.citation().is_some())
        .count();
    cited as f64 / disclosed.len() as f64
}
