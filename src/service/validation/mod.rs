//! Consistency validation (Phase 3)
//!
//! A pure function of identity, facts and competitor candidates. It never
//! calls a provider, so re-validating after a retry is cheap and repeatable.

use std::collections::BTreeMap;

use crate::model::config::{PlausibilityConfig, ValidationConfig};
use crate::model::{
    CompanyIdentity, CompetitorCandidate, FindingCategory, IndustryLabel, IrFact,
    ValidationFinding,
};

pub mod contradiction;
pub mod plausibility;

use contradiction::check_contradictions;
use plausibility::check_estimates;

/// Which phase a blocking finding asks to re-run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryTarget {
    Identity,
    Extraction,
}

#[derive(Debug, Clone, Default)]
pub struct ValidationOutcome {
    pub findings: Vec<ValidationFinding>,
    /// Candidates whose label matches the company's
    pub competitors: Vec<CompetitorCandidate>,
    pub dropped: Vec<CompetitorCandidate>,
    pub retry: Option<RetryTarget>,
}

impl ValidationOutcome {
    pub fn has_blocking(&self) -> bool {
        self.findings.iter().any(ValidationFinding::is_blocking)
    }

    pub fn blocking(&self) -> impl Iterator<Item = &ValidationFinding> {
        self.findings.iter().filter(|f| f.is_blocking())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConsistencyValidator {
    validation: ValidationConfig,
    plausibility: PlausibilityConfig,
}

impl ConsistencyValidator {
    pub fn new(validation: ValidationConfig, plausibility: PlausibilityConfig) -> Self {
        Self {
            validation,
            plausibility,
        }
    }

    pub fn validate(
        &self,
        identity: &CompanyIdentity,
        facts: &[IrFact],
        competitors: &[CompetitorCandidate],
    ) -> ValidationOutcome {
        let (mut findings, kept, dropped) = self.check_industry(identity, competitors);
        findings.extend(check_estimates(
            identity.industry_label,
            facts,
            &self.plausibility,
        ));
        findings.extend(check_contradictions(
            facts,
            &self.validation,
            self.plausibility.jpy_per_usd,
        ));

        let retry = self.decide_retry(identity, &findings);

        tracing::info!(
            company = %identity.canonical_name,
            finding_count = findings.len(),
            blocking_count = findings.iter().filter(|f| f.is_blocking()).count(),
            kept_competitors = kept.len(),
            dropped_competitors = dropped.len(),
            retry = ?retry,
            "Consistency validation complete"
        );

        ValidationOutcome {
            findings,
            competitors: kept,
            dropped,
            retry,
        }
    }

    fn is_low_confidence(&self, identity: &CompanyIdentity) -> bool {
        identity.industry_confidence < self.validation.low_confidence_threshold
    }

    /// Every surviving competitor shares the company's label
    fn check_industry(
        &self,
        identity: &CompanyIdentity,
        competitors: &[CompetitorCandidate],
    ) -> (
        Vec<ValidationFinding>,
        Vec<CompetitorCandidate>,
        Vec<CompetitorCandidate>,
    ) {
        let label = identity.industry_label;
        let (kept, dropped): (Vec<_>, Vec<_>) = competitors
            .iter()
            .cloned()
            .partition(|c| c.industry_label == label);

        let mut findings: Vec<ValidationFinding> = dropped
            .iter()
            .map(|c| {
                ValidationFinding::blocking(
                    FindingCategory::CompetitorMismatch,
                    format!(
                        "{} is classified as {}, not {}; removed from competitors",
                        c.name, c.industry_label, label
                    ),
                )
            })
            .collect();

        let mut other_labels: BTreeMap<IndustryLabel, usize> = BTreeMap::new();
        for c in &dropped {
            *other_labels.entry(c.industry_label).or_insert(0) += 1;
        }
        let majority = other_labels
            .iter()
            .find(|(_, n)| **n >= 2 && **n * 2 > competitors.len())
            .map(|(l, _)| *l);

        if let Some(other) = majority {
            findings.push(ValidationFinding::blocking(
                FindingCategory::IndustryMismatch,
                format!(
                    "Most competitor candidates are {} while the company is classified as {}",
                    other, label
                ),
            ));
        } else if !dropped.is_empty() && self.is_low_confidence(identity) {
            findings.push(ValidationFinding::blocking(
                FindingCategory::IndustryMismatch,
                format!(
                    "Industry {} has low confidence ({:.2}) and {} competitor candidate(s) disagree",
                    label,
                    identity.industry_confidence,
                    dropped.len()
                ),
            ));
        }

        (findings, kept, dropped)
    }

    fn decide_retry(
        &self,
        identity: &CompanyIdentity,
        findings: &[ValidationFinding],
    ) -> Option<RetryTarget> {
        let blocking: Vec<&ValidationFinding> = findings.iter().filter(|f| f.is_blocking()).collect();
        if blocking.is_empty() {
            return None;
        }

        let industry = blocking
            .iter()
            .any(|f| f.category == FindingCategory::IndustryMismatch);
        let competitor = blocking
            .iter()
            .any(|f| f.category == FindingCategory::CompetitorMismatch);
        let contradiction = blocking
            .iter()
            .any(|f| f.category == FindingCategory::Contradiction);

        // A competitor mismatch under a confident label is settled by dropping the candidate
        if industry || (competitor && self.is_low_confidence(identity)) {
            Some(RetryTarget::Identity)
        } else if contradiction {
            Some(RetryTarget::Extraction)
        } else {
            None
        }
    }
}

/// Retry hint listing blocking findings, for the re-run prompt
pub fn retry_hint(findings: &[ValidationFinding]) -> String {
    findings
        .iter()
        .filter(|f| f.is_blocking())
        .map(|f| format!("- {}: {}", f.category.as_str(), f.detail))
        .collect::<Vec<_>>()
        .join("\n")
}
