//! Provenance guard and duplicate resolution for extracted facts

use std::collections::{BTreeMap, HashMap};

use crate::model::extraction::{ExtractedFact, ExtractedProvenance};
use crate::model::{Citation, EvidenceSnippet, FactValue, IrFact, IrField, Provenance, Unit};
use crate::service::extraction::grounding::{is_grounded, is_value_stated};

/// Shortest estimation rationale accepted as an explicit rationale
pub const MIN_RATIONALE_CHARS: usize = 10;

/// What the guard did with one proposed fact
#[derive(Debug, Clone, PartialEq)]
pub enum GuardDecision {
    Accepted(IrFact),
    /// Claimed as disclosed but not tied to evidence; kept as an estimate
    Downgraded { fact: IrFact, reason: String },
    Rejected { field: IrField, reason: String },
}

/// Apply provenance rules to one proposed fact.
///
/// - `ir_disclosed` needs a citation id present in `evidence`, an excerpt
///   grounded in the cited snippet, and the value itself written in the
///   excerpt or the snippet.
/// - `estimated` needs an explicit rationale.
/// - Values with neither are rejected outright.
/// - Monetary fields without a monetary unit are rejected, since their
///   magnitude cannot be checked.
/// - `unknown` facts never keep a value.
pub fn guard_fact(
    fact: &ExtractedFact,
    evidence: &HashMap<&str, &EvidenceSnippet>,
) -> GuardDecision {
    let value = fact_value(fact);
    let unit = fact.unit.or_else(|| default_unit(fact.field));
    let rationale = fact
        .estimation_rationale
        .as_deref()
        .map(str::trim)
        .filter(|r| r.chars().count() >= MIN_RATIONALE_CHARS);

    let Some(value) = value else {
        return GuardDecision::Accepted(IrFact::unknown(fact.field));
    };

    if fact.provenance != ExtractedProvenance::Unknown
        && fact.field.is_monetary()
        && !unit.is_some_and(|u| u.is_monetary())
    {
        return GuardDecision::Rejected {
            field: fact.field,
            reason: "monetary figure without a monetary unit".to_string(),
        };
    }

    let estimated = |rationale: &str| IrFact {
        field: fact.field,
        value: Some(value.clone()),
        unit,
        provenance: Provenance::Estimated {
            rationale: rationale.to_string(),
        },
    };

    match fact.provenance {
        ExtractedProvenance::Unknown => GuardDecision::Accepted(IrFact::unknown(fact.field)),
        ExtractedProvenance::IrDisclosed => match verify_citation(fact, &value, evidence) {
            Ok(citation) => GuardDecision::Accepted(IrFact {
                field: fact.field,
                value: Some(value.clone()),
                unit,
                provenance: Provenance::IrDisclosed { citation },
            }),
            Err(reason) => match rationale {
                Some(r) => GuardDecision::Downgraded {
                    fact: estimated(r),
                    reason,
                },
                None => GuardDecision::Rejected {
                    field: fact.field,
                    reason: format!("{} and no estimation rationale", reason),
                },
            },
        },
        ExtractedProvenance::Estimated => match rationale {
            Some(r) => GuardDecision::Accepted(estimated(r)),
            None => GuardDecision::Rejected {
                field: fact.field,
                reason: "estimated value without an explicit rationale".to_string(),
            },
        },
    }
}

fn verify_citation(
    fact: &ExtractedFact,
    value: &FactValue,
    evidence: &HashMap<&str, &EvidenceSnippet>,
) -> Result<Citation, String> {
    let id = fact
        .citation_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| "claimed as disclosed without a citation".to_string())?;

    let snippet = evidence
        .get(id)
        .ok_or_else(|| format!("cited snippet {} is not part of this run's evidence", id))?;

    let excerpt = fact
        .excerpt
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .ok_or_else(|| format!("claimed as disclosed from {} without an excerpt", id))?;

    if !is_grounded(excerpt, &snippet.text) {
        return Err(format!("excerpt not found in cited snippet {}", id));
    }

    let stated = |amount: f64| is_value_stated(amount, excerpt) || is_value_stated(amount, &snippet.text);
    let all_stated = match value {
        FactValue::Amount(a) => stated(*a),
        FactValue::Segments(segments) => segments.iter().all(|s| stated(s.amount)),
    };
    if !all_stated {
        return Err(format!("value does not appear in cited snippet {}", id));
    }

    Ok(Citation {
        snippet_id: snippet.id.clone(),
        source_url: snippet.source_url.clone(),
        excerpt: Some(excerpt.to_string()),
    })
}

/// Segments win for segment_breakdown, amounts elsewhere; non-finite numbers count as absent
fn fact_value(fact: &ExtractedFact) -> Option<FactValue> {
    let segments: Vec<_> = fact
        .segments
        .iter()
        .filter(|s| s.amount.is_finite() && !s.name.trim().is_empty())
        .cloned()
        .collect();
    let amount = fact.amount.filter(|a| a.is_finite());

    match (fact.field, amount) {
        (IrField::SegmentBreakdown, _) if !segments.is_empty() => Some(FactValue::Segments(segments)),
        (IrField::SegmentBreakdown, _) => None,
        (_, Some(a)) => Some(FactValue::Amount(a)),
        (_, None) => None,
    }
}

fn default_unit(field: IrField) -> Option<Unit> {
    match field {
        IrField::Headcount => Some(Unit::Persons),
        IrField::RevenueGrowthRate | IrField::OperatingMargin => Some(Unit::Percent),
        _ => None,
    }
}

/// One fact per field: ir_disclosed > estimated > unknown, later wins on equal rank
pub fn resolve_duplicates(facts: Vec<IrFact>) -> Vec<IrFact> {
    let mut by_field: BTreeMap<IrField, IrFact> = BTreeMap::new();
    for fact in facts {
        match by_field.get(&fact.field) {
            Some(existing) if existing.provenance.rank() > fact.provenance.rank() => {}
            _ => {
                by_field.insert(fact.field, fact);
            }
        }
    }
    by_field.into_values().collect()
}
