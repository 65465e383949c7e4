//! Cross-field contradiction checks

use crate::model::config::ValidationConfig;
use crate::model::{FindingCategory, IrFact, IrField, Unit, ValidationFinding, format_number};
use crate::service::validation::plausibility::to_usd_million;

/// Blocking findings for mutually inconsistent figures.
///
/// Applies to every fact carrying a value, whatever its provenance.
pub fn check_contradictions(
    facts: &[IrFact],
    config: &ValidationConfig,
    jpy_per_usd: f64,
) -> Vec<ValidationFinding> {
    let find = |field: IrField| facts.iter().find(|f| f.field == field && f.value.is_some());
    let mut findings = Vec::new();

    let Some(revenue) = find(IrField::Revenue) else {
        return findings;
    };
    let Some(revenue_amount) = revenue.value.as_ref().and_then(|v| v.amount()) else {
        return findings;
    };
    if revenue_amount <= 0.0 {
        return findings;
    }

    if let Some(segments) = find(IrField::SegmentBreakdown)
        && let Some(total) = segments.value.as_ref().and_then(|v| v.segment_total())
        && let Some((total, revenue_value)) =
            comparable(total, segments.unit, revenue_amount, revenue.unit, jpy_per_usd)
        && total > revenue_value * (1.0 + config.segment_tolerance)
    {
        findings.push(ValidationFinding::blocking(
            FindingCategory::Contradiction,
            format!(
                "Segment revenues sum to {} but total revenue is {}",
                format_number(total),
                format_number(revenue_value)
            ),
        ));
    }

    let operating = find(IrField::OperatingIncome).and_then(|f| {
        let amount = f.value.as_ref()?.amount()?;
        comparable(amount, f.unit, revenue_amount, revenue.unit, jpy_per_usd)
    });

    if let Some((operating_income, revenue_value)) = operating {
        if operating_income > revenue_value {
            findings.push(ValidationFinding::blocking(
                FindingCategory::Contradiction,
                format!(
                    "Operating income {} exceeds revenue {}",
                    format_number(operating_income),
                    format_number(revenue_value)
                ),
            ));
        }

        if let Some(margin) = find(IrField::OperatingMargin)
            .filter(|f| matches!(f.unit, Some(Unit::Percent) | None))
            .and_then(|f| f.value.as_ref()?.amount())
        {
            let derived = operating_income / revenue_value * 100.0;
            if (margin - derived).abs() > config.margin_tolerance_points {
                findings.push(ValidationFinding::blocking(
                    FindingCategory::Contradiction,
                    format!(
                        "Stated operating margin {}% differs from derived margin {}%",
                        format_number(margin),
                        format_number(derived)
                    ),
                ));
            }
        }
    }

    findings
}

/// Put two amounts on a common scale.
///
/// Both monetary units normalize to USD million; identical units (including
/// both missing) compare as-is; anything else is not comparable.
fn comparable(
    a: f64,
    a_unit: Option<Unit>,
    b: f64,
    b_unit: Option<Unit>,
    jpy_per_usd: f64,
) -> Option<(f64, f64)> {
    if a_unit == b_unit {
        return Some((a, b));
    }
    Some((
        to_usd_million(a, a_unit, jpy_per_usd)?,
        to_usd_million(b, b_unit, jpy_per_usd)?,
    ))
}
