//! Order-of-magnitude checks for estimated figures

use crate::model::config::{Band, PlausibilityConfig};
use crate::model::{
    FindingCategory, IndustryLabel, IrFact, IrField, Unit, ValidationFinding, format_number,
};

/// Convert a monetary amount to USD million; `None` for non-monetary or missing units
pub fn to_usd_million(amount: f64, unit: Option<Unit>, jpy_per_usd: f64) -> Option<f64> {
    match unit? {
        Unit::UsdMillion => Some(amount),
        // 1 unit = 100 million JPY = 100 JPY million
        Unit::JpyHundredMillion if jpy_per_usd > 0.0 => Some(amount * 100.0 / jpy_per_usd),
        _ => None,
    }
}

/// Warnings for estimated facts outside the industry band.
///
/// Disclosed and unknown facts are not checked.
pub fn check_estimates(
    label: IndustryLabel,
    facts: &[IrFact],
    config: &PlausibilityConfig,
) -> Vec<ValidationFinding> {
    let band = config.band_for(label);
    let revenue_magnitude = Band::new(-band.revenue_usd_million.max, band.revenue_usd_million.max);

    facts
        .iter()
        .filter(|f| f.provenance.is_estimated())
        .filter_map(|fact| {
            let value = fact.value.as_ref()?;
            let usd = |amount: Option<f64>| {
                amount.and_then(|a| to_usd_million(a, fact.unit, config.jpy_per_usd))
            };
            let (observed, bounds, unit_label) = match fact.field {
                IrField::Revenue => (usd(value.amount()), band.revenue_usd_million, "USD million"),
                IrField::MarketCapitalization => {
                    (usd(value.amount()), band.market_cap_usd_million, "USD million")
                }
                IrField::OperatingIncome | IrField::NetIncome => {
                    (usd(value.amount()), revenue_magnitude, "USD million")
                }
                IrField::SegmentBreakdown => {
                    (usd(value.segment_total()), band.revenue_usd_million, "USD million")
                }
                IrField::Headcount => (value.amount(), band.headcount, "persons"),
                IrField::RevenueGrowthRate => (value.amount(), config.growth_rate_percent, "%"),
                IrField::OperatingMargin => (value.amount(), config.margin_percent, "%"),
            };

            let Some(observed) = observed else {
                return fact.field.is_monetary().then(|| {
                    ValidationFinding::warning(
                        FindingCategory::UnsupportedFigure,
                        format!(
                            "Estimated {} could not be checked against the range for {}: no monetary unit",
                            fact.field, label
                        ),
                    )
                });
            };

            if bounds.contains(observed) {
                return None;
            }

            Some(ValidationFinding::warning(
                FindingCategory::UnsupportedFigure,
                format!(
                    "Estimated {} of {} {} is outside the plausible range {} to {} for {}",
                    fact.field,
                    format_number(observed),
                    unit_label,
                    format_number(bounds.min),
                    format_number(bounds.max),
                    label
                ),
            ))
        })
        .collect()
}
