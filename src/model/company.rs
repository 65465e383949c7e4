use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Closed industry taxonomy.
///
/// Industry labels are compared by equality between a company and its
/// competitors, so they are never free text.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum IndustryLabel {
    HrStaffing,
    RealEstate,
    Automotive,
    Electronics,
    Telecommunications,
    InformationTechnology,
    FinancialServices,
    Retail,
    TradingConglomerate,
    Pharmaceuticals,
    Energy,
    MediaEntertainment,
    Construction,
    FoodBeverage,
    Logistics,
    Consulting,
}

impl IndustryLabel {
    pub const ALL: [IndustryLabel; 16] = [
        IndustryLabel::HrStaffing,
        IndustryLabel::RealEstate,
        IndustryLabel::Automotive,
        IndustryLabel::Electronics,
        IndustryLabel::Telecommunications,
        IndustryLabel::InformationTechnology,
        IndustryLabel::FinancialServices,
        IndustryLabel::Retail,
        IndustryLabel::TradingConglomerate,
        IndustryLabel::Pharmaceuticals,
        IndustryLabel::Energy,
        IndustryLabel::MediaEntertainment,
        IndustryLabel::Construction,
        IndustryLabel::FoodBeverage,
        IndustryLabel::Logistics,
        IndustryLabel::Consulting,
    ];

    /// Stable snake_case key, identical to the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            IndustryLabel::HrStaffing => "hr_staffing",
            IndustryLabel::RealEstate => "real_estate",
            IndustryLabel::Automotive => "automotive",
            IndustryLabel::Electronics => "electronics",
            IndustryLabel::Telecommunications => "telecommunications",
            IndustryLabel::InformationTechnology => "information_technology",
            IndustryLabel::FinancialServices => "financial_services",
            IndustryLabel::Retail => "retail",
            IndustryLabel::TradingConglomerate => "trading_conglomerate",
            IndustryLabel::Pharmaceuticals => "pharmaceuticals",
            IndustryLabel::Energy => "energy",
            IndustryLabel::MediaEntertainment => "media_entertainment",
            IndustryLabel::Construction => "construction",
            IndustryLabel::FoodBeverage => "food_beverage",
            IndustryLabel::Logistics => "logistics",
            IndustryLabel::Consulting => "consulting",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.trim().to_lowercase();
        Self::ALL.into_iter().find(|label| label.as_str() == key)
    }
}

impl fmt::Display for IndustryLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    ModelOnly,
    EvidenceBacked,
}

// Canonical identity of the analyzed company
// - industry_label: one entry of the closed taxonomy
// - industry_confidence: 0..=1, forced below the low-confidence threshold for
//   ambiguous names without corroborating evidence
// - ambiguous: the name matched the disambiguation table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyIdentity {
    pub raw_input_name: String,
    pub canonical_name: String,
    pub industry_label: IndustryLabel,
    pub industry_confidence: f64,
    pub resolution_source: ResolutionSource,
    pub ambiguous: bool,
}

impl fmt::Display for CompanyIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.canonical_name, self.industry_label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitorCandidate {
    pub name: String,
    pub industry_label: IndustryLabel,
    pub similarity_rationale: String,
}

impl CompetitorCandidate {
    /// Name key used to merge candidates proposed by different phases
    pub fn name_key(&self) -> String {
        normalize_company_name(&self.name)
    }
}

/// Lowercase, drop punctuation and common corporate suffixes.
pub fn normalize_company_name(name: &str) -> String {
    const SUFFIXES: &[&str] = &[
        "inc",
        "incorporated",
        "corp",
        "corporation",
        "co",
        "ltd",
        "limited",
        "holdings",
        "group",
        "plc",
        "kk",
        "株式会社",
    ];

    let cleaned: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    cleaned
        .split_whitespace()
        .filter(|w| !SUFFIXES.contains(w))
        .collect::<Vec<_>>()
        .join(" ")
}
