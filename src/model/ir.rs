use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use url::Url;

/// Enumerated financial and business fields extracted in Phase 2
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum IrField {
    Revenue,
    OperatingIncome,
    NetIncome,
    Headcount,
    MarketCapitalization,
    RevenueGrowthRate,
    OperatingMargin,
    SegmentBreakdown,
}

impl IrField {
    pub const ALL: [IrField; 8] = [
        IrField::Revenue,
        IrField::OperatingIncome,
        IrField::NetIncome,
        IrField::Headcount,
        IrField::MarketCapitalization,
        IrField::RevenueGrowthRate,
        IrField::OperatingMargin,
        IrField::SegmentBreakdown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IrField::Revenue => "revenue",
            IrField::OperatingIncome => "operating_income",
            IrField::NetIncome => "net_income",
            IrField::Headcount => "headcount",
            IrField::MarketCapitalization => "market_capitalization",
            IrField::RevenueGrowthRate => "revenue_growth_rate",
            IrField::OperatingMargin => "operating_margin",
            IrField::SegmentBreakdown => "segment_breakdown",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.trim().to_lowercase();
        Self::ALL.into_iter().find(|f| f.as_str() == key)
    }

    /// Fields whose values are amounts of money
    pub fn is_monetary(&self) -> bool {
        matches!(
            self,
            IrField::Revenue
                | IrField::OperatingIncome
                | IrField::NetIncome
                | IrField::MarketCapitalization
                | IrField::SegmentBreakdown
        )
    }

    /// Search phrase used to retrieve disclosure evidence for this field
    pub fn query_phrase(&self) -> &'static str {
        match self {
            IrField::Revenue => "annual revenue net sales",
            IrField::OperatingIncome => "operating income operating profit",
            IrField::NetIncome => "net income profit attributable to owners",
            IrField::Headcount => "number of employees consolidated",
            IrField::MarketCapitalization => "market capitalization",
            IrField::RevenueGrowthRate => "revenue growth year over year",
            IrField::OperatingMargin => "operating margin",
            IrField::SegmentBreakdown => "segment revenue breakdown",
        }
    }
}

impl fmt::Display for IrField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    UsdMillion,
    /// 億円, the customary unit of Japanese IR disclosures
    JpyHundredMillion,
    Persons,
    Percent,
}

impl Unit {
    pub fn is_monetary(&self) -> bool {
        matches!(self, Unit::UsdMillion | Unit::JpyHundredMillion)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Unit::UsdMillion => "USD million",
            Unit::JpyHundredMillion => "hundred million JPY",
            Unit::Persons => "persons",
            Unit::Percent => "%",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SegmentAmount {
    pub name: String,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum FactValue {
    Amount(f64),
    Segments(Vec<SegmentAmount>),
}

impl FactValue {
    pub fn amount(&self) -> Option<f64> {
        match self {
            FactValue::Amount(v) => Some(*v),
            FactValue::Segments(_) => None,
        }
    }

    pub fn segment_total(&self) -> Option<f64> {
        match self {
            FactValue::Segments(segments) if !segments.is_empty() => {
                Some(segments.iter().map(|s| s.amount).sum())
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub snippet_id: String,
    pub source_url: Url,
    pub excerpt: Option<String>,
}

/// How a fact was obtained.
///
/// A citation exists only for disclosed facts and an estimation rationale only
/// for estimated ones; unknown facts carry neither.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provenance", rename_all = "snake_case")]
pub enum Provenance {
    IrDisclosed { citation: Citation },
    Estimated { rationale: String },
    Unknown,
}

impl Provenance {
    /// Rank used to resolve duplicate fields (higher wins)
    pub fn rank(&self) -> u8 {
        match self {
            Provenance::IrDisclosed { .. } => 3,
            Provenance::Estimated { .. } => 2,
            Provenance::Unknown => 1,
        }
    }

    pub fn is_disclosed(&self) -> bool {
        matches!(self, Provenance::IrDisclosed { .. })
    }

    pub fn is_estimated(&self) -> bool {
        matches!(self, Provenance::Estimated { .. })
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Provenance::Unknown)
    }

    pub fn citation(&self) -> Option<&Citation> {
        match self {
            Provenance::IrDisclosed { citation } => Some(citation),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrFact {
    pub field: IrField,
    pub value: Option<FactValue>,
    pub unit: Option<Unit>,
    #[serde(flatten)]
    pub provenance: Provenance,
}

impl IrFact {
    pub fn unknown(field: IrField) -> Self {
        Self {
            field,
            value: None,
            unit: None,
            provenance: Provenance::Unknown,
        }
    }

    /// Human-readable value with unit, `None` for unknown facts
    pub fn display_value(&self) -> Option<String> {
        let unit = self.unit.map(|u| u.label()).unwrap_or("");
        match self.value.as_ref()? {
            FactValue::Amount(v) => Some(format!("{} {}", format_number(*v), unit).trim().to_string()),
            FactValue::Segments(segments) => Some(
                segments
                    .iter()
                    .map(|s| format!("{}: {} {}", s.name, format_number(s.amount), unit).trim().to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
        }
    }
}

/// Group thousands and drop trailing zero decimals: 12345.5 -> "12,345.5"
pub fn format_number(value: f64) -> String {
    let negative = value < 0.0;
    let rounded = (value.abs() * 10.0).round() / 10.0;
    let integer = rounded.trunc() as u64;
    let fraction = ((rounded - rounded.trunc()) * 10.0).round() as u64;

    let digits = integer.to_string();
    let mut grouped = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    let mut out = if negative { format!("-{}", grouped) } else { grouped };
    if fraction > 0 {
        out.push_str(&format!(".{}", fraction));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provenance_rank_order() {
        let citation = Citation {
            snippet_id: "ev-1".into(),
            source_url: Url::parse("https://example.com").unwrap(),
            excerpt: None,
        };
        let disclosed = Provenance::IrDisclosed { citation };
        let estimated = Provenance::Estimated {
            rationale: "peer average".into(),
        };
        assert!(disclosed.rank() > estimated.rank());
        assert!(estimated.rank() > Provenance::Unknown.rank());
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0.0), "0");
        assert_eq!(format_number(1234.0), "1,234");
        assert_eq!(format_number(1234567.25), "1,234,567.3");
        assert_eq!(format_number(-987.0), "-987");
        assert_eq!(format_number(12.5), "12.5");
    }

    #[test]
    fn test_disclosed_fact_serializes_citation_inline() {
        let fact = IrFact {
            field: IrField::Revenue,
            value: Some(FactValue::Amount(34_000.0)),
            unit: Some(Unit::JpyHundredMillion),
            provenance: Provenance::IrDisclosed {
                citation: Citation {
                    snippet_id: "ev-abc".into(),
                    source_url: Url::parse("https://example.com/ir/").unwrap(),
                    excerpt: Some("Revenue of 3.4 trillion yen".into()),
                },
            },
        };
        let json = serde_json::to_value(&fact).unwrap();
        assert_eq!(json["provenance"], "ir_disclosed");
        assert_eq!(json["citation"]["snippet_id"], "ev-abc");
        assert_eq!(json["field"], "revenue");
    }
}
