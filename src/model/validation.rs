use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingCategory {
    IndustryMismatch,
    CompetitorMismatch,
    UnsupportedFigure,
    Contradiction,
}

impl FindingCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FindingCategory::IndustryMismatch => "industry_mismatch",
            FindingCategory::CompetitorMismatch => "competitor_mismatch",
            FindingCategory::UnsupportedFigure => "unsupported_figure",
            FindingCategory::Contradiction => "contradiction",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Blocking,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationFinding {
    pub category: FindingCategory,
    pub severity: Severity,
    pub detail: String,
}

impl ValidationFinding {
    pub fn blocking(category: FindingCategory, detail: impl Into<String>) -> Self {
        Self {
            category,
            severity: Severity::Blocking,
            detail: detail.into(),
        }
    }

    pub fn warning(category: FindingCategory, detail: impl Into<String>) -> Self {
        Self {
            category,
            severity: Severity::Warning,
            detail: detail.into(),
        }
    }

    pub fn is_blocking(&self) -> bool {
        self.severity == Severity::Blocking
    }
}
