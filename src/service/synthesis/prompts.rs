//! Prompts for report synthesis

use crate::model::{CompanyIdentity, CompetitorCandidate, IrFact};

pub const SYNTHESIS_SYSTEM_PROMPT: &str = r#"You are an employer-branding and business analyst. Write a concise Employee Value Proposition and business analysis for one company.

## Critical Rules

1. **Never write a financial figure directly.**
   - Refer to figures only with the placeholders listed under "Available Facts", e.g. {{fact:revenue}}.
   - Placeholders are replaced with the value and its source afterwards.
   - Do not reference fields that are not listed.

2. **Only mention competitors from the provided list.**

3. **Do not speculate beyond the provided material.** When material is thin, say so plainly.

## Sections

EVP (one paragraph each):
- rewards: compensation, benefits, recognition
- opportunity: growth, career development, mobility
- organization: mission, brand, stability, market standing
- people: culture, leadership, colleagues
- work: role content, flexibility, work-life balance

Business analysis (one paragraph each):
- industry_market: market size and trends of the company's industry
- market_position: standing relative to the listed competitors
- differentiation: distinctive strengths
- business_portfolio: main businesses and segments"#;

pub fn build_synthesis_prompt(
    identity: &CompanyIdentity,
    facts: &[IrFact],
    competitors: &[CompetitorCandidate],
    focus_area: &str,
) -> String {
    let available: Vec<String> = facts
        .iter()
        .filter(|f| f.value.is_some() && !f.provenance.is_unknown())
        .map(|f| {
            let kind = if f.provenance.is_disclosed() {
                "disclosed"
            } else {
                "estimated"
            };
            format!("- {{{{fact:{}}}}} ({})", f.field, kind)
        })
        .collect();
    let available = if available.is_empty() {
        "None. Do not use any placeholders or figures.".to_string()
    } else {
        available.join("\n")
    };

    let competitors = if competitors.is_empty() {
        "None identified.".to_string()
    } else {
        competitors
            .iter()
            .map(|c| format!("- {}: {}", c.name, c.similarity_rationale))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        r#"Write the analysis for {} (industry: {}).

## Focus Area

{focus_area}

Emphasize aspects relevant to this focus area in every section.

## Available Facts

{available}

## Competitors

{competitors}"#,
        identity.canonical_name, identity.industry_label,
    )
}
