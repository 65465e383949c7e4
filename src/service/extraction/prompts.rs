//! Prompts for IR fact extraction

use crate::model::{CompanyIdentity, EvidenceSnippet, IrField};
use crate::service::identity::prompts::format_snippets;

pub const EXTRACTION_SYSTEM_PROMPT: &str = r#"You are an investor-relations analyst. Your task is to extract disclosed financial and business figures for one company from evidence snippets, tagging how each figure was obtained.

## Critical Rules

1. **Never invent a specific number.**
   - If a figure cannot be determined, return it with provenance "unknown" and no amount.

2. **"ir_disclosed" means the figure is stated in one of the snippets.**
   - citation_id must be the exact snippet id shown in brackets, e.g. ev-1a2b3c4d5e6f.
   - excerpt must be copied verbatim from that snippet (one sentence) and must contain the figure itself.
   - Figures from your own memory are NOT ir_disclosed, even if you are sure.

3. **"estimated" means you derived a plausible figure yourself.**
   - estimation_rationale must explain the derivation in a full sentence (e.g. "Prior-year revenue of X grown at the disclosed guidance rate").
   - An estimate without a rationale will be discarded.

4. **Units**
   - Monetary amounts: usd_million, or jpy_hundred_million for yen disclosures (億円).
   - headcount: persons. Growth rate and margins: percent.
   - segment_breakdown uses the segments list (name and amount in the same monetary unit) instead of amount.

5. **Competitors** are optional. Only list direct competitors in the same industry, each with its taxonomy label.

## Output Requirements

- One entry per field at most
- Prefer "unknown" over a weak estimate"#;

pub fn build_extraction_prompt(
    identity: &CompanyIdentity,
    snippets: &[EvidenceSnippet],
    retry_hint: Option<&str>,
) -> String {
    let fields = IrField::ALL
        .iter()
        .map(|f| format!("- {}", f.as_str()))
        .collect::<Vec<_>>()
        .join("\n");

    let evidence = if snippets.is_empty() {
        "No evidence snippets are available. No figure can be ir_disclosed in this run; use estimated (with rationale) or unknown.".to_string()
    } else {
        format_snippets(snippets)
    };

    let mut prompt = format!(
        r#"Extract IR figures for {} (industry: {}).

## Fields

{fields}

## Evidence Snippets

{evidence}"#,
        identity.canonical_name, identity.industry_label,
    );

    if let Some(hint) = retry_hint {
        prompt.push_str(&format!(
            r#"

## Previous Attempt

The previous extraction contained figures that contradict each other:
{hint}

Re-read the snippets and make the figures mutually consistent, or mark doubtful ones unknown."#
        ));
    }

    prompt
}
