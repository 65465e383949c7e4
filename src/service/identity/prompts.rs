//! Prompts for company identity resolution

use crate::model::{EvidenceSnippet, IndustryLabel};
use crate::retriever::truncate_chars;

/// Characters of each snippet shown to the model
const SNIPPET_PROMPT_CHARS: usize = 1200;

pub const IDENTITY_SYSTEM_PROMPT: &str = r#"You are a corporate research analyst. Your task is to identify a company precisely and classify its primary industry using a fixed taxonomy.

## Critical Rules

1. **The industry must be one taxonomy label, never free text.**
   - Choose the label describing the company's primary revenue-generating business.
   - If the company fits none of the labels, return null for the industry.

2. **Names can be ambiguous.**
   - Some names refer to groups active in several industries (e.g. a recruiting group that also runs housing portals).
   - Prefer what the evidence snippets describe over what the name suggests.
   - List the other plausible labels under alternative_industries.

3. **Confidence is your honest probability that the label is right (0.0 to 1.0).**
   - Do not report high confidence for a name you cannot place.

4. **Competitors must operate in the same industry as the company.**
   - Each competitor carries its own taxonomy label.
   - Do not list firms from adjacent industries as competitors.
   - Prefer 3-6 well-known direct competitors.

## Output Requirements

- canonical_name: the official registered or commonly used corporate name
- industry: one taxonomy label or null
- alternative_industries: other plausible labels, possibly empty
- confidence: 0.0 to 1.0
- competitors: name, industry label and a one-sentence rationale each"#;

pub fn build_identity_prompt(
    raw_name: &str,
    homepage_url: Option<&str>,
    snippets: &[EvidenceSnippet],
    retry_hint: Option<&str>,
) -> String {
    let taxonomy = IndustryLabel::ALL
        .iter()
        .map(|l| format!("- {}", l.as_str()))
        .collect::<Vec<_>>()
        .join("\n");

    let evidence = if snippets.is_empty() {
        "No external evidence is available. Rely on your own knowledge and keep confidence conservative.".to_string()
    } else {
        format_snippets(snippets)
    };

    let mut prompt = format!(
        r#"Identify the following company and classify its industry.

## Company
- Name as entered: {raw_name}
- Homepage: {}

## Industry Taxonomy

{taxonomy}

## Evidence

{evidence}"#,
        homepage_url.unwrap_or("not provided"),
    );

    if let Some(hint) = retry_hint {
        prompt.push_str(&format!(
            r#"

## Previous Attempt

A previous classification was rejected by consistency checks:
{hint}

Re-examine the evidence before choosing the industry again."#
        ));
    }

    prompt
}

/// Render snippets as `[id] url` blocks for citation by id
pub fn format_snippets(snippets: &[EvidenceSnippet]) -> String {
    snippets
        .iter()
        .map(|s| {
            let title = s.title.as_deref().unwrap_or("");
            format!(
                "[{}] {} {}\n{}",
                s.id,
                s.source_url,
                title,
                truncate_chars(&s.text, SNIPPET_PROMPT_CHARS)
            )
            .trim()
            .to_string()
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::testing::snippet;

    #[test]
    fn test_prompt_lists_taxonomy_and_snippet_ids() {
        let ev = snippet("https://ir.example.com/", "A staffing company");
        let prompt = build_identity_prompt("RecruitCo", None, std::slice::from_ref(&ev), None);
        assert!(prompt.contains("- hr_staffing"));
        assert!(prompt.contains(&format!("[{}]", ev.id)));
        assert!(prompt.contains("Homepage: not provided"));
        assert!(!prompt.contains("Previous Attempt"));
    }

    #[test]
    fn test_prompt_includes_retry_hint() {
        let prompt = build_identity_prompt("RecruitCo", None, &[], Some("industry_mismatch: ..."));
        assert!(prompt.contains("No external evidence"));
        assert!(prompt.contains("Previous Attempt"));
        assert!(prompt.contains("industry_mismatch"));
    }
}
