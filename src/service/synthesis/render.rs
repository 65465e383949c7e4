//! Narrative post-processing
//!
//! The model refers to figures only through `{{fact:<field>}}` placeholders.
//! Rendering replaces them with the stored value plus a provenance marker, so
//! no figure reaches the report without its provenance.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::model::{CompetitorCandidate, FactValue, IrFact, IrField, Provenance, format_number};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*fact:\s*([a-z_]+)\s*\}\}").expect("placeholder pattern is valid")
});

pub const ESTIMATED_MARKER: &str = "(estimated)";
pub const NOT_DISCLOSED: &str = "not disclosed";
pub const REDACTED_COMPETITOR: &str = "[out-of-industry company removed]";

/// Estimates with a smaller magnitude are too short to detect reliably in prose
const MIN_LEAK_MAGNITUDE: f64 = 10.0;

/// Replace placeholders; returns the estimated fields rendered with a marker
pub fn render_placeholders(text: &str, facts: &[IrFact]) -> (String, BTreeSet<IrField>) {
    let mut labeled = BTreeSet::new();
    let rendered = PLACEHOLDER
        .replace_all(text, |caps: &Captures| {
            let fact = IrField::from_key(&caps[1])
                .and_then(|field| facts.iter().find(|f| f.field == field));
            match fact {
                Some(fact) => {
                    if fact.provenance.is_estimated() && fact.value.is_some() {
                        labeled.insert(fact.field);
                    }
                    render_fact(fact)
                }
                None => NOT_DISCLOSED.to_string(),
            }
        })
        .into_owned();
    (rendered, labeled)
}

/// Value plus inline provenance marker
pub fn render_fact(fact: &IrFact) -> String {
    let Some(value) = fact.display_value() else {
        return NOT_DISCLOSED.to_string();
    };
    match &fact.provenance {
        Provenance::IrDisclosed { citation } => format!("{} (IR: {})", value, citation.source_url),
        Provenance::Estimated { .. } => format!("{} {}", value, ESTIMATED_MARKER),
        Provenance::Unknown => NOT_DISCLOSED.to_string(),
    }
}

/// Mark raw estimated numbers the model wrote outside placeholders.
///
/// Run before placeholder rendering. Returns the fields whose values leaked.
pub fn annotate_leaks(text: &str, facts: &[IrFact]) -> (String, Vec<IrField>) {
    let mut out = text.to_string();
    let mut leaked = Vec::new();

    for fact in facts.iter().filter(|f| f.provenance.is_estimated()) {
        let Some(FactValue::Amount(amount)) = &fact.value else {
            continue;
        };
        if amount.abs() < MIN_LEAK_MAGNITUDE {
            continue;
        }

        let mut forms = vec![format_number(*amount)];
        if amount.fract() == 0.0 {
            forms.push(format!("{}", *amount as i64));
        }
        forms.dedup();

        let mut found = false;
        for form in forms {
            let (next, hit) = mark_occurrences(&out, &form);
            out = next;
            found |= hit;
        }
        if found {
            leaked.push(fact.field);
        }
    }

    (out, leaked)
}

/// Append the marker after standalone occurrences of `number` not already marked
fn mark_occurrences(text: &str, number: &str) -> (String, bool) {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    let mut hit = false;

    while let Some(pos) = rest.find(number) {
        let before = rest[..pos].chars().next_back();
        let after_text = &rest[pos + number.len()..];
        let after = after_text.chars().next();
        let standalone = !before.is_some_and(|c| c.is_ascii_digit() || c == ',' || c == '.')
            && !after.is_some_and(|c| c.is_ascii_digit())
            && !(matches!(after, Some(',') | Some('.'))
                && after_text.chars().nth(1).is_some_and(|c| c.is_ascii_digit()));

        out.push_str(&rest[..pos + number.len()]);
        if standalone && !after_text.trim_start().starts_with(ESTIMATED_MARKER) {
            out.push(' ');
            out.push_str(ESTIMATED_MARKER);
            hit = true;
        }
        rest = after_text;
    }
    out.push_str(rest);
    (out, hit)
}

/// Remove names of competitors dropped for industry mismatch.
///
/// A name edge that is an ASCII letter or digit must not touch another one,
/// so "Persol" leaves "Persolution" alone. Other edges match anywhere, which
/// covers names inside Japanese prose and names ending in punctuation.
pub fn redact_competitors(text: &str, dropped: &[CompetitorCandidate]) -> (String, Vec<String>) {
    let mut out = text.to_string();
    let mut redacted = Vec::new();
    let is_word = |c: Option<char>| c.is_some_and(|c| c.is_ascii_alphanumeric());

    for candidate in dropped {
        let name = candidate.name.trim();
        if name.is_empty() {
            continue;
        }
        let Ok(pattern) = Regex::new(&format!("(?i){}", regex::escape(name))) else {
            continue;
        };
        let anchor_start = is_word(name.chars().next());
        let anchor_end = is_word(name.chars().next_back());

        let mut hit = false;
        let replaced = pattern
            .replace_all(&out, |caps: &Captures| {
                let Some(m) = caps.get(0) else {
                    return String::new();
                };
                let joined_before = anchor_start && is_word(out[..m.start()].chars().next_back());
                let joined_after = anchor_end && is_word(out[m.end()..].chars().next());
                if joined_before || joined_after {
                    m.as_str().to_string()
                } else {
                    hit = true;
                    REDACTED_COMPETITOR.to_string()
                }
            })
            .into_owned();

        if hit {
            out = replaced;
            redacted.push(name.to_string());
        }
    }

    (out, redacted)
}

/// Deterministic list of every estimated figure with its rationale
pub fn estimate_disclosure(facts: &[IrFact]) -> Option<String> {
    let lines: Vec<String> = facts
        .iter()
        .filter_map(|fact| match &fact.provenance {
            Provenance::Estimated { rationale } => Some(format!(
                "- {}: {} {}. Basis: {}",
                fact.field,
                fact.display_value()?,
                ESTIMATED_MARKER,
                rationale
            )),
            _ => None,
        })
        .collect();

    if lines.is_empty() {
        return None;
    }
    Some(format!(
        "Estimated figures (not taken from IR disclosures):\n{}",
        lines.join("\n")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Citation, IndustryLabel, Unit};
    use url::Url;

    fn facts() -> Vec<IrFact> {
        vec![
            IrFact {
                field: IrField::Revenue,
                value: Some(FactValue::Amount(34_164.0)),
                unit: Some(Unit::JpyHundredMillion),
                provenance: Provenance::IrDisclosed {
                    citation: Citation {
                        snippet_id: "ev-1".into(),
                        source_url: Url::parse("https://ir.example.com/").unwrap(),
                        excerpt: None,
                    },
                },
            },
            IrFact {
                field: IrField::Headcount,
                value: Some(FactValue::Amount(49_000.0)),
                unit: Some(Unit::Persons),
                provenance: Provenance::Estimated {
                    rationale: "Prior-year headcount grown with hiring plans".into(),
                },
            },
            IrFact::unknown(IrField::MarketCapitalization),
        ]
    }

    #[test]
    fn test_placeholders_render_with_provenance() {
        let text = "Revenue: {{fact:revenue}}. Staff: {{ fact:headcount }}. Cap: {{fact:market_capitalization}}. X: {{fact:bogus}}.";
        let (out, labeled) = render_placeholders(text, &facts());
        assert_eq!(
            out,
            "Revenue: 34,164 hundred million JPY (IR: https://ir.example.com/). Staff: 49,000 persons (estimated). Cap: not disclosed. X: not disclosed."
        );
        assert_eq!(labeled, BTreeSet::from([IrField::Headcount]));
    }

    #[test]
    fn test_leaked_estimate_is_annotated() {
        let (out, leaked) = annotate_leaks("About 49,000 people work there; 149,000 is wrong.", &facts());
        assert_eq!(
            out,
            "About 49,000 (estimated) people work there; 149,000 is wrong."
        );
        assert_eq!(leaked, vec![IrField::Headcount]);

        let (out, leaked) = annotate_leaks("Headcount is 49000 (estimated).", &facts());
        assert_eq!(out, "Headcount is 49000 (estimated).");
        assert!(leaked.is_empty());
    }

    #[test]
    fn test_disclosed_numbers_are_not_annotated() {
        let (out, leaked) = annotate_leaks("Revenue of 34,164 hundred million yen", &facts());
        assert_eq!(out, "Revenue of 34,164 hundred million yen");
        assert!(leaked.is_empty());
    }

    #[test]
    fn test_redacts_dropped_competitors() {
        let dropped = vec![CompetitorCandidate {
            name: "Sumitomo Realty".into(),
            industry_label: IndustryLabel::RealEstate,
            similarity_rationale: String::new(),
        }];
        let (out, redacted) =
            redact_competitors("Rivals include Adecco and SUMITOMO REALTY.", &dropped);
        assert_eq!(
            out,
            format!("Rivals include Adecco and {}.", REDACTED_COMPETITOR)
        );
        assert_eq!(redacted, vec!["Sumitomo Realty".to_string()]);
    }

    #[test]
    fn test_redacts_names_in_japanese_text_and_with_trailing_punctuation() {
        let dropped = |name: &str| {
            vec![CompetitorCandidate {
                name: name.into(),
                industry_label: IndustryLabel::RealEstate,
                similarity_rationale: String::new(),
            }]
        };

        let (out, redacted) =
            redact_competitors("主な競合は住友不動産とパーソルです。", &dropped("住友不動産"));
        assert_eq!(out, format!("主な競合は{}とパーソルです。", REDACTED_COMPETITOR));
        assert_eq!(redacted, vec!["住友不動産".to_string()]);

        let (out, redacted) = redact_competitors(
            "Unlike Sumitomo Realty Co., Ltd., the group rents no offices.",
            &dropped("Sumitomo Realty Co., Ltd."),
        );
        assert_eq!(
            out,
            format!("Unlike {}, the group rents no offices.", REDACTED_COMPETITOR)
        );
        assert_eq!(redacted.len(), 1);

        let (out, _) = redact_competitors("競合にはSumitomoがある。", &dropped("Sumitomo"));
        assert_eq!(out, format!("競合には{}がある。", REDACTED_COMPETITOR));
    }

    #[test]
    fn test_redaction_respects_ascii_word_edges() {
        let dropped = vec![CompetitorCandidate {
            name: "Persol".into(),
            industry_label: IndustryLabel::RealEstate,
            similarity_rationale: String::new(),
        }];
        let (out, redacted) = redact_competitors("Persolution partners with Persol.", &dropped);
        assert_eq!(
            out,
            format!("Persolution partners with {}.", REDACTED_COMPETITOR)
        );
        assert_eq!(redacted.len(), 1);

        let (out, redacted) = redact_competitors("Persolution only.", &dropped);
        assert_eq!(out, "Persolution only.");
        assert!(redacted.is_empty());
    }

    #[test]
    fn test_estimate_disclosure_lists_only_estimates() {
        let list = estimate_disclosure(&facts()).unwrap();
        assert!(list.contains("- headcount: 49,000 persons (estimated)"));
        assert!(!list.contains("revenue"));
        assert!(estimate_disclosure(&[]).is_none());
    }
}
