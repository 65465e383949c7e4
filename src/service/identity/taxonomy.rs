//! Evidence keywords per industry label and the disambiguation table

use std::collections::BTreeMap;

use crate::model::{EvidenceSnippet, IndustryLabel};

/// Company names known to map to more than one taxonomy entry.
///
/// Matched against the compacted lowercase name, so "RecruitCo" and
/// "Recruit Holdings" both hit the `recruit` entry.
const DISAMBIGUATION_TABLE: &[(&str, &[IndustryLabel])] = &[
    (
        "recruit",
        &[IndustryLabel::HrStaffing, IndustryLabel::RealEstate],
    ),
    (
        "リクルート",
        &[IndustryLabel::HrStaffing, IndustryLabel::RealEstate],
    ),
    (
        "softbank",
        &[
            IndustryLabel::Telecommunications,
            IndustryLabel::FinancialServices,
        ],
    ),
    (
        "sony",
        &[IndustryLabel::Electronics, IndustryLabel::MediaEntertainment],
    ),
    (
        "mitsubishi",
        &[
            IndustryLabel::TradingConglomerate,
            IndustryLabel::Automotive,
            IndustryLabel::Electronics,
            IndustryLabel::FinancialServices,
        ],
    ),
    (
        "hitachi",
        &[
            IndustryLabel::Electronics,
            IndustryLabel::InformationTechnology,
        ],
    ),
    (
        "rakuten",
        &[
            IndustryLabel::Retail,
            IndustryLabel::FinancialServices,
            IndustryLabel::Telecommunications,
        ],
    ),
    (
        "toyota",
        &[IndustryLabel::Automotive, IndustryLabel::TradingConglomerate],
    ),
];

/// Lowercase keywords whose presence in a snippet supports a label
pub fn keywords(label: IndustryLabel) -> &'static [&'static str] {
    match label {
        IndustryLabel::HrStaffing => &[
            "staffing",
            "recruitment",
            "recruiting services",
            "job board",
            "job search",
            "human resources",
            "hr services",
            "hr technology",
            "temporary staff",
            "job placement",
            "人材",
            "派遣",
            "求人",
        ],
        IndustryLabel::RealEstate => &[
            "real estate",
            "housing",
            "property development",
            "apartment",
            "condominium",
            "不動産",
            "住宅",
            "賃貸",
        ],
        IndustryLabel::Automotive => &[
            "automaker",
            "automotive",
            "vehicle",
            "car manufacturer",
            "自動車",
        ],
        IndustryLabel::Electronics => &[
            "electronics",
            "semiconductor",
            "consumer devices",
            "image sensor",
            "電機",
            "半導体",
        ],
        IndustryLabel::Telecommunications => &[
            "telecommunications",
            "mobile carrier",
            "wireless carrier",
            "broadband",
            "通信",
        ],
        IndustryLabel::InformationTechnology => &[
            "software",
            "cloud services",
            "it services",
            "system integration",
            "saas",
            "ソフトウェア",
        ],
        IndustryLabel::FinancialServices => &[
            "banking",
            "commercial bank",
            "financial services",
            "insurance",
            "securities",
            "asset management",
            "金融",
            "銀行",
        ],
        IndustryLabel::Retail => &[
            "retailer",
            "retail stores",
            "e-commerce marketplace",
            "supermarket",
            "小売",
        ],
        IndustryLabel::TradingConglomerate => &[
            "trading company",
            "sogo shosha",
            "conglomerate",
            "総合商社",
            "商社",
        ],
        IndustryLabel::Pharmaceuticals => &[
            "pharmaceutical",
            "drug discovery",
            "biotech",
            "clinical trial",
            "製薬",
            "医薬品",
        ],
        IndustryLabel::Energy => &[
            "oil and gas",
            "electric utility",
            "power generation",
            "renewable energy",
            "エネルギー",
            "電力",
        ],
        IndustryLabel::MediaEntertainment => &[
            "entertainment",
            "video games",
            "music label",
            "film studio",
            "broadcasting",
            "エンターテインメント",
        ],
        IndustryLabel::Construction => &[
            "general contractor",
            "construction",
            "civil engineering",
            "建設",
            "ゼネコン",
        ],
        IndustryLabel::FoodBeverage => &[
            "food products",
            "beverage",
            "brewery",
            "食品",
            "飲料",
        ],
        IndustryLabel::Logistics => &[
            "logistics",
            "freight",
            "shipping",
            "parcel delivery",
            "物流",
            "運輸",
        ],
        IndustryLabel::Consulting => &[
            "consulting",
            "consultancy",
            "advisory services",
            "management consulting",
            "コンサルティング",
        ],
    }
}

/// Candidate labels when the name is in the disambiguation table
pub fn ambiguous_candidates(name: &str) -> Option<&'static [IndustryLabel]> {
    let compact: String = name
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect();
    if compact.is_empty() {
        return None;
    }

    DISAMBIGUATION_TABLE
        .iter()
        .find(|(pattern, _)| compact.contains(pattern))
        .map(|(_, labels)| *labels)
}

/// Number of snippets supporting each label (labels without support omitted)
pub fn evidence_support(snippets: &[EvidenceSnippet]) -> BTreeMap<IndustryLabel, usize> {
    let mut support = BTreeMap::new();
    for snippet in snippets {
        let text = format!(
            "{} {}",
            snippet.title.as_deref().unwrap_or(""),
            snippet.text
        )
        .to_lowercase();

        for label in IndustryLabel::ALL {
            if keywords(label).iter().any(|k| mentions(&text, k)) {
                *support.entry(label).or_insert(0) += 1;
            }
        }
    }
    support
}

/// `keyword` occurs in lowercase `text` as a whole word.
///
/// ASCII keywords must not touch ASCII letters or digits on either side,
/// except for a plural "s"/"es". Japanese keywords match as substrings.
fn mentions(text: &str, keyword: &str) -> bool {
    if !keyword.is_ascii() {
        return text.contains(keyword);
    }
    let is_word = |c: Option<char>| c.is_some_and(|c| c.is_ascii_alphanumeric());
    let ends_word = |rest: &str| !is_word(rest.chars().next());

    text.match_indices(keyword).any(|(start, _)| {
        let rest = &text[start + keyword.len()..];
        !is_word(text[..start].chars().next_back())
            && (ends_word(rest)
                || rest.strip_prefix("es").is_some_and(ends_word)
                || rest.strip_prefix('s').is_some_and(ends_word))
    })
}

/// Label with the strictly greatest support among `candidates`
pub fn strongest_among(
    support: &BTreeMap<IndustryLabel, usize>,
    candidates: &[IndustryLabel],
) -> Option<IndustryLabel> {
    let mut ranked: Vec<(IndustryLabel, usize)> = candidates
        .iter()
        .filter_map(|l| support.get(l).map(|n| (*l, *n)))
        .filter(|(_, n)| *n > 0)
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));

    match ranked.as_slice() {
        [] => None,
        [(only, _)] => Some(*only),
        [(first, a), (_, b), ..] if a > b => Some(*first),
        _ => None,
    }
}

/// Best-supported label overall; ties resolve to taxonomy order
pub fn strongest(support: &BTreeMap<IndustryLabel, usize>) -> Option<IndustryLabel> {
    IndustryLabel::ALL
        .into_iter()
        .filter_map(|l| support.get(&l).map(|n| (l, *n)))
        .filter(|(_, n)| *n > 0)
        .fold(None, |best: Option<(IndustryLabel, usize)>, (label, n)| match best {
            Some((_, m)) if m >= n => best,
            _ => Some((label, n)),
        })
        .map(|(label, _)| label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::testing::snippet;

    #[test]
    fn test_ambiguous_candidates_matches_compact_name() {
        assert_eq!(
            ambiguous_candidates("RecruitCo"),
            Some(&[IndustryLabel::HrStaffing, IndustryLabel::RealEstate][..])
        );
        assert!(ambiguous_candidates("Recruit Holdings Co., Ltd.").is_some());
        assert!(ambiguous_candidates("Persol Holdings").is_none());
        assert!(ambiguous_candidates("   ").is_none());
    }

    #[test]
    fn test_evidence_support_counts_snippets_not_occurrences() {
        let snippets = vec![
            snippet("https://a.example/", "Staffing and recruitment services, staffing again"),
            snippet("https://b.example/", "A global HR services provider"),
            snippet("https://c.example/", "Quarterly results"),
        ];
        let support = evidence_support(&snippets);
        assert_eq!(support.get(&IndustryLabel::HrStaffing), Some(&2));
        assert!(!support.contains_key(&IndustryLabel::RealEstate));
    }

    #[test]
    fn test_keywords_match_whole_words_only() {
        let snippets = vec![snippet(
            "https://a.example/",
            "A third-party logistics operator offering warehousing and credit services",
        )];
        let support = evidence_support(&snippets);
        assert_eq!(
            support.keys().copied().collect::<Vec<_>>(),
            vec![IndustryLabel::Logistics]
        );

        assert!(mentions("leading automakers in asia", "automaker"));
        assert!(mentions("it servicesを提供する企業", "it services"));
        assert!(mentions("人材派遣大手", "派遣"));
        assert!(!mentions("warehousing capacity", "housing"));
        assert!(!mentions("softwarely", "software"));
    }

    #[test]
    fn test_strongest_among_requires_strict_winner() {
        let mut support = BTreeMap::new();
        support.insert(IndustryLabel::HrStaffing, 2);
        support.insert(IndustryLabel::RealEstate, 2);
        let candidates = [IndustryLabel::HrStaffing, IndustryLabel::RealEstate];
        assert_eq!(strongest_among(&support, &candidates), None);

        support.insert(IndustryLabel::HrStaffing, 3);
        assert_eq!(
            strongest_among(&support, &candidates),
            Some(IndustryLabel::HrStaffing)
        );
    }

    #[test]
    fn test_strongest_ties_follow_taxonomy_order() {
        let mut support = BTreeMap::new();
        support.insert(IndustryLabel::Consulting, 1);
        support.insert(IndustryLabel::Retail, 1);
        assert_eq!(strongest(&support), Some(IndustryLabel::Retail));
        assert_eq!(strongest(&BTreeMap::new()), None);
    }
}
