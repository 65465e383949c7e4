//! Excerpt grounding checks
//!
//! An excerpt counts as grounded in a snippet when it appears verbatim after
//! whitespace normalization, when a contiguous 70% of it appears, or when 70%
//! of its words appear in order. Comparisons work on chars, so Japanese
//! disclosures are handled like English ones.
//!
//! A figure counts as stated in a text when one of the numbers written there
//! equals it, including the 兆/億 notation of yen disclosures.

use std::sync::LazyLock;

use regex::Regex;

static NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{1,3}(?:,\d{3})+(?:\.\d+)?|\d+(?:\.\d+)?").expect("number pattern is valid")
});

/// "3兆4,164億" is 34,164 hundred million
static CHO_OKU: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+)兆(\d{1,3}(?:,\d{3})+|\d+)億").expect("兆/億 pattern is valid")
});

/// Minimum share of the excerpt that must match contiguously
const CONTIGUOUS_RATIO: f32 = 0.70;

/// Minimum share of excerpt words that must appear in order
const WORD_SUBSEQUENCE_RATIO: f32 = 0.70;

pub fn is_grounded(excerpt: &str, source: &str) -> bool {
    let excerpt = normalize_whitespace(excerpt).to_lowercase();
    if excerpt.is_empty() {
        return false;
    }
    let source = normalize_whitespace(source).to_lowercase();

    source.contains(&excerpt)
        || is_substantially_present(&excerpt, &source)
        || words_in_order_present(&excerpt, &source, WORD_SUBSEQUENCE_RATIO)
}

/// `value` is written in `text` as a plain number or in 兆/億 notation.
///
/// The sign is ignored: losses appear as "△500" or "(500)".
pub fn is_value_stated(value: f64, text: &str) -> bool {
    let tolerance = (value.abs() * 1e-6).max(1e-9);
    stated_numbers(text)
        .into_iter()
        .any(|n| (n - value).abs() <= tolerance || (n + value).abs() <= tolerance)
}

fn stated_numbers(text: &str) -> Vec<f64> {
    let parse = |s: &str| s.replace(',', "").parse::<f64>().ok();

    let mut numbers: Vec<f64> = NUMBER.find_iter(text).filter_map(|m| parse(m.as_str())).collect();
    for caps in CHO_OKU.captures_iter(text) {
        if let (Some(cho), Some(oku)) = (parse(&caps[1]), parse(&caps[2])) {
            numbers.push(cho * 10_000.0 + oku);
        }
    }
    numbers
}

/// Normalize whitespace for comparison (collapse runs, trim)
fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercase and strip surrounding punctuation ("3,400." vs "3,400")
fn normalize_word(w: &str) -> String {
    w.trim_matches(|c: char| c.is_ascii_punctuation() || matches!(c, '、' | '。' | '「' | '」'))
        .to_lowercase()
}

/// A contiguous window covering `CONTIGUOUS_RATIO` of the excerpt occurs in the source
fn is_substantially_present(excerpt: &str, source: &str) -> bool {
    let chars: Vec<char> = excerpt.chars().collect();
    let window = ((chars.len() as f32 * CONTIGUOUS_RATIO).ceil() as usize).max(1);
    if window > chars.len() {
        return false;
    }

    (0..=chars.len() - window).any(|start| {
        let candidate: String = chars[start..start + window].iter().collect();
        source.contains(&candidate)
    })
}

fn words_in_order_present(excerpt: &str, source: &str, min_ratio: f32) -> bool {
    let excerpt_words: Vec<String> = excerpt
        .split_whitespace()
        .map(normalize_word)
        .filter(|w| !w.is_empty())
        .collect();
    // Single-token excerpts are covered by the contiguous check
    if excerpt_words.len() < 2 {
        return false;
    }

    let source_words: Vec<String> = source
        .split_whitespace()
        .map(normalize_word)
        .filter(|w| !w.is_empty())
        .collect();

    // A miss leaves the position untouched so later words can still match
    let mut position = 0;
    let mut matched = 0;
    for word in &excerpt_words {
        if let Some(offset) = source_words[position..].iter().position(|s| s == word) {
            position += offset + 1;
            matched += 1;
        }
    }

    matched as f32 / excerpt_words.len() as f32 >= min_ratio
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "Consolidated revenue for fiscal 2024 was 3,416.4 billion yen,\n   up 0.8% year on year. Operating income was 405.7 billion yen.";

    #[test]
    fn test_verbatim_excerpt_with_whitespace_differences() {
        assert!(is_grounded(
            "Consolidated revenue for fiscal 2024 was 3,416.4 billion yen, up 0.8%",
            SOURCE
        ));
    }

    #[test]
    fn test_partial_contiguous_excerpt() {
        assert!(is_grounded(
            "Operating income was 405.7 billion yen (IFRS)",
            SOURCE
        ));
    }

    #[test]
    fn test_paraphrased_words_in_order() {
        assert!(is_grounded(
            "revenue for fiscal 2024 was 3,416.4 billion yen, up roughly 0.8%",
            SOURCE
        ));
    }

    #[test]
    fn test_fabricated_excerpt_is_not_grounded() {
        assert!(!is_grounded("Revenue reached 9.9 trillion yen in 2025", SOURCE));
        assert!(!is_grounded("   ", SOURCE));
    }

    #[test]
    fn test_unmatched_word_does_not_end_the_ordered_match() {
        // "roughly" and "nearly" are missing; the remaining words still count
        let source = "revenue for fiscal 2024 was 3,416.4 billion yen and operating income was 405.7 billion yen";
        assert!(words_in_order_present(
            "revenue roughly for fiscal 2024 nearly was 3,416.4 billion yen",
            source,
            0.70
        ));
    }

    #[test]
    fn test_value_stated_in_plain_and_yen_notation() {
        assert!(is_value_stated(34_164.0, "revenue 34,164 hundred million yen"));
        assert!(is_value_stated(34_164.0, "売上収益は3兆4,164億円"));
        assert!(is_value_stated(11.7, "operating margin 11.7%"));
        assert!(is_value_stated(49_000.0, "従業員数 49000名"));
        assert!(!is_value_stated(99_999.0, "revenue 34,164 hundred million yen"));
        assert!(!is_value_stated(4_164.5, "3兆4,164億円"));
    }

    #[test]
    fn test_japanese_excerpt() {
        let source = "2024年3月期の売上収益は3兆4,164億円となりました。";
        assert!(is_grounded("売上収益は3兆4,164億円", source));
        assert!(!is_grounded("売上収益は5兆円", source));
    }
}
