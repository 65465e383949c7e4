use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

/// A ranked piece of retrieved evidence.
///
/// `id` is derived from URL and text, so the same snippet gets the same id in
/// every run and citations stay reproducible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceSnippet {
    pub id: String,
    pub source_url: Url,
    pub title: Option<String>,
    pub text: String,
    pub retrieved_at: DateTime<Utc>,
}

impl EvidenceSnippet {
    pub fn new(source_url: Url, title: Option<String>, text: String) -> Self {
        Self {
            id: snippet_id(&source_url, &text),
            source_url,
            title,
            text,
            retrieved_at: Utc::now(),
        }
    }
}

/// `ev-` plus the first 12 hex chars of SHA256(url + text)
pub fn snippet_id(url: &Url, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_str().as_bytes());
    hasher.update(text.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("ev-{}", &digest[..12])
}

/// Deduplicate by id keeping first occurrence, so provider order survives.
pub fn dedup_snippets(snippets: Vec<EvidenceSnippet>) -> Vec<EvidenceSnippet> {
    let mut seen = std::collections::HashSet::new();
    snippets
        .into_iter()
        .filter(|s| seen.insert(s.id.clone()))
        .collect()
}
