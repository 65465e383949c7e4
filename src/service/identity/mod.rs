//! Company identity resolution (Phase 1)
//!
//! The model proposes a canonical name, a taxonomy label and competitors.
//! Retrieved evidence then corroborates, overrides or caps that label.

use rig::providers::openai;

use crate::model::extraction::ExtractedIdentity;
use crate::model::{
    CompanyIdentity, CompetitorCandidate, EvidenceSnippet, IndustryLabel, ResolutionSource,
    normalize_company_name,
};
use crate::retriever::extract_domain;
use crate::service::llm::{CompletionRequest, LanguageModel, ModelGateway, ModelTask};

pub mod error;
pub mod prompts;
pub mod taxonomy;

pub use error::IdentityError;

use prompts::{IDENTITY_SYSTEM_PROMPT, build_identity_prompt};
use taxonomy::{ambiguous_candidates, evidence_support, strongest, strongest_among};

/// Environment variable for the identity model (defaults to gpt-4o if not set)
const ENV_IDENTITY_MODEL: &str = "IDENTITY_MODEL";

const DEFAULT_MODEL: &str = openai::GPT_4O;

/// Ambiguous names without deciding evidence stay below the low-confidence threshold
pub const AMBIGUOUS_CONFIDENCE_CAP: f64 = 0.45;

/// Ceiling for labels that only the model vouches for
pub const MODEL_ONLY_CONFIDENCE_CAP: f64 = 0.7;

const CORROBORATED_FLOOR: f64 = 0.5;
const CORROBORATION_BOOST: f64 = 0.2;
const CONFIDENCE_CEILING: f64 = 0.98;

/// Confidence assigned when evidence replaces the model's label
const EVIDENCE_OVERRIDE_CONFIDENCE: f64 = 0.6;

/// Phase 1 output
#[derive(Debug, Clone)]
pub struct IdentityResolution {
    pub identity: CompanyIdentity,
    pub competitors: Vec<CompetitorCandidate>,
}

/// Final label decision after weighing evidence
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub label: IndustryLabel,
    pub confidence: f64,
    pub source: ResolutionSource,
    pub ambiguous: bool,
}

pub struct IdentityResolver<M> {
    gateway: ModelGateway<M>,
    model: String,
}

impl<M: LanguageModel> IdentityResolver<M> {
    /// Uses IDENTITY_MODEL when set
    pub fn new(gateway: ModelGateway<M>) -> Self {
        let model =
            std::env::var(ENV_IDENTITY_MODEL).unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Self::with_model(gateway, model)
    }

    pub fn with_model(gateway: ModelGateway<M>, model: impl Into<String>) -> Self {
        let model = model.into();
        tracing::info!(model = %model, "Identity resolver initialized");
        Self { gateway, model }
    }

    pub async fn resolve(
        &self,
        raw_name: &str,
        homepage_url: Option<&str>,
        evidence: &[EvidenceSnippet],
        retry_hint: Option<&str>,
    ) -> Result<IdentityResolution, IdentityError> {
        let raw_name = raw_name.trim();
        if raw_name.is_empty() {
            return Err(IdentityError::EmptyName);
        }

        let request = CompletionRequest {
            task: ModelTask::Identity,
            model: self.model.clone(),
            preamble: IDENTITY_SYSTEM_PROMPT,
            prompt: build_identity_prompt(raw_name, homepage_url, evidence, retry_hint),
        };
        let extracted: ExtractedIdentity = self.gateway.extract(request).await?;

        let classification = classify(raw_name, &extracted, evidence)
            .ok_or_else(|| IdentityError::Unresolved(raw_name.to_string()))?;

        let canonical_name = match extracted.canonical_name.trim() {
            "" => raw_name.to_string(),
            name => name.to_string(),
        };

        let competitors = collect_competitors(&extracted, raw_name, &canonical_name);

        tracing::info!(
            company = %raw_name,
            canonical_name = %canonical_name,
            industry = %classification.label,
            confidence = classification.confidence,
            source = ?classification.source,
            ambiguous = classification.ambiguous,
            evidence_count = evidence.len(),
            competitor_count = competitors.len(),
            "Company identity resolved"
        );

        Ok(IdentityResolution {
            identity: CompanyIdentity {
                raw_input_name: raw_name.to_string(),
                canonical_name,
                industry_label: classification.label,
                industry_confidence: classification.confidence,
                resolution_source: classification.source,
                ambiguous: classification.ambiguous,
            },
            competitors,
        })
    }
}

/// Search queries used to gather identity evidence
pub fn evidence_queries(raw_name: &str, homepage_url: Option<&str>) -> Vec<String> {
    let name = raw_name.trim();
    let mut queries = vec![
        format!("{} company profile business overview", name),
        format!("{} industry main business", name),
    ];
    if let Some(domain) = homepage_url.and_then(extract_domain) {
        queries.push(format!("{} site:{}", name, domain));
    }
    queries
}

/// Weigh the model's label against keyword support in the evidence.
///
/// Returns `None` when neither the model nor the evidence yields a label.
pub fn classify(
    raw_name: &str,
    extracted: &ExtractedIdentity,
    evidence: &[EvidenceSnippet],
) -> Option<Classification> {
    let model_confidence = sanitize_confidence(extracted.confidence);
    let support = evidence_support(evidence);
    let candidates = ambiguous_candidates(raw_name)
        .or_else(|| ambiguous_candidates(&extracted.canonical_name));

    if let Some(candidates) = candidates {
        if let Some(label) = strongest_among(&support, candidates) {
            let confidence = if extracted.industry == Some(label) {
                corroborated(model_confidence)
            } else {
                EVIDENCE_OVERRIDE_CONFIDENCE
            };
            return Some(Classification {
                label,
                confidence,
                source: ResolutionSource::EvidenceBacked,
                ambiguous: true,
            });
        }

        // No deciding evidence: stay within the table and force caution downstream
        let label = extracted
            .industry
            .into_iter()
            .chain(extracted.alternative_industries.iter().copied())
            .find(|l| candidates.contains(l))
            .unwrap_or(candidates[0]);
        return Some(Classification {
            label,
            confidence: model_confidence.min(AMBIGUOUS_CONFIDENCE_CAP),
            source: ResolutionSource::ModelOnly,
            ambiguous: true,
        });
    }

    match extracted.industry {
        Some(label) if support.get(&label).copied().unwrap_or(0) > 0 => Some(Classification {
            label,
            confidence: corroborated(model_confidence),
            source: ResolutionSource::EvidenceBacked,
            ambiguous: false,
        }),
        Some(label) => match strongest(&support) {
            Some(evidence_label) => {
                tracing::warn!(
                    model_label = %label,
                    evidence_label = %evidence_label,
                    "Evidence contradicts model industry label"
                );
                Some(Classification {
                    label: evidence_label,
                    confidence: EVIDENCE_OVERRIDE_CONFIDENCE,
                    source: ResolutionSource::EvidenceBacked,
                    ambiguous: false,
                })
            }
            None => Some(Classification {
                label,
                confidence: model_confidence.min(MODEL_ONLY_CONFIDENCE_CAP),
                source: ResolutionSource::ModelOnly,
                ambiguous: false,
            }),
        },
        None => strongest(&support).map(|label| Classification {
            label,
            confidence: EVIDENCE_OVERRIDE_CONFIDENCE,
            source: ResolutionSource::EvidenceBacked,
            ambiguous: false,
        }),
    }
}

fn corroborated(model_confidence: f64) -> f64 {
    (model_confidence.max(CORROBORATED_FLOOR) + CORROBORATION_BOOST).min(CONFIDENCE_CEILING)
}

fn sanitize_confidence(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Competitors from the model, minus blanks, duplicates and the company itself
fn collect_competitors(
    extracted: &ExtractedIdentity,
    raw_name: &str,
    canonical_name: &str,
) -> Vec<CompetitorCandidate> {
    let own_keys = [
        normalize_company_name(raw_name),
        normalize_company_name(canonical_name),
    ];
    let mut seen = std::collections::HashSet::new();

    extracted
        .competitors
        .iter()
        .filter(|c| !c.name.trim().is_empty())
        .map(|c| CompetitorCandidate {
            name: c.name.trim().to_string(),
            industry_label: c.industry,
            similarity_rationale: c.rationale.trim().to_string(),
        })
        .filter(|c| {
            let key = c.name_key();
            !own_keys.contains(&key) && seen.insert(key)
        })
        .collect()
}
