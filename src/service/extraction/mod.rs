//! IR fact extraction (Phase 2)
//!
//! Retrieves disclosure evidence per field, asks the model for figures and
//! passes every proposed figure through the provenance guard before it
//! becomes an `IrFact`.

use std::collections::{HashMap, HashSet};

use rig::providers::openai;

use crate::model::extraction::ExtractedFacts;
use crate::model::{
    Caveat, CaveatKind, CompanyIdentity, CompetitorCandidate, EvidenceSnippet, IrFact, IrField,
    normalize_company_name,
};
use crate::model::evidence::dedup_snippets;
use crate::service::evidence::EvidenceRetriever;
use crate::service::llm::{CompletionRequest, LanguageModel, ModelGateway, ModelTask};

pub mod error;
pub mod filters;
pub mod grounding;
pub mod prompts;

pub use error::ExtractionError;

use filters::{GuardDecision, guard_fact, resolve_duplicates};
use prompts::{EXTRACTION_SYSTEM_PROMPT, build_extraction_prompt};

/// Environment variable for the extraction model (defaults to gpt-4o if not set)
const ENV_EXTRACTION_MODEL: &str = "EXTRACTION_MODEL";

const DEFAULT_MODEL: &str = openai::GPT_4O;

/// Evidence collected for Phase 2
#[derive(Debug, Clone, Default)]
pub struct GatheredEvidence {
    pub snippets: Vec<EvidenceSnippet>,
    /// Fields whose disclosure query failed or timed out
    pub failed_fields: Vec<IrField>,
}

/// Phase 2 output
#[derive(Debug, Clone, Default)]
pub struct ExtractionOutcome {
    pub facts: Vec<IrFact>,
    pub competitors: Vec<CompetitorCandidate>,
    pub caveats: Vec<Caveat>,
    /// Human-readable reasons for rejected or downgraded figures
    pub guard_notes: Vec<String>,
}

/// One disclosure query per field
pub fn field_queries(identity: &CompanyIdentity) -> Vec<(IrField, String)> {
    IrField::ALL
        .iter()
        .map(|field| {
            (
                *field,
                format!(
                    "{} investor relations {}",
                    identity.canonical_name,
                    field.query_phrase()
                ),
            )
        })
        .collect()
}

/// Run the field queries concurrently, plus IR pages reachable from the homepage
pub async fn gather_evidence(
    retriever: &EvidenceRetriever,
    identity: &CompanyIdentity,
    homepage_url: Option<&str>,
) -> GatheredEvidence {
    let queries = field_queries(identity);
    let query_strings: Vec<String> = queries.iter().map(|(_, q)| q.clone()).collect();

    let ir_pages = async {
        match homepage_url {
            Some(homepage) => retriever.collect_ir_pages(homepage).await,
            None => Vec::new(),
        }
    };
    let (outcomes, ir_pages) = tokio::join!(
        retriever.retrieve_many(&query_strings, retriever.max_results()),
        ir_pages
    );

    let failed_fields: Vec<IrField> = queries
        .iter()
        .zip(&outcomes)
        .filter(|(_, outcome)| outcome.failed())
        .map(|((field, _), _)| *field)
        .collect();

    let snippets = dedup_snippets(
        ir_pages
            .into_iter()
            .chain(outcomes.into_iter().flat_map(|o| o.snippets))
            .collect(),
    );

    tracing::debug!(
        company = %identity.canonical_name,
        snippet_count = snippets.len(),
        failed_fields = ?failed_fields,
        "IR evidence gathered"
    );

    GatheredEvidence {
        snippets,
        failed_fields,
    }
}

pub struct IrExtractor<M> {
    gateway: ModelGateway<M>,
    model: String,
}

impl<M: LanguageModel> IrExtractor<M> {
    /// Uses EXTRACTION_MODEL when set
    pub fn new(gateway: ModelGateway<M>) -> Self {
        let model =
            std::env::var(ENV_EXTRACTION_MODEL).unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Self::with_model(gateway, model)
    }

    pub fn with_model(gateway: ModelGateway<M>, model: impl Into<String>) -> Self {
        let model = model.into();
        tracing::info!(model = %model, "IR extractor initialized");
        Self { gateway, model }
    }

    pub async fn extract(
        &self,
        identity: &CompanyIdentity,
        evidence: &GatheredEvidence,
        retry_hint: Option<&str>,
    ) -> Result<ExtractionOutcome, ExtractionError> {
        let request = CompletionRequest {
            task: ModelTask::Extraction,
            model: self.model.clone(),
            preamble: EXTRACTION_SYSTEM_PROMPT,
            prompt: build_extraction_prompt(identity, &evidence.snippets, retry_hint),
        };
        let extracted: ExtractedFacts = self.gateway.extract(request).await?;
        let proposed_count = extracted.facts.len();

        let index: HashMap<&str, &EvidenceSnippet> = evidence
            .snippets
            .iter()
            .map(|s| (s.id.as_str(), s))
            .collect();

        let mut accepted = Vec::new();
        let mut guard_notes = Vec::new();
        for fact in &extracted.facts {
            match guard_fact(fact, &index) {
                GuardDecision::Accepted(f) => accepted.push(f),
                GuardDecision::Downgraded { fact, reason } => {
                    tracing::warn!(
                        field = %fact.field,
                        reason = %reason,
                        "Disclosed figure downgraded to estimate"
                    );
                    guard_notes.push(format!("{} downgraded to estimated: {}", fact.field, reason));
                    accepted.push(fact);
                }
                GuardDecision::Rejected { field, reason } => {
                    tracing::warn!(
                        field = %field,
                        reason = %reason,
                        "Figure rejected by provenance guard"
                    );
                    guard_notes.push(format!("{} rejected: {}", field, reason));
                }
            }
        }

        let mut facts = resolve_duplicates(accepted);
        let mut caveats = Vec::new();

        let degraded = degraded_fields(&facts, &evidence.failed_fields);
        if !degraded.is_empty() {
            for field in &degraded {
                if !facts.iter().any(|f| f.field == *field) {
                    facts.push(IrFact::unknown(*field));
                }
            }
            facts.sort_by_key(|f| f.field);
            caveats.push(Caveat::new(
                CaveatKind::ExtractionDegraded,
                format!(
                    "Evidence retrieval failed for {}; recorded as unknown",
                    join_fields(&degraded)
                ),
            ));
        }

        let competitors = collect_competitors(&extracted, identity);

        tracing::info!(
            company = %identity.canonical_name,
            proposed_count = proposed_count,
            fact_count = facts.len(),
            disclosed_count = facts.iter().filter(|f| f.provenance.is_disclosed()).count(),
            rejected_count = guard_notes.len(),
            degraded_fields = degraded.len(),
            "IR extraction complete"
        );

        Ok(ExtractionOutcome {
            facts,
            competitors,
            caveats,
            guard_notes,
        })
    }
}

/// Failed fields the model did not resolve to a value
fn degraded_fields(facts: &[IrFact], failed: &[IrField]) -> Vec<IrField> {
    failed
        .iter()
        .copied()
        .filter(|field| {
            facts
                .iter()
                .find(|f| f.field == *field)
                .is_none_or(|f| f.provenance.is_unknown())
        })
        .collect()
}

fn join_fields(fields: &[IrField]) -> String {
    fields
        .iter()
        .map(IrField::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

fn collect_competitors(
    extracted: &ExtractedFacts,
    identity: &CompanyIdentity,
) -> Vec<CompetitorCandidate> {
    let own = normalize_company_name(&identity.canonical_name);
    extracted
        .competitors
        .iter()
        .filter(|c| !c.name.trim().is_empty())
        .map(|c| CompetitorCandidate {
            name: c.name.trim().to_string(),
            industry_label: c.industry,
            similarity_rationale: c.rationale.trim().to_string(),
        })
        .filter(|c| c.name_key() != own)
        .collect()
}

/// Merge candidates by normalized name, keeping the first proposal of each
pub fn merge_competitors(
    primary: Vec<CompetitorCandidate>,
    additional: Vec<CompetitorCandidate>,
) -> Vec<CompetitorCandidate> {
    let mut seen = HashSet::new();
    primary
        .into_iter()
        .chain(additional)
        .filter(|c| seen.insert(c.name_key()))
        .collect()
}
