//! Four-phase analysis pipeline
//!
//! Identity -> IR extraction -> consistency validation -> synthesis and
//! scoring. Each phase is tracked by `PhaseTracker`; a blocking validation
//! finding buys at most one re-run of the phase it points at.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use url::Url;
use uuid::Uuid;

use crate::model::config::Config;
use crate::model::evidence::dedup_snippets;
use crate::model::{
    AnalysisReport, Caveat, CaveatKind, CompanyIdentity, EvidenceSnippet, FindingCategory,
    IndustryClassification, IrFact, IrField, PhaseName, ValidationFinding,
};
use crate::service::evidence::EvidenceRetriever;
use crate::service::extraction::{
    ExtractionOutcome, GatheredEvidence, IrExtractor, gather_evidence, merge_competitors,
};
use crate::service::identity::{
    IdentityError, IdentityResolution, IdentityResolver, evidence_queries,
};
use crate::service::limiter::{BackoffPolicy, ProviderLimiter};
use crate::service::llm::{LanguageModel, ModelGateway};
use crate::service::scoring::QualityScorer;
use crate::service::synthesis::{SynthesisInput, Synthesizer};
use crate::service::validation::{
    ConsistencyValidator, RetryTarget, ValidationOutcome, retry_hint,
};

pub mod error;
pub mod state;

#[cfg(test)]
mod tests;

pub use error::PipelineError;
pub use state::{PhaseTracker, RETRY_BUDGET, TransitionError};

pub const DEFAULT_FOCUS_AREA: &str = "general";

/// Mutable state of one run; never shared between runs
#[derive(Default)]
struct RunState {
    tracker: PhaseTracker,
    caveats: Vec<Caveat>,
    sources: BTreeSet<Url>,
}

impl RunState {
    fn record_sources(&mut self, snippets: &[EvidenceSnippet]) {
        self.sources
            .extend(snippets.iter().map(|s| s.source_url.clone()));
    }
}

pub struct Pipeline<M> {
    retriever: EvidenceRetriever,
    resolver: IdentityResolver<M>,
    extractor: IrExtractor<M>,
    validator: ConsistencyValidator,
    synthesizer: Synthesizer<M>,
    scorer: QualityScorer,
}

impl<M: LanguageModel> Pipeline<M> {
    /// Wrap `model` with the configured call policy
    pub fn new(model: Arc<M>, retriever: EvidenceRetriever, config: &Config) -> Self {
        let policy = &config.models;
        let limiter = ProviderLimiter::new(
            "llm",
            policy.max_concurrent,
            BackoffPolicy::new(policy.max_retries, policy.initial_backoff_ms),
        );
        let gateway = ModelGateway::new(model, limiter, Duration::from_secs(policy.timeout_secs));
        Self::from_gateway(gateway, retriever, config)
    }

    pub fn from_gateway(
        gateway: ModelGateway<M>,
        retriever: EvidenceRetriever,
        config: &Config,
    ) -> Self {
        Self {
            retriever,
            resolver: IdentityResolver::new(gateway.clone()),
            extractor: IrExtractor::new(gateway.clone()),
            validator: ConsistencyValidator::new(
                config.validation.clone(),
                config.plausibility.clone(),
            ),
            synthesizer: Synthesizer::new(gateway),
            scorer: QualityScorer::new(config.scoring.clone(), &config.validation),
        }
    }

    pub async fn analyze(
        &self,
        company_name: &str,
        homepage_url: Option<&str>,
        focus_area: &str,
    ) -> Result<AnalysisReport, PipelineError> {
        self.analyze_with_cancel(
            company_name,
            homepage_url,
            focus_area,
            &CancellationToken::new(),
        )
        .await
    }

    /// Like `analyze`, returning `Cancelled` at the first phase boundary after `cancel` fires
    pub async fn analyze_with_cancel(
        &self,
        company_name: &str,
        homepage_url: Option<&str>,
        focus_area: &str,
        cancel: &CancellationToken,
    ) -> Result<AnalysisReport, PipelineError> {
        let run_id = Uuid::new_v4();
        let start_time = Instant::now();
        let company_name = company_name.trim();
        let homepage = homepage_url.and_then(normalize_homepage);
        let focus_area = match focus_area.trim() {
            "" => DEFAULT_FOCUS_AREA,
            focus => focus,
        };

        tracing::info!(
            run_id = %run_id,
            company = %company_name,
            homepage = ?homepage.as_ref().map(Url::as_str),
            focus_area = %focus_area,
            evidence_enabled = self.retriever.is_enabled(),
            "Starting analysis"
        );

        let result = self
            .run(run_id, company_name, homepage, focus_area, cancel)
            .await;
        let elapsed_ms = start_time.elapsed().as_millis();

        match &result {
            Ok(report) => tracing::info!(
                run_id = %run_id,
                company = %report.company.canonical_name,
                industry = %report.industry.label,
                total = report.quality_score.total,
                caveats = report.caveats.len(),
                elapsed_ms = elapsed_ms,
                "Analysis complete"
            ),
            Err(e) => tracing::error!(
                run_id = %run_id,
                company = %company_name,
                reason = e.reason_code(),
                error = %e,
                elapsed_ms = elapsed_ms,
                "Analysis failed"
            ),
        }

        result
    }

    async fn run(
        &self,
        run_id: Uuid,
        company_name: &str,
        homepage: Option<Url>,
        focus_area: &str,
        cancel: &CancellationToken,
    ) -> Result<AnalysisReport, PipelineError> {
        let homepage_str = homepage.as_ref().map(Url::as_str);
        let mut run = RunState::default();

        if !self.retriever.is_enabled() {
            run.caveats.push(Caveat::new(
                CaveatKind::EvidenceUnavailable,
                "No search provider configured; industry and figures rest on the language model alone",
            ));
        }

        // Phase 1
        checkpoint(cancel, "identity")?;
        let identity_evidence = self
            .identity_evidence(&mut run, company_name, homepage_str)
            .await;
        let mut resolution = self
            .resolve_identity(&mut run, company_name, homepage_str, &identity_evidence)
            .await?;

        // Phase 2
        checkpoint(cancel, "extraction")?;
        run.tracker.start(PhaseName::Extraction)?;
        let mut evidence =
            gather_evidence(&self.retriever, &resolution.identity, homepage_str).await;
        run.record_sources(&evidence.snippets);
        let mut extraction = self
            .run_extraction(&mut run, &resolution.identity, &evidence, None, None)
            .await?;

        // Phase 3
        checkpoint(cancel, "validation")?;
        run.tracker.start(PhaseName::Validation)?;
        let mut validation = self.validate(&resolution, &extraction);

        if let Some(target) = validation.retry {
            let target_phase = match target {
                RetryTarget::Identity => PhaseName::Identity,
                RetryTarget::Extraction => PhaseName::Extraction,
            };
            if run.tracker.can_retry(PhaseName::Validation) && run.tracker.can_retry(target_phase) {
                checkpoint(cancel, "validation retry")?;
                let hint = retry_hint(&validation.findings);
                run.tracker.retry(
                    PhaseName::Validation,
                    format!("blocking findings sent back to {:?}", target_phase),
                )?;

                match target {
                    RetryTarget::Identity => {
                        let rerun = self
                            .rerun_identity(
                                &mut run,
                                company_name,
                                homepage_str,
                                &identity_evidence,
                                &hint,
                                &resolution,
                            )
                            .await?;

                        if let Some(new) = rerun {
                            let label_changed =
                                new.identity.industry_label != resolution.identity.industry_label;
                            resolution = new;

                            if label_changed && run.tracker.can_retry(PhaseName::Extraction) {
                                checkpoint(cancel, "extraction retry")?;
                                run.tracker
                                    .retry(PhaseName::Extraction, "industry label changed")?;
                                evidence = gather_evidence(
                                    &self.retriever,
                                    &resolution.identity,
                                    homepage_str,
                                )
                                .await;
                                run.record_sources(&evidence.snippets);
                                extraction = self
                                    .run_extraction(
                                        &mut run,
                                        &resolution.identity,
                                        &evidence,
                                        None,
                                        Some(&extraction),
                                    )
                                    .await?;
                            } else if label_changed {
                                run.tracker.note(
                                    PhaseName::Extraction,
                                    "industry label changed but no retry budget left",
                                );
                            }
                        }
                    }
                    RetryTarget::Extraction => {
                        run.tracker.retry(PhaseName::Extraction, "blocking contradiction")?;
                        extraction = self
                            .run_extraction(
                                &mut run,
                                &resolution.identity,
                                &evidence,
                                Some(&hint),
                                Some(&extraction),
                            )
                            .await?;
                    }
                }

                validation = self.validate(&resolution, &extraction);
            } else {
                tracing::info!(
                    target = ?target_phase,
                    "Retry budget exhausted, keeping blocking findings"
                );
                run.tracker
                    .note(PhaseName::Validation, "retry budget exhausted");
            }
        }

        let mut findings = validation.findings.clone();
        for finding in validation.blocking() {
            run.caveats.push(Caveat::new(
                CaveatKind::ValidationBlocked,
                format!("{}: {}", finding.category.as_str(), finding.detail),
            ));
        }
        for finding in validation.findings.iter().filter(|f| {
            !f.is_blocking() && f.category == FindingCategory::UnsupportedFigure
        }) {
            run.caveats.push(Caveat::new(
                CaveatKind::UnsupportedFigure,
                finding.detail.clone(),
            ));
        }
        for note in &extraction.guard_notes {
            findings.push(ValidationFinding::warning(
                FindingCategory::UnsupportedFigure,
                note.clone(),
            ));
            run.caveats
                .push(Caveat::new(CaveatKind::UnsupportedFigure, note.clone()));
        }
        run.caveats.extend(extraction.caveats.iter().cloned());

        if validation.has_blocking() {
            run.tracker.degraded(
                PhaseName::Validation,
                "blocking findings persist after retry budget",
            )?;
        } else {
            run.tracker.validated(PhaseName::Validation)?;
        }

        // Phase 4
        checkpoint(cancel, "synthesis")?;
        run.tracker.start(PhaseName::Synthesis)?;
        let facts = extraction.facts;
        let synthesis = match self
            .synthesizer
            .synthesize(SynthesisInput {
                identity: Some(&resolution.identity),
                facts: &facts,
                competitors: &validation.competitors,
                dropped: &validation.dropped,
                focus_area,
            })
            .await
        {
            Ok(synthesis) => synthesis,
            Err(e) => {
                run.tracker.failed(PhaseName::Synthesis, e.to_string())?;
                return Err(PipelineError::SynthesisIncomplete(e.to_string()));
            }
        };
        if synthesis.degraded {
            run.tracker
                .degraded(PhaseName::Synthesis, "narrative generation failed")?;
        } else {
            run.tracker.validated(PhaseName::Synthesis)?;
        }
        run.caveats.extend(synthesis.caveats);

        checkpoint(cancel, "report")?;
        let quality_score = self.scorer.score(
            &resolution.identity,
            &facts,
            &findings,
            &synthesis.labeled_estimates,
        );

        let identity = resolution.identity;
        Ok(AnalysisReport {
            run_id,
            generated_at: Utc::now(),
            focus_area: focus_area.to_string(),
            homepage_url: homepage,
            industry: IndustryClassification {
                label: identity.industry_label,
                confidence: identity.industry_confidence,
                resolution_source: identity.resolution_source,
            },
            company: identity,
            evp: synthesis.evp,
            business_analysis: synthesis.business,
            competitors: validation.competitors,
            ir_facts: facts,
            findings,
            quality_score,
            caveats: run.caveats,
            phases: run.tracker.into_records(),
            evidence_sources: run.sources.into_iter().collect(),
        })
    }

    async fn identity_evidence(
        &self,
        run: &mut RunState,
        company_name: &str,
        homepage: Option<&str>,
    ) -> Vec<EvidenceSnippet> {
        let queries = evidence_queries(company_name, homepage);
        let outcomes = self
            .retriever
            .retrieve_many(&queries, self.retriever.max_results())
            .await;

        if self.retriever.is_enabled() && outcomes.iter().all(|o| o.failed()) {
            run.caveats.push(Caveat::new(
                CaveatKind::EvidenceUnavailable,
                "Search failed for every identity query; industry rests on the language model alone",
            ));
        }

        let snippets = dedup_snippets(outcomes.into_iter().flat_map(|o| o.snippets).collect());
        run.record_sources(&snippets);
        snippets
    }

    async fn resolve_identity(
        &self,
        run: &mut RunState,
        company_name: &str,
        homepage: Option<&str>,
        evidence: &[EvidenceSnippet],
    ) -> Result<IdentityResolution, PipelineError> {
        run.tracker.start(PhaseName::Identity)?;
        let mut hint: Option<String> = None;

        loop {
            match self
                .resolver
                .resolve(company_name, homepage, evidence, hint.as_deref())
                .await
            {
                Ok(resolution) => {
                    run.tracker.validated(PhaseName::Identity)?;
                    return Ok(resolution);
                }
                Err(e @ IdentityError::EmptyName) => {
                    run.tracker.failed(PhaseName::Identity, e.to_string())?;
                    return Err(PipelineError::IdentityUnresolved(e.to_string()));
                }
                Err(e) if run.tracker.can_retry(PhaseName::Identity) => {
                    tracing::warn!(company = %company_name, error = %e, "Identity resolution failed, retrying");
                    run.tracker.retry(PhaseName::Identity, e.to_string())?;
                    hint = Some(format!("- previous attempt failed: {}", e));
                }
                Err(e) => {
                    run.tracker.failed(PhaseName::Identity, e.to_string())?;
                    return Err(if e.is_provider_unavailable() {
                        PipelineError::ProviderUnavailable(e.to_string())
                    } else {
                        PipelineError::IdentityUnresolved(e.to_string())
                    });
                }
            }
        }
    }

    /// Validation-triggered re-run. `None` keeps the first resolution.
    async fn rerun_identity(
        &self,
        run: &mut RunState,
        company_name: &str,
        homepage: Option<&str>,
        evidence: &[EvidenceSnippet],
        hint: &str,
        previous: &IdentityResolution,
    ) -> Result<Option<IdentityResolution>, PipelineError> {
        run.tracker
            .retry(PhaseName::Identity, "blocking industry findings")?;

        match self
            .resolver
            .resolve(company_name, homepage, evidence, Some(hint))
            .await
        {
            Ok(resolution) => {
                tracing::info!(
                    previous = %previous.identity.industry_label,
                    current = %resolution.identity.industry_label,
                    "Identity re-resolved"
                );
                run.tracker.validated(PhaseName::Identity)?;
                Ok(Some(resolution))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Identity re-run failed, keeping first resolution");
                run.tracker.degraded(
                    PhaseName::Identity,
                    format!("re-run failed, kept first resolution: {}", e),
                )?;
                Ok(None)
            }
        }
    }

    /// Phase 2 model step. Expects the phase to be `running`.
    ///
    /// A model failure uses the remaining retry, then falls back to
    /// `previous` or to all-unknown facts.
    async fn run_extraction(
        &self,
        run: &mut RunState,
        identity: &CompanyIdentity,
        evidence: &GatheredEvidence,
        hint: Option<&str>,
        previous: Option<&ExtractionOutcome>,
    ) -> Result<ExtractionOutcome, PipelineError> {
        let mut hint = hint.map(str::to_string);

        loop {
            match self
                .extractor
                .extract(identity, evidence, hint.as_deref())
                .await
            {
                Ok(outcome) => {
                    if outcome.caveats.is_empty() {
                        run.tracker.validated(PhaseName::Extraction)?;
                    } else {
                        run.tracker.degraded(
                            PhaseName::Extraction,
                            "evidence retrieval failed for some fields",
                        )?;
                    }
                    return Ok(outcome);
                }
                Err(e) if run.tracker.can_retry(PhaseName::Extraction) => {
                    tracing::warn!(company = %identity.canonical_name, error = %e, "IR extraction failed, retrying");
                    run.tracker.retry(PhaseName::Extraction, e.to_string())?;
                    hint = Some(format!("- previous attempt failed: {}", e));
                }
                Err(e) => {
                    tracing::warn!(company = %identity.canonical_name, error = %e, "IR extraction failed, degrading");
                    run.tracker
                        .degraded(PhaseName::Extraction, e.to_string())?;
                    return Ok(match previous {
                        Some(previous) => {
                            let mut outcome = previous.clone();
                            outcome.caveats.push(Caveat::new(
                                CaveatKind::ExtractionDegraded,
                                format!("IR re-extraction failed, first extraction kept: {}", e),
                            ));
                            outcome
                        }
                        None => ExtractionOutcome {
                            facts: IrField::ALL.iter().copied().map(IrFact::unknown).collect(),
                            caveats: vec![Caveat::new(
                                CaveatKind::ExtractionDegraded,
                                format!("IR extraction failed, all fields unknown: {}", e),
                            )],
                            ..Default::default()
                        },
                    });
                }
            }
        }
    }

    fn validate(
        &self,
        resolution: &IdentityResolution,
        extraction: &ExtractionOutcome,
    ) -> ValidationOutcome {
        let competitors = merge_competitors(
            resolution.competitors.clone(),
            extraction.competitors.clone(),
        );
        self.validator
            .validate(&resolution.identity, &extraction.facts, &competitors)
    }
}

/// Cooperative cancellation point; phases already started always finish
fn checkpoint(cancel: &CancellationToken, next: &str) -> Result<(), PipelineError> {
    if cancel.is_cancelled() {
        tracing::info!(next_phase = next, "Cancellation observed at phase boundary");
        return Err(PipelineError::Cancelled);
    }
    Ok(())
}

/// Accepts bare domains; anything that still fails to parse is ignored
fn normalize_homepage(raw: &str) -> Option<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let candidate = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{}", raw)
    };
    match Url::parse(&candidate) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() => {
            Some(url)
        }
        _ => {
            tracing::warn!(homepage = %raw, "Ignoring invalid homepage URL");
            None
        }
    }
}
