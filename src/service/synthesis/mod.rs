//! Report synthesis (Phase 4 narrative)
//!
//! The model writes the nine narrative sections. Post-processing renders fact
//! placeholders, marks leaked estimates, redacts dropped competitors and
//! appends the estimate disclosure list.

use std::collections::BTreeSet;

use rig::providers::openai;

use crate::model::extraction::ExtractedNarrative;
use crate::model::{
    BusinessSections, Caveat, CaveatKind, CompanyIdentity, CompetitorCandidate, EvpSections,
    IrFact, IrField,
};
use crate::service::llm::{CompletionRequest, LanguageModel, ModelGateway, ModelTask};

pub mod error;
pub mod prompts;
pub mod render;

pub use error::SynthesisError;

use prompts::{SYNTHESIS_SYSTEM_PROMPT, build_synthesis_prompt};
use render::{annotate_leaks, estimate_disclosure, redact_competitors, render_placeholders};

/// Environment variable for the synthesis model (defaults to gpt-4o-mini if not set)
const ENV_SYNTHESIS_MODEL: &str = "SYNTHESIS_MODEL";

const DEFAULT_MODEL: &str = openai::GPT_4O_MINI;

pub struct SynthesisInput<'a> {
    pub identity: Option<&'a CompanyIdentity>,
    pub facts: &'a [IrFact],
    /// Competitors that survived validation
    pub competitors: &'a [CompetitorCandidate],
    /// Competitors removed for industry mismatch
    pub dropped: &'a [CompetitorCandidate],
    pub focus_area: &'a str,
}

#[derive(Debug, Clone, Default)]
pub struct SynthesisOutcome {
    pub evp: EvpSections,
    pub business: BusinessSections,
    /// Estimated fields explicitly marked as estimates in the narrative
    pub labeled_estimates: BTreeSet<IrField>,
    pub caveats: Vec<Caveat>,
    pub degraded: bool,
}

pub struct Synthesizer<M> {
    gateway: ModelGateway<M>,
    model: String,
}

impl<M: LanguageModel> Synthesizer<M> {
    /// Uses SYNTHESIS_MODEL when set
    pub fn new(gateway: ModelGateway<M>) -> Self {
        let model =
            std::env::var(ENV_SYNTHESIS_MODEL).unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Self::with_model(gateway, model)
    }

    pub fn with_model(gateway: ModelGateway<M>, model: impl Into<String>) -> Self {
        let model = model.into();
        tracing::info!(model = %model, "Synthesizer initialized");
        Self { gateway, model }
    }

    pub async fn synthesize(
        &self,
        input: SynthesisInput<'_>,
    ) -> Result<SynthesisOutcome, SynthesisError> {
        let identity = input.identity.ok_or(SynthesisError::MissingIdentity)?;

        let request = CompletionRequest {
            task: ModelTask::Synthesis,
            model: self.model.clone(),
            preamble: SYNTHESIS_SYSTEM_PROMPT,
            prompt: build_synthesis_prompt(
                identity,
                input.facts,
                input.competitors,
                input.focus_area,
            ),
        };

        let outcome = match self.gateway.extract::<ExtractedNarrative>(request).await {
            Ok(narrative) => post_process(narrative, input.facts, input.dropped),
            Err(e) => {
                tracing::warn!(
                    company = %identity.canonical_name,
                    error = %e,
                    "Synthesis failed, emitting placeholder sections"
                );
                degraded(input.facts, &e.to_string())
            }
        };

        tracing::info!(
            company = %identity.canonical_name,
            degraded = outcome.degraded,
            labeled_estimates = outcome.labeled_estimates.len(),
            corrections = outcome.caveats.len(),
            "Synthesis complete"
        );

        Ok(outcome)
    }
}

/// Accumulates what post-processing changed across sections
#[derive(Default)]
struct Corrections {
    labeled: BTreeSet<IrField>,
    leaked: BTreeSet<IrField>,
    redacted: BTreeSet<String>,
}

impl Corrections {
    fn apply(&mut self, text: &str, facts: &[IrFact], dropped: &[CompetitorCandidate]) -> String {
        let (text, leaked) = annotate_leaks(text, facts);
        let (text, labeled) = render_placeholders(&text, facts);
        let (text, redacted) = redact_competitors(&text, dropped);
        self.leaked.extend(leaked);
        self.labeled.extend(labeled);
        self.redacted.extend(redacted);
        text.trim().to_string()
    }
}

fn post_process(
    narrative: ExtractedNarrative,
    facts: &[IrFact],
    dropped: &[CompetitorCandidate],
) -> SynthesisOutcome {
    let mut c = Corrections::default();
    let evp = EvpSections {
        rewards: c.apply(&narrative.evp.rewards, facts, dropped),
        opportunity: c.apply(&narrative.evp.opportunity, facts, dropped),
        organization: c.apply(&narrative.evp.organization, facts, dropped),
        people: c.apply(&narrative.evp.people, facts, dropped),
        work: c.apply(&narrative.evp.work, facts, dropped),
    };
    let b = &narrative.business_analysis;
    let business = BusinessSections {
        industry_market: c.apply(&b.industry_market, facts, dropped),
        market_position: c.apply(&b.market_position, facts, dropped),
        differentiation: c.apply(&b.differentiation, facts, dropped),
        business_portfolio: c.apply(&b.business_portfolio, facts, dropped),
    };

    let mut caveats = Vec::new();
    if !c.leaked.is_empty() {
        caveats.push(Caveat::new(
            CaveatKind::NarrativeCorrected,
            format!(
                "Estimated figures written outside fact references were marked as estimates: {}",
                c.leaked
                    .iter()
                    .map(IrField::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        ));
    }
    if !c.redacted.is_empty() {
        caveats.push(Caveat::new(
            CaveatKind::NarrativeCorrected,
            format!(
                "Out-of-industry companies removed from the narrative: {}",
                c.redacted.iter().cloned().collect::<Vec<_>>().join(", ")
            ),
        ));
    }

    let mut labeled = c.labeled;
    labeled.extend(c.leaked);

    let mut outcome = SynthesisOutcome {
        evp,
        business,
        labeled_estimates: labeled,
        caveats,
        degraded: false,
    };
    append_disclosure(&mut outcome, facts);
    outcome
}

fn degraded(facts: &[IrFact], reason: &str) -> SynthesisOutcome {
    let notice = |section: &str| format!("Insufficient information to assess {}.", section);
    let mut outcome = SynthesisOutcome {
        evp: EvpSections {
            rewards: notice("rewards"),
            opportunity: notice("opportunity"),
            organization: notice("organization"),
            people: notice("people"),
            work: notice("work"),
        },
        business: BusinessSections {
            industry_market: notice("the industry market"),
            market_position: notice("market position"),
            differentiation: notice("differentiation"),
            business_portfolio: notice("the business portfolio"),
        },
        labeled_estimates: BTreeSet::new(),
        caveats: vec![Caveat::new(
            CaveatKind::SynthesisDegraded,
            format!("Narrative generation failed: {}", reason),
        )],
        degraded: true,
    };
    append_disclosure(&mut outcome, facts);
    outcome
}

/// Appends the estimate list to the portfolio section.
///
/// Leaves `labeled_estimates` alone; only the model-written sections count toward it.
fn append_disclosure(outcome: &mut SynthesisOutcome, facts: &[IrFact]) {
    let Some(list) = estimate_disclosure(facts) else {
        return;
    };
    let portfolio = &mut outcome.business.business_portfolio;
    if !portfolio.is_empty() {
        portfolio.push_str("\n\n");
    }
    portfolio.push_str(&list);
}
