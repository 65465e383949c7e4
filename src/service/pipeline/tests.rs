use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::*;
use crate::model::evidence::snippet_id;
use crate::model::{IndustryLabel, PhaseState, ResolutionSource, RetrieverConfig};
use crate::retriever::SearchProvider;
use crate::service::llm::{LlmError, ModelTask};
use crate::service::testing::{ScriptedModel, ScriptedSearch, gateway};

const PROFILE_URL: &str = "https://www.recruitco.example/company";
const PROFILE_TEXT: &str = "RecruitCo is a staffing and recruitment group operating job search platforms and human resources services.";
const IR_URL: &str = "https://ir.recruitco.example/results";
const IR_TEXT: &str = "FY2024 consolidated results: revenue 34,164 hundred million yen, operating income 4,000, net income 3,000, 49,000 employees, market capitalization 150,000, revenue growth 0.5%, operating margin 11.7%, segments HR Technology 12,000, Staffing 14,000, Matching 8,000.";

fn ir_snippet_id() -> String {
    snippet_id(&Url::parse(IR_URL).unwrap(), IR_TEXT)
}

fn recruit_search() -> ScriptedSearch {
    ScriptedSearch::new()
        .with_hits("company profile", &[(PROFILE_URL, PROFILE_TEXT)])
        .with_hits("investor relations", &[(IR_URL, IR_TEXT)])
}

fn enabled(search: ScriptedSearch) -> EvidenceRetriever {
    EvidenceRetriever::new(Some(Arc::new(search)), None, RetrieverConfig::default())
}

fn pipeline(model: &Arc<ScriptedModel>, retriever: EvidenceRetriever) -> Pipeline<ScriptedModel> {
    Pipeline::from_gateway(gateway(Arc::clone(model)), retriever, &Config::default())
}

fn identity_json(name: &str, label: Option<&str>, confidence: f64, competitors: &[(&str, &str)]) -> Value {
    let competitors: Vec<Value> = competitors
        .iter()
        .map(|(name, industry)| {
            json!({ "name": name, "industry": industry, "rationale": "similar customer base" })
        })
        .collect();
    json!({
        "canonical_name": name,
        "industry": label,
        "alternative_industries": [],
        "confidence": confidence,
        "competitors": competitors
    })
}

fn fact(
    field: &str,
    amount: f64,
    unit: &str,
    provenance: &str,
    citation: Option<&str>,
    rationale: Option<&str>,
) -> Value {
    json!({
        "field": field,
        "amount": amount,
        "unit": unit,
        "provenance": provenance,
        "citation_id": citation,
        "estimation_rationale": rationale
    })
}

fn disclosed(field: &str, amount: f64, unit: &str, excerpt: &str) -> Value {
    let id = ir_snippet_id();
    let mut value = fact(field, amount, unit, "ir_disclosed", Some(id.as_str()), None);
    value["excerpt"] = json!(excerpt);
    value
}

fn recruit_facts() -> Value {
    json!({
        "facts": [
            disclosed("revenue", 34_164.0, "jpy_hundred_million", "revenue 34,164 hundred million yen"),
            disclosed("operating_income", 4_000.0, "jpy_hundred_million", "operating income 4,000"),
            disclosed("net_income", 3_000.0, "jpy_hundred_million", "net income 3,000"),
            disclosed("headcount", 49_000.0, "persons", "49,000 employees"),
            disclosed("market_capitalization", 150_000.0, "jpy_hundred_million", "market capitalization 150,000"),
            disclosed("revenue_growth_rate", 0.5, "percent", "revenue growth 0.5%"),
            disclosed("operating_margin", 11.7, "percent", "operating margin 11.7%"),
            {
                "field": "segment_breakdown",
                "segments": [
                    { "name": "HR Technology", "amount": 12_000.0 },
                    { "name": "Staffing", "amount": 14_000.0 },
                    { "name": "Matching", "amount": 8_000.0 }
                ],
                "unit": "jpy_hundred_million",
                "provenance": "ir_disclosed",
                "citation_id": ir_snippet_id(),
                "excerpt": "segments HR Technology 12,000, Staffing 14,000, Matching 8,000."
            }
        ],
        "competitors": []
    })
}

fn narrative() -> Value {
    json!({
        "evp": {
            "rewards": "Pay is competitive for the staffing sector.",
            "opportunity": "Broad internal mobility across {{fact:headcount}} employees.",
            "organization": "Revenue of {{fact:revenue}} reflects a stable platform.",
            "people": "Collaborative teams.",
            "work": "Flexible work arrangements."
        },
        "business_analysis": {
            "industry_market": "Staffing demand keeps growing.",
            "market_position": "Ahead of Persol and Sumitomo Realty in scale.",
            "differentiation": "Job platforms at scale.",
            "business_portfolio": "HR technology, matching and staffing."
        }
    })
}

fn recruit_model() -> ScriptedModel {
    ScriptedModel::new()
        .with_response(
            ModelTask::Identity,
            identity_json(
                "RecruitCo Holdings",
                Some("hr_staffing"),
                0.9,
                &[
                    ("Persol Holdings", "hr_staffing"),
                    ("Adecco Group", "hr_staffing"),
                    ("Sumitomo Realty", "real_estate"),
                ],
            ),
        )
        .with_response(ModelTask::Extraction, recruit_facts())
        .with_response(ModelTask::Synthesis, narrative())
}

#[tokio::test]
async fn test_staffing_company_with_rich_evidence() {
    let model = Arc::new(recruit_model());
    let report = pipeline(&model, enabled(recruit_search()))
        .analyze("RecruitCo", Some("https://www.recruitco.example"), "new graduate hiring")
        .await
        .unwrap();

    assert_eq!(report.industry.label, IndustryLabel::HrStaffing);
    assert_eq!(report.industry.resolution_source, ResolutionSource::EvidenceBacked);
    assert!(report.company.ambiguous);

    assert_eq!(report.competitors.len(), 2);
    assert!(
        report
            .competitors
            .iter()
            .all(|c| c.industry_label == IndustryLabel::HrStaffing)
    );
    assert!(!report.business_analysis.market_position.contains("Sumitomo"));
    assert!(
        report
            .findings
            .iter()
            .all(|f| f.category != FindingCategory::IndustryMismatch)
    );

    assert_eq!(report.ir_facts.len(), IrField::ALL.len());
    assert!(
        report
            .ir_facts
            .iter()
            .all(|f| f.provenance.citation().is_some())
    );
    assert!(
        report
            .evp
            .organization
            .contains(&format!("(IR: {})", IR_URL))
    );
    assert!(report.quality_score.total >= 85, "total {}", report.quality_score.total);
    assert!(!report.quality_score.capped);

    assert!(report.evidence_sources.contains(&Url::parse(IR_URL).unwrap()));
    assert_eq!(report.focus_area, "new graduate hiring");
    assert_eq!(model.calls(ModelTask::Identity), 1);
    assert_eq!(model.calls(ModelTask::Extraction), 1);
    assert_eq!(
        report.phase(PhaseName::Identity).unwrap().state,
        PhaseState::Validated
    );
}

#[tokio::test]
async fn test_no_evidence_runs_model_only_and_capped() {
    let model = Arc::new(
        ScriptedModel::new()
            .with_response(
                ModelTask::Identity,
                identity_json(
                    "Acme Staffing Inc.",
                    Some("hr_staffing"),
                    0.9,
                    &[("Pasona Group", "hr_staffing"), ("Randstad", "hr_staffing")],
                ),
            )
            .with_response(
                ModelTask::Extraction,
                json!({
                    "facts": [
                        fact(
                            "revenue",
                            1_200.0,
                            "usd_million",
                            "ir_disclosed",
                            Some("ev-000000000000"),
                            Some("Scaled from peer staffing firms of similar size"),
                        ),
                        fact(
                            "headcount",
                            5_000.0,
                            "persons",
                            "estimated",
                            None,
                            Some("Typical headcount for a mid-size staffing firm"),
                        ),
                    ]
                }),
            )
            .with_response(ModelTask::Synthesis, narrative()),
    );
    let report = pipeline(&model, EvidenceRetriever::disabled())
        .analyze("Acme Staffing", None, "")
        .await
        .unwrap();

    assert_eq!(report.company.resolution_source, ResolutionSource::ModelOnly);
    assert!(report.company.industry_confidence <= 0.7);
    assert!(report.ir_facts.iter().all(|f| !f.provenance.is_disclosed()));
    assert!(
        report
            .ir_facts
            .iter()
            .any(|f| f.field == IrField::Revenue && f.provenance.is_estimated())
    );
    assert!(
        report
            .caveats
            .iter()
            .any(|c| c.kind == CaveatKind::EvidenceUnavailable)
    );
    assert!(
        report
            .findings
            .iter()
            .any(|f| f.category == FindingCategory::UnsupportedFigure && !f.is_blocking())
    );
    assert_eq!(report.quality_score.factual_basis_ratio, 0.0);
    assert_eq!(report.quality_score.speculation_disclosure_rate, 1.0);
    assert!(report.quality_score.total <= 70);
    assert!(
        report
            .business_analysis
            .business_portfolio
            .contains("Estimated figures")
    );
    assert!(report.evidence_sources.is_empty());
    assert_eq!(report.focus_area, DEFAULT_FOCUS_AREA);
}

#[tokio::test]
async fn test_industry_mismatch_retried_once_then_contradiction_recorded() {
    let competitors = [
        ("Pasona Group", "hr_staffing"),
        ("Randstad", "hr_staffing"),
        ("Adecco Group", "hr_staffing"),
    ];
    let estimate = Some("Estimated from peer staffing firms of similar size");
    let model = Arc::new(
        ScriptedModel::new()
            .with_response(
                ModelTask::Identity,
                identity_json("Acme Staffing", Some("real_estate"), 0.4, &competitors),
            )
            .with_response(
                ModelTask::Identity,
                identity_json("Acme Staffing", Some("hr_staffing"), 0.65, &competitors),
            )
            .with_response(
                ModelTask::Extraction,
                json!({ "facts": [
                    fact("revenue", 1_200.0, "usd_million", "estimated", None, estimate),
                    fact("operating_income", 100.0, "usd_million", "estimated", None, estimate),
                ]}),
            )
            .with_response(
                ModelTask::Extraction,
                json!({ "facts": [
                    fact("revenue", 1_200.0, "usd_million", "estimated", None, estimate),
                    fact("operating_income", 1_500.0, "usd_million", "estimated", None, estimate),
                ]}),
            )
            .with_response(ModelTask::Synthesis, narrative()),
    );
    let report = pipeline(&model, EvidenceRetriever::disabled())
        .analyze("Acme Staffing", None, "general")
        .await
        .unwrap();

    assert_eq!(report.industry.label, IndustryLabel::HrStaffing);
    assert!(
        report
            .findings
            .iter()
            .all(|f| f.category != FindingCategory::IndustryMismatch)
    );
    assert_eq!(report.competitors.len(), 3);

    let identity = report.phase(PhaseName::Identity).unwrap();
    assert_eq!(identity.retries_used, 1);
    assert_eq!(identity.retries_remaining(), 0);
    let validation = report.phase(PhaseName::Validation).unwrap();
    assert_eq!(validation.retries_remaining(), 0);
    assert_eq!(validation.state, PhaseState::Degraded);

    // The contradiction from the re-extraction is recorded, not retried
    assert!(
        report
            .findings
            .iter()
            .any(|f| f.category == FindingCategory::Contradiction && f.is_blocking())
    );
    assert!(report.caveats.iter().any(|c| {
        c.kind == CaveatKind::ValidationBlocked && c.detail.starts_with("contradiction")
    }));
    assert_eq!(model.calls(ModelTask::Identity), 2);
    assert_eq!(model.calls(ModelTask::Extraction), 2);
    assert!(model.prompts(ModelTask::Identity)[1].contains("industry_mismatch"));
}

#[tokio::test]
async fn test_figure_without_citation_or_rationale_is_excluded() {
    let model = Arc::new(
        ScriptedModel::new()
            .with_response(
                ModelTask::Identity,
                identity_json("RecruitCo Holdings", Some("hr_staffing"), 0.9, &[]),
            )
            .with_response(
                ModelTask::Extraction,
                json!({ "facts": [
                    fact("revenue", 34_164.0, "jpy_hundred_million", "ir_disclosed", None, None),
                    disclosed("headcount", 49_000.0, "persons", "49,000 employees"),
                ]}),
            )
            .with_response(ModelTask::Synthesis, narrative()),
    );
    let report = pipeline(&model, enabled(recruit_search()))
        .analyze("RecruitCo", None, "general")
        .await
        .unwrap();

    assert!(report.ir_facts.iter().all(|f| f.field != IrField::Revenue));
    assert!(
        report
            .ir_facts
            .iter()
            .any(|f| f.field == IrField::Headcount && f.provenance.is_disclosed())
    );
    assert!(report.findings.iter().any(|f| {
        f.category == FindingCategory::UnsupportedFigure && f.detail.starts_with("revenue")
    }));
    // Placeholder for the excluded figure renders as not disclosed
    assert!(report.evp.organization.contains("not disclosed"));
}

#[tokio::test]
async fn test_provider_unavailable_is_fatal() {
    let model = Arc::new(ScriptedModel::new());
    let err = pipeline(&model, EvidenceRetriever::disabled())
        .analyze("RecruitCo", None, "general")
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::ProviderUnavailable(_)));
    assert_eq!(err.reason_code(), "provider_unavailable");
    assert_eq!(model.calls(ModelTask::Identity), 2);
    assert_eq!(model.calls(ModelTask::Extraction), 0);
}

#[tokio::test]
async fn test_unresolvable_identity_is_fatal_after_retry() {
    let model = Arc::new(ScriptedModel::new().with_response(
        ModelTask::Identity,
        identity_json("Zeta Widgets", None, 0.2, &[]),
    ));
    let err = pipeline(&model, EvidenceRetriever::disabled())
        .analyze("Zeta Widgets", None, "general")
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::IdentityUnresolved(_)));
    assert_eq!(err.reason_code(), "identity_unresolved");
    assert_eq!(model.calls(ModelTask::Identity), 2);
}

#[tokio::test]
async fn test_extraction_failure_degrades_to_unknown() {
    let model = Arc::new(
        ScriptedModel::new()
            .with_response(
                ModelTask::Identity,
                identity_json("RecruitCo Holdings", Some("hr_staffing"), 0.9, &[]),
            )
            .with_error(
                ModelTask::Extraction,
                LlmError::MalformedOutput("truncated json".into()),
            )
            .with_response(ModelTask::Synthesis, narrative()),
    );
    let report = pipeline(&model, enabled(recruit_search()))
        .analyze("RecruitCo", None, "general")
        .await
        .unwrap();

    assert_eq!(model.calls(ModelTask::Extraction), 2);
    assert_eq!(report.ir_facts.len(), IrField::ALL.len());
    assert!(report.ir_facts.iter().all(|f| f.provenance.is_unknown()));
    assert_eq!(report.quality_score.ir_coverage_ratio, 0.0);
    assert!(
        report
            .caveats
            .iter()
            .any(|c| c.kind == CaveatKind::ExtractionDegraded)
    );
    assert_eq!(
        report.phase(PhaseName::Extraction).unwrap().state,
        PhaseState::Degraded
    );
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let model = Arc::new(recruit_model());
    let search = Arc::new(recruit_search());
    let provider: Arc<dyn SearchProvider> = search.clone();
    let retriever = EvidenceRetriever::new(Some(provider), None, RetrieverConfig::default());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = pipeline(&model, retriever)
        .analyze_with_cancel("RecruitCo", None, "general", &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Cancelled));
    assert_eq!(err.reason_code(), "cancelled");
    assert_eq!(model.calls(ModelTask::Identity), 0);
    assert_eq!(search.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_extraction_waits_for_phase_boundary() {
    let model = Arc::new(recruit_model().with_delay(ModelTask::Extraction, Duration::from_secs(5)));
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });

    let started = tokio::time::Instant::now();
    let err = pipeline(&model, enabled(recruit_search()))
        .analyze_with_cancel("RecruitCo", None, "general", &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Cancelled));
    // Extraction ran to completion before the checkpoint stopped the run
    assert!(started.elapsed() >= Duration::from_secs(5));
    assert_eq!(model.calls(ModelTask::Identity), 1);
    assert_eq!(model.calls(ModelTask::Extraction), 1);
    assert_eq!(model.calls(ModelTask::Synthesis), 0);
}

#[tokio::test]
async fn test_identical_inputs_score_identically() {
    let first = pipeline(&Arc::new(recruit_model()), enabled(recruit_search()))
        .analyze("RecruitCo", None, "general")
        .await
        .unwrap();
    let second = pipeline(&Arc::new(recruit_model()), enabled(recruit_search()))
        .analyze("RecruitCo", None, "general")
        .await
        .unwrap();

    assert_eq!(first.quality_score, second.quality_score);
    assert_eq!(first.ir_facts, second.ir_facts);
    assert_eq!(first.findings, second.findings);
    assert_ne!(first.run_id, second.run_id);
}

#[tokio::test]
async fn test_concurrent_runs_share_one_pipeline() {
    let model = Arc::new(recruit_model());
    let pipeline = pipeline(&model, enabled(recruit_search()));

    let (a, b) = tokio::join!(
        pipeline.analyze("RecruitCo", None, "engineering"),
        pipeline.analyze("RecruitCo", None, "sales"),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.focus_area, "engineering");
    assert_eq!(b.focus_area, "sales");
    assert_eq!(a.quality_score.total, b.quality_score.total);
    assert_eq!(model.calls(ModelTask::Identity), 2);
}

#[test]
fn test_normalize_homepage() {
    assert_eq!(
        normalize_homepage("recruitco.example").unwrap().as_str(),
        "https://recruitco.example/"
    );
    assert!(normalize_homepage("  ").is_none());
    assert!(normalize_homepage("ftp://files.example").is_none());
}
