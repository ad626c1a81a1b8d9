//! Decision pipeline - stage sequencing and final reduction
//!
//! Runs a case through five stages, strictly one after another:
//! 1. [`CandidateGenerator`] proposes labeled candidates
//! 2. [`Enricher`] refines confidence from reference lookups (concurrent)
//! 3. [`Reviewer`] applies the veto policy (concurrent)
//! 4. [`Validator`] checks consistency of non-vetoed candidates (concurrent)
//! 5. [`explain`] writes one rationale per candidate
//!
//! Each concurrent stage finishes completely before the next one starts.
//! Only invalid input and broken invariants abort a run; collaborator
//! failures end up in the affected candidate's record.

mod enricher;
mod explainer;
mod fanout;
mod generator;
mod reviewer;
mod validator;

pub use enricher::Enricher;
pub use explainer::{explain, rationale};
pub use generator::{CandidateGenerator, Rule, RuleSet, Trigger};
pub use reviewer::Reviewer;
pub use validator::Validator;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::case::{Case, Decision, History, ValidatedCandidate, Verdict};
use crate::collaborators::{
    EnrichmentService, KnowledgeGraph, KnowledgeStore, MockEnrichment, enrichment_from_config,
};
use crate::config::PipelineConfig;
use crate::confidence::{ConfidenceEstimator, ThompsonEstimator};
use crate::error::{ConfigError, PipelineError};
use crate::policy::{BernoulliPolicy, DecisionPolicy, RiskVetoPolicy};

// ============================================================================
// Outcome
// ============================================================================

/// Wall-clock time spent per stage, in milliseconds
#[derive(Debug, Clone, Default, Serialize)]
pub struct StageTimings {
    pub generate_ms: u64,
    pub enrich_ms: u64,
    pub review_ms: u64,
    pub validate_ms: u64,
    pub explain_ms: u64,
    pub total_ms: u64,
}

/// Everything a run produced
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub run_id: Uuid,
    pub case_id: String,
    pub started_at: DateTime<Utc>,
    /// Accepted candidates, in candidate order
    pub decisions: Vec<Decision>,
    /// One rationale per candidate, including vetoed and invalid ones
    pub explanations: Vec<String>,
    /// Final per-candidate records
    pub candidates: Vec<ValidatedCandidate>,
    pub timings: StageTimings,
}

impl PipelineOutcome {
    /// Split into (decisions, explanations)
    pub fn into_parts(self) -> (Vec<Decision>, Vec<String>) {
        (self.decisions, self.explanations)
    }

    pub fn vetoed_count(&self) -> usize {
        self.candidates.iter().filter(|c| c.is_vetoed()).count()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|e| {
            serde_json::json!({ "run_id": self.run_id, "error": e.to_string() })
        })
    }
}

// ============================================================================
// Pipeline
// ============================================================================

pub struct Pipeline {
    generator: CandidateGenerator,
    enricher: Enricher,
    reviewer: Reviewer,
    validator: Validator,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// Build the production pipeline described by a config
    pub fn from_config(config: &PipelineConfig) -> Result<Self, ConfigError> {
        Ok(PipelineBuilder::from_config(config)?.build())
    }

    /// Run one case through all stages
    ///
    /// `history` feeds the confidence estimator and is only read.
    pub async fn run(
        &self,
        case: &Case,
        history: &History,
    ) -> Result<PipelineOutcome, PipelineError> {
        if let Err(e) = case.validate() {
            warn!(case_id = %case.id, "Rejecting case: {}", e);
            return Err(e);
        }

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let run_start = Instant::now();
        let mut timings = StageTimings::default();

        info!(%run_id, case_id = %case.id, "Pipeline run started");

        // Stage 1
        let stage = Instant::now();
        let candidates = self.generator.generate(case, history);
        timings.generate_ms = elapsed_ms(stage);
        let labels: Vec<String> = candidates.iter().map(|c| c.label().to_string()).collect();
        info!(%run_id, candidates = labels.len(), "Candidates generated");

        // Stage 2
        let stage = Instant::now();
        let scored = self.enricher.enrich(candidates).await?;
        timings.enrich_ms = elapsed_ms(stage);
        check_stage(
            run_id,
            "enrichment",
            &labels,
            scored.iter().map(|c| (c.label(), c.confidence())),
        )?;

        // Stage 3
        let stage = Instant::now();
        let reviewed = self.reviewer.review(scored).await?;
        timings.review_ms = elapsed_ms(stage);
        check_stage(
            run_id,
            "review",
            &labels,
            reviewed.iter().map(|c| (c.label(), c.confidence())),
        )?;

        // Stage 4
        let stage = Instant::now();
        let validated = self.validator.validate(reviewed).await?;
        timings.validate_ms = elapsed_ms(stage);
        check_stage(
            run_id,
            "validation",
            &labels,
            validated.iter().map(|c| (c.label(), c.confidence())),
        )?;
        if let Some(c) = validated.iter().find(|c| c.is_vetoed() && c.is_valid()) {
            return Err(fail(run_id, format!("vetoed candidate '{}' marked valid", c.label())));
        }

        // Stage 5
        let stage = Instant::now();
        let explanations = explain(&validated);
        timings.explain_ms = elapsed_ms(stage);
        if explanations.len() != validated.len() {
            return Err(fail(
                run_id,
                format!(
                    "{} explanations for {} candidates",
                    explanations.len(),
                    validated.len()
                ),
            ));
        }

        let decisions: Vec<Decision> = validated
            .iter()
            .zip(&explanations)
            .filter(|(c, _)| c.verdict() == Verdict::Accepted)
            .map(|(c, explanation)| Decision {
                label: c.label().to_string(),
                confidence: c.confidence(),
                explanation: explanation.clone(),
            })
            .collect();

        timings.total_ms = elapsed_ms(run_start);
        info!(
            %run_id,
            accepted = decisions.len(),
            candidates = validated.len(),
            total_ms = timings.total_ms,
            "Pipeline run finished"
        );

        Ok(PipelineOutcome {
            run_id,
            case_id: case.id.clone(),
            started_at,
            decisions,
            explanations,
            candidates: validated,
            timings,
        })
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

fn fail(run_id: Uuid, msg: String) -> PipelineError {
    error!(%run_id, "{}", msg);
    PipelineError::invariant(msg)
}

/// Same labels in the same order, confidences inside [0, 1]
fn check_stage<'a>(
    run_id: Uuid,
    stage: &str,
    expected: &[String],
    produced: impl Iterator<Item = (&'a str, f64)>,
) -> Result<(), PipelineError> {
    let mut count = 0;
    for (index, (label, confidence)) in produced.enumerate() {
        count += 1;
        match expected.get(index) {
            Some(want) if want == label => {}
            Some(want) => {
                return Err(fail(
                    run_id,
                    format!(
                        "{} reordered candidates: #{} is '{}', expected '{}'",
                        stage, index, label, want
                    ),
                ));
            }
            None => {
                return Err(fail(run_id, format!("{} produced extra candidate '{}'", stage, label)));
            }
        }
        if !(0.0..=1.0).contains(&confidence) {
            return Err(fail(
                run_id,
                format!("{} left confidence {} for '{}' outside [0, 1]", stage, confidence, label),
            ));
        }
    }
    if count != expected.len() {
        return Err(fail(
            run_id,
            format!("{} returned {} of {} candidates", stage, count, expected.len()),
        ));
    }
    Ok(())
}

// ============================================================================
// Builder
// ============================================================================

/// Assembles a [`Pipeline`] from parts; unset parts use production defaults
pub struct PipelineBuilder {
    rules: RuleSet,
    estimator: Arc<dyn ConfidenceEstimator>,
    enrichment: Arc<dyn EnrichmentService>,
    knowledge: Arc<dyn KnowledgeStore>,
    veto: Arc<dyn DecisionPolicy>,
    secondary: Arc<dyn DecisionPolicy>,
    enrichment_timeout: Duration,
    knowledge_timeout: Duration,
    review_latency: Duration,
    validation_latency: Duration,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        let config = PipelineConfig::default();
        Self {
            rules: RuleSet::default(),
            estimator: Arc::new(ThompsonEstimator::new()),
            enrichment: Arc::new(MockEnrichment::new(config.mock_latency())),
            knowledge: Arc::new(KnowledgeGraph::seeded()),
            veto: Arc::new(RiskVetoPolicy::default()),
            secondary: Arc::new(BernoulliPolicy::default()),
            enrichment_timeout: config.enrichment_timeout(),
            knowledge_timeout: config.knowledge_timeout(),
            review_latency: Duration::ZERO,
            validation_latency: Duration::ZERO,
        }
    }
}

impl PipelineBuilder {
    /// Production parts described by a config
    ///
    /// Rule and knowledge files are loaded here, so a bad file fails at
    /// startup instead of mid-run. Callers may still override parts.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let rules = match &config.rules_path {
            Some(path) => RuleSet::load(path)?,
            None => RuleSet::default(),
        };
        let knowledge = match &config.knowledge_path {
            Some(path) => KnowledgeGraph::load(path)?,
            None => KnowledgeGraph::seeded(),
        };

        info!(
            rules = rules.len(),
            knowledge_nodes = knowledge.node_count(),
            enrichment = ?config.enrichment_mode,
            "Pipeline configured"
        );

        Ok(Self::default()
            .rules(rules)
            .enrichment_service(enrichment_from_config(config))
            .knowledge_store(Arc::new(knowledge))
            .veto_policy(RiskVetoPolicy::new(config.veto_threshold, config.veto_probability))
            .secondary_policy(BernoulliPolicy::new(config.secondary_pass_probability))
            .enrichment_timeout(config.enrichment_timeout())
            .knowledge_timeout(config.knowledge_timeout())
            .review_latency(config.review_latency())
            .validation_latency(config.validation_latency()))
    }

    pub fn rules(mut self, rules: RuleSet) -> Self {
        self.rules = rules;
        self
    }

    pub fn estimator(mut self, estimator: impl ConfidenceEstimator + 'static) -> Self {
        self.estimator = Arc::new(estimator);
        self
    }

    pub fn enrichment_service(mut self, service: Arc<dyn EnrichmentService>) -> Self {
        self.enrichment = service;
        self
    }

    pub fn knowledge_store(mut self, store: Arc<dyn KnowledgeStore>) -> Self {
        self.knowledge = store;
        self
    }

    pub fn veto_policy(mut self, policy: impl DecisionPolicy + 'static) -> Self {
        self.veto = Arc::new(policy);
        self
    }

    pub fn secondary_policy(mut self, policy: impl DecisionPolicy + 'static) -> Self {
        self.secondary = Arc::new(policy);
        self
    }

    pub fn enrichment_timeout(mut self, timeout: Duration) -> Self {
        self.enrichment_timeout = timeout;
        self
    }

    pub fn knowledge_timeout(mut self, timeout: Duration) -> Self {
        self.knowledge_timeout = timeout;
        self
    }

    pub fn review_latency(mut self, latency: Duration) -> Self {
        self.review_latency = latency;
        self
    }

    pub fn validation_latency(mut self, latency: Duration) -> Self {
        self.validation_latency = latency;
        self
    }

    pub fn build(self) -> Pipeline {
        Pipeline {
            generator: CandidateGenerator::new(self.rules, self.estimator),
            enricher: Enricher::new(self.enrichment, self.enrichment_timeout),
            reviewer: Reviewer::new(self.veto, self.review_latency),
            validator: Validator::new(
                self.knowledge,
                self.secondary,
                self.knowledge_timeout,
                self.validation_latency,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_stage_detects_reordering() {
        let expected = vec!["a".to_string(), "b".to_string()];
        let run_id = Uuid::new_v4();

        assert!(check_stage(run_id, "t", &expected, [("a", 0.5), ("b", 0.5)].into_iter()).is_ok());

        let err = check_stage(run_id, "t", &expected, [("b", 0.5), ("a", 0.5)].into_iter())
            .unwrap_err();
        assert!(matches!(err, PipelineError::InternalInvariant(_)));

        assert!(check_stage(run_id, "t", &expected, [("a", 0.5)].into_iter()).is_err());
        assert!(
            check_stage(run_id, "t", &expected, [("a", 0.5), ("b", 0.5), ("c", 0.5)].into_iter())
                .is_err()
        );
        assert!(check_stage(run_id, "t", &expected, [("a", 1.2), ("b", 0.5)].into_iter()).is_err());
    }

    #[test]
    fn test_from_config_rejects_missing_rule_file() {
        let config = PipelineConfig {
            rules_path: Some("/nonexistent/rules.toml".into()),
            ..Default::default()
        };
        assert!(Pipeline::from_config(&config).is_err());
    }

    #[tokio::test]
    async fn test_invalid_case_runs_no_stage() {
        let pipeline = Pipeline::builder().build();
        let case = Case::new("", vec!["fever".into()], 40);
        let err = pipeline.run(&case, &History::default()).await.unwrap_err();
        assert!(matches!(err, PipelineError::InputValidation(_)));
    }
}
