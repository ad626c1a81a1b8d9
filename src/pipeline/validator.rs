//! Stage 4 - consistency validation
//!
//! Non-vetoed candidates run two checks side by side: the knowledge store
//! predicate and the secondary terminology draw. Vetoed candidates skip both
//! and never spawn any work.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::fanout::fan_out;
use crate::case::{CheckOutcome, ReviewedCandidate, ValidatedCandidate, ValidationChecks};
use crate::collaborators::KnowledgeStore;
use crate::error::PipelineError;
use crate::policy::DecisionPolicy;

pub struct Validator {
    store: Arc<dyn KnowledgeStore>,
    secondary: Arc<dyn DecisionPolicy>,
    /// Budget for each knowledge store query
    timeout: Duration,
    /// Simulated latency of the secondary check
    latency: Duration,
}

impl Validator {
    pub fn new(
        store: Arc<dyn KnowledgeStore>,
        secondary: Arc<dyn DecisionPolicy>,
        timeout: Duration,
        latency: Duration,
    ) -> Self {
        Self {
            store,
            secondary,
            timeout,
            latency,
        }
    }

    pub async fn validate(
        &self,
        reviewed: Vec<ReviewedCandidate>,
    ) -> Result<Vec<ValidatedCandidate>, PipelineError> {
        let mut slots: Vec<Option<ValidatedCandidate>> = Vec::with_capacity(reviewed.len());
        let mut to_check = Vec::new();

        for (index, candidate) in reviewed.into_iter().enumerate() {
            if candidate.is_vetoed() {
                debug!(label = candidate.label(), "Vetoed, skipping validation");
                slots.push(Some(ValidatedCandidate::skipped(candidate)?));
            } else {
                slots.push(None);
                to_check.push((index, candidate));
            }
        }

        let store = self.store.clone();
        let secondary = self.secondary.clone();
        let timeout = self.timeout;
        let latency = self.latency;

        let checked = fan_out("validation", to_check, move |(index, candidate)| {
            let store = store.clone();
            let secondary = secondary.clone();
            async move {
                let checks =
                    run_checks(store.as_ref(), secondary.as_ref(), &candidate, timeout, latency)
                        .await;
                (index, ValidatedCandidate::checked(candidate, checks))
            }
        })
        .await?;

        for (index, result) in checked {
            let validated = result?;
            match slots.get_mut(index) {
                Some(slot) if slot.is_none() => *slot = Some(validated),
                _ => {
                    return Err(PipelineError::invariant(format!(
                        "validation result #{} has no open slot",
                        index
                    )));
                }
            }
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.ok_or_else(|| {
                    PipelineError::invariant(format!("validation missing result #{}", index))
                })
            })
            .collect()
    }
}

async fn run_checks(
    store: &dyn KnowledgeStore,
    secondary: &dyn DecisionPolicy,
    candidate: &ReviewedCandidate,
    timeout: Duration,
    latency: Duration,
) -> ValidationChecks {
    let label = candidate.label();

    let knowledge = async {
        match tokio::time::timeout(timeout, store.is_consistent(label)).await {
            Ok(Ok(consistent)) => CheckOutcome::from_bool(consistent),
            Ok(Err(e)) => {
                warn!(label, store = store.name(), "Consistency check failed: {}", e);
                CheckOutcome::Error(e.to_string())
            }
            Err(_) => {
                warn!(label, store = store.name(), "Consistency check exceeded {:?}", timeout);
                CheckOutcome::Error(format!("timed out after {:?}", timeout))
            }
        }
    };

    let terminology = async {
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        CheckOutcome::from_bool(secondary.decide(candidate.confidence()))
    };

    let (knowledge, secondary) = tokio::join!(knowledge, terminology);
    debug!(
        label,
        knowledge = knowledge.passed(),
        secondary = secondary.passed(),
        "Validation checks done"
    );
    ValidationChecks {
        knowledge,
        secondary,
    }
}
