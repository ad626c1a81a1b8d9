//! Stage 3 - safety review
//!
//! Each candidate is put to the veto policy concurrently. With the default
//! [`RiskVetoPolicy`](crate::policy::RiskVetoPolicy) only low-confidence
//! candidates are at risk, and then only on a coin flip.

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::fanout::fan_out;
use crate::case::{ReviewedCandidate, ScoredCandidate};
use crate::error::PipelineError;
use crate::policy::DecisionPolicy;

pub struct Reviewer {
    policy: Arc<dyn DecisionPolicy>,
    /// Simulated review latency per candidate
    latency: Duration,
}

impl Reviewer {
    pub fn new(policy: Arc<dyn DecisionPolicy>, latency: Duration) -> Self {
        Self { policy, latency }
    }

    pub async fn review(
        &self,
        scored: Vec<ScoredCandidate>,
    ) -> Result<Vec<ReviewedCandidate>, PipelineError> {
        let policy = self.policy.clone();
        let latency = self.latency;

        fan_out("review", scored, move |candidate| {
            let policy = policy.clone();
            async move {
                if !latency.is_zero() {
                    tokio::time::sleep(latency).await;
                }

                let vetoed = policy.decide(candidate.confidence());
                if vetoed {
                    info!(
                        label = candidate.label(),
                        confidence = candidate.confidence(),
                        policy = policy.name(),
                        "Candidate vetoed"
                    );
                }
                ReviewedCandidate::new(candidate, vetoed)
            }
        })
        .await
    }
}
