//! Stage 2 - reference enrichment
//!
//! One lookup per candidate, all in flight at once. A failed or timed out
//! lookup leaves the candidate's confidence untouched and tags it with the
//! failure sentinel note.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::fanout::fan_out;
use crate::case::{Candidate, EnrichmentOutcome, ScoredCandidate};
use crate::collaborators::EnrichmentService;
use crate::error::PipelineError;

pub struct Enricher {
    service: Arc<dyn EnrichmentService>,
    timeout: Duration,
}

impl Enricher {
    pub fn new(service: Arc<dyn EnrichmentService>, timeout: Duration) -> Self {
        Self { service, timeout }
    }

    pub async fn enrich(
        &self,
        candidates: Vec<Candidate>,
    ) -> Result<Vec<ScoredCandidate>, PipelineError> {
        let service = self.service.clone();
        let timeout = self.timeout;

        fan_out("enrichment", candidates, move |candidate| {
            let service = service.clone();
            async move { enrich_one(service, candidate, timeout).await }
        })
        .await
    }
}

async fn enrich_one(
    service: Arc<dyn EnrichmentService>,
    candidate: Candidate,
    timeout: Duration,
) -> ScoredCandidate {
    let start = Instant::now();

    // The service gets the budget too, but the stage enforces it regardless
    let result = tokio::time::timeout(timeout, service.lookup(candidate.label(), timeout)).await;

    match result {
        Ok(Ok(enrichment)) => {
            debug!(
                label = candidate.label(),
                service = service.name(),
                relevance = enrichment.relevance,
                latency_ms = start.elapsed().as_millis() as u64,
                "Candidate enriched"
            );
            ScoredCandidate::enriched(candidate, enrichment.relevance, enrichment.note)
        }
        Ok(Err(e)) if e.is_timeout() => {
            warn!(label = candidate.label(), service = service.name(), "Lookup timed out: {}", e);
            ScoredCandidate::unenriched(
                candidate,
                EnrichmentOutcome::TimedOut {
                    after_ms: start.elapsed().as_millis() as u64,
                },
            )
        }
        Ok(Err(e)) => {
            warn!(label = candidate.label(), service = service.name(), "Lookup failed: {}", e);
            ScoredCandidate::unenriched(
                candidate,
                EnrichmentOutcome::Failed {
                    reason: e.to_string(),
                },
            )
        }
        Err(_) => {
            warn!(
                label = candidate.label(),
                service = service.name(),
                "Lookup exceeded {:?}",
                timeout
            );
            ScoredCandidate::unenriched(
                candidate,
                EnrichmentOutcome::TimedOut {
                    after_ms: timeout.as_millis() as u64,
                },
            )
        }
    }
}
