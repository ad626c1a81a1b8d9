//! Per-candidate records carried between stages

use serde::Serialize;

use crate::error::PipelineError;

/// Note attached to a candidate whose enrichment lookup failed or timed out
pub const ENRICHMENT_FAILED_NOTE: &str = "Reference lookup error";

/// Clamp a confidence value into [0, 1]; NaN becomes 0
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

// ============================================================================
// Stage 1
// ============================================================================

/// A proposed labeled outcome produced by one matching rule
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    label: String,
    provenance: String,
    confidence: f64,
}

impl Candidate {
    pub fn new(label: impl Into<String>, provenance: impl Into<String>, confidence: f64) -> Self {
        Self {
            label: label.into(),
            provenance: provenance.into(),
            confidence: clamp_confidence(confidence),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Which rule produced this candidate
    pub fn provenance(&self) -> &str {
        &self.provenance
    }

    /// Initial confidence assigned by the generator
    pub fn confidence(&self) -> f64 {
        self.confidence
    }
}

// ============================================================================
// Stage 2
// ============================================================================

/// How the enrichment lookup for a candidate went
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EnrichmentOutcome {
    Enriched { relevance: f64 },
    Failed { reason: String },
    TimedOut { after_ms: u64 },
}

impl EnrichmentOutcome {
    pub fn is_enriched(&self) -> bool {
        matches!(self, EnrichmentOutcome::Enriched { .. })
    }
}

/// Candidate with a refined confidence score and reference note
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredCandidate {
    candidate: Candidate,
    confidence: f64,
    note: String,
    enrichment: EnrichmentOutcome,
}

impl ScoredCandidate {
    /// Average the relevance reported by the lookup into the confidence
    pub fn enriched(candidate: Candidate, relevance: f64, note: impl Into<String>) -> Self {
        let relevance = clamp_confidence(relevance);
        let confidence = clamp_confidence((candidate.confidence + relevance) / 2.0);
        Self {
            candidate,
            confidence,
            note: note.into(),
            enrichment: EnrichmentOutcome::Enriched { relevance },
        }
    }

    /// Carry the candidate forward unchanged with the failure sentinel note
    pub fn unenriched(candidate: Candidate, outcome: EnrichmentOutcome) -> Self {
        Self {
            confidence: candidate.confidence,
            candidate,
            note: ENRICHMENT_FAILED_NOTE.to_string(),
            enrichment: outcome,
        }
    }

    pub fn candidate(&self) -> &Candidate {
        &self.candidate
    }

    pub fn label(&self) -> &str {
        self.candidate.label()
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn note(&self) -> &str {
        &self.note
    }

    pub fn enrichment(&self) -> &EnrichmentOutcome {
        &self.enrichment
    }
}

// ============================================================================
// Stage 3
// ============================================================================

/// Scored candidate plus the review verdict
///
/// There is no way to clear a veto once set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewedCandidate {
    #[serde(flatten)]
    scored: ScoredCandidate,
    vetoed: bool,
}

impl ReviewedCandidate {
    pub fn new(scored: ScoredCandidate, vetoed: bool) -> Self {
        Self { scored, vetoed }
    }

    pub fn scored(&self) -> &ScoredCandidate {
        &self.scored
    }

    pub fn label(&self) -> &str {
        self.scored.label()
    }

    pub fn confidence(&self) -> f64 {
        self.scored.confidence()
    }

    pub fn is_vetoed(&self) -> bool {
        self.vetoed
    }
}

// ============================================================================
// Stage 4
// ============================================================================

/// Result of one consistency sub-check
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", content = "detail", rename_all = "snake_case")]
pub enum CheckOutcome {
    Passed,
    Failed,
    Error(String),
}

impl CheckOutcome {
    pub fn from_bool(passed: bool) -> Self {
        if passed {
            CheckOutcome::Passed
        } else {
            CheckOutcome::Failed
        }
    }

    pub fn passed(&self) -> bool {
        matches!(self, CheckOutcome::Passed)
    }
}

/// Both consistency checks run for a non-vetoed candidate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationChecks {
    /// Knowledge store consistency
    pub knowledge: CheckOutcome,
    /// Secondary terminology consistency draw
    pub secondary: CheckOutcome,
}

impl ValidationChecks {
    pub fn passed(&self) -> bool {
        self.knowledge.passed() && self.secondary.passed()
    }
}

/// Where a candidate ended up after validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Vetoed,
    Invalid,
    Accepted,
}

/// Reviewed candidate plus its validity flag
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedCandidate {
    #[serde(flatten)]
    reviewed: ReviewedCandidate,
    valid: bool,
    checks: Option<ValidationChecks>,
}

impl ValidatedCandidate {
    /// Short-circuit for a vetoed candidate: no checks, never valid
    pub fn skipped(reviewed: ReviewedCandidate) -> Result<Self, PipelineError> {
        if !reviewed.is_vetoed() {
            return Err(PipelineError::invariant(format!(
                "validation skipped for non-vetoed candidate '{}'",
                reviewed.label()
            )));
        }
        Ok(Self {
            reviewed,
            valid: false,
            checks: None,
        })
    }

    /// Candidate that went through both checks
    pub fn checked(
        reviewed: ReviewedCandidate,
        checks: ValidationChecks,
    ) -> Result<Self, PipelineError> {
        if reviewed.is_vetoed() {
            return Err(PipelineError::invariant(format!(
                "validation checks issued for vetoed candidate '{}'",
                reviewed.label()
            )));
        }
        Ok(Self {
            reviewed,
            valid: checks.passed(),
            checks: Some(checks),
        })
    }

    pub fn reviewed(&self) -> &ReviewedCandidate {
        &self.reviewed
    }

    pub fn label(&self) -> &str {
        self.reviewed.label()
    }

    pub fn confidence(&self) -> f64 {
        self.reviewed.confidence()
    }

    pub fn note(&self) -> &str {
        self.reviewed.scored().note()
    }

    pub fn is_vetoed(&self) -> bool {
        self.reviewed.is_vetoed()
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn checks(&self) -> Option<&ValidationChecks> {
        self.checks.as_ref()
    }

    pub fn verdict(&self) -> Verdict {
        if self.is_vetoed() {
            Verdict::Vetoed
        } else if !self.valid {
            Verdict::Invalid
        } else {
            Verdict::Accepted
        }
    }
}

// ============================================================================
// Output
// ============================================================================

/// Accepted recommendation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    pub label: String,
    pub confidence: f64,
    pub explanation: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(conf: f64) -> ScoredCandidate {
        ScoredCandidate::enriched(
            Candidate::new("Infection", "symptom 'fever'", conf),
            conf,
            "note",
        )
    }

    #[test]
    fn test_clamp_confidence() {
        assert_eq!(clamp_confidence(1.7), 1.0);
        assert_eq!(clamp_confidence(-0.2), 0.0);
        assert_eq!(clamp_confidence(f64::NAN), 0.0);
        assert_eq!(clamp_confidence(0.42), 0.42);
    }

    #[test]
    fn test_enriched_averages_and_clamps() {
        let s = ScoredCandidate::enriched(Candidate::new("A", "r", 0.6), 2.0, "n");
        assert!((s.confidence() - 0.8).abs() < 1e-9);
        assert_eq!(s.enrichment(), &EnrichmentOutcome::Enriched { relevance: 1.0 });
        assert_eq!(s.candidate().confidence(), 0.6);
    }

    #[test]
    fn test_unenriched_keeps_confidence() {
        let s = ScoredCandidate::unenriched(
            Candidate::new("A", "r", 0.55),
            EnrichmentOutcome::TimedOut { after_ms: 10 },
        );
        assert_eq!(s.confidence(), 0.55);
        assert_eq!(s.note(), ENRICHMENT_FAILED_NOTE);
        assert!(!s.enrichment().is_enriched());
    }

    #[test]
    fn test_vetoed_candidate_cannot_be_checked() {
        let reviewed = ReviewedCandidate::new(scored(0.2), true);
        let checks = ValidationChecks {
            knowledge: CheckOutcome::Passed,
            secondary: CheckOutcome::Passed,
        };
        assert!(matches!(
            ValidatedCandidate::checked(reviewed.clone(), checks),
            Err(PipelineError::InternalInvariant(_))
        ));

        let skipped = ValidatedCandidate::skipped(reviewed).unwrap();
        assert!(!skipped.is_valid());
        assert!(skipped.checks().is_none());
        assert_eq!(skipped.verdict(), Verdict::Vetoed);
    }

    #[test]
    fn test_non_vetoed_candidate_cannot_skip() {
        let reviewed = ReviewedCandidate::new(scored(0.9), false);
        assert!(ValidatedCandidate::skipped(reviewed).is_err());
    }

    #[test]
    fn test_validity_requires_both_checks() {
        let reviewed = ReviewedCandidate::new(scored(0.9), false);
        let failed = ValidatedCandidate::checked(
            reviewed.clone(),
            ValidationChecks {
                knowledge: CheckOutcome::Passed,
                secondary: CheckOutcome::Failed,
            },
        )
        .unwrap();
        assert!(!failed.is_valid());
        assert_eq!(failed.verdict(), Verdict::Invalid);

        let errored = ValidatedCandidate::checked(
            reviewed.clone(),
            ValidationChecks {
                knowledge: CheckOutcome::Error("store offline".into()),
                secondary: CheckOutcome::Passed,
            },
        )
        .unwrap();
        assert!(!errored.is_valid());

        let accepted = ValidatedCandidate::checked(
            reviewed,
            ValidationChecks {
                knowledge: CheckOutcome::Passed,
                secondary: CheckOutcome::Passed,
            },
        )
        .unwrap();
        assert_eq!(accepted.verdict(), Verdict::Accepted);
    }
}
