//! Stage 5 - rationale text
//!
//! Pure and synchronous. Precedence: vetoed, then invalid, then accepted.

use crate::case::{CheckOutcome, ValidatedCandidate, Verdict};

/// One rationale per candidate, in input order
pub fn explain(validated: &[ValidatedCandidate]) -> Vec<String> {
    validated.iter().map(rationale).collect()
}

pub fn rationale(candidate: &ValidatedCandidate) -> String {
    match candidate.verdict() {
        Verdict::Vetoed => format!(
            "Diagnosis '{}' was vetoed by the safety review due to risk.",
            candidate.label()
        ),
        Verdict::Invalid => {
            let mut text = format!("Diagnosis '{}' failed validation checks.", candidate.label());
            if let Some(checks) = candidate.checks() {
                text.push_str(&format!(
                    " (knowledge store: {}; terminology: {})",
                    describe(&checks.knowledge),
                    describe(&checks.secondary)
                ));
            }
            text
        }
        Verdict::Accepted => format!(
            "Diagnosis '{}' accepted with confidence {:.2}. Reference note: {}",
            candidate.label(),
            candidate.confidence(),
            candidate.note()
        ),
    }
}

fn describe(outcome: &CheckOutcome) -> String {
    match outcome {
        CheckOutcome::Passed => "passed".to_string(),
        CheckOutcome::Failed => "failed".to_string(),
        CheckOutcome::Error(e) => format!("error: {}", e),
    }
}
