//! Case model - pipeline input and per-candidate records
//!
//! A [`Case`] is the immutable input to a run. Each stage turns the previous
//! stage's records into its own record type:
//! - Stage 1: [`Candidate`]
//! - Stage 2: [`ScoredCandidate`]
//! - Stage 3: [`ReviewedCandidate`]
//! - Stage 4: [`ValidatedCandidate`]
//! - Reduction: [`Decision`]

mod records;

pub use records::*;

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::error::PipelineError;

// ============================================================================
// Case
// ============================================================================

/// Structured case description fed into the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    /// Case identifier (must be non-empty)
    #[serde(alias = "identifier", alias = "patient_id")]
    pub id: String,
    /// Ordered symptom tags; repeats are allowed and match once
    #[serde(alias = "symptom_tags")]
    pub symptoms: Vec<String>,
    /// Age in years (must be non-negative)
    #[serde(alias = "numeric_attribute")]
    pub age: i64,
    /// Optional history tags
    #[serde(default, alias = "history_tags", alias = "medical_history")]
    pub history: Option<Vec<String>>,
}

impl Case {
    pub fn new(id: impl Into<String>, symptoms: Vec<String>, age: i64) -> Self {
        Self {
            id: id.into(),
            symptoms,
            age,
            history: None,
        }
    }

    pub fn with_history(mut self, history: Vec<String>) -> Self {
        self.history = Some(history);
        self
    }

    /// Parse a case from JSON
    pub fn from_json(json: &str) -> Result<Self, PipelineError> {
        serde_json::from_str(json)
            .map_err(|e| PipelineError::input(format!("case is not a valid record: {}", e)))
    }

    /// Check structural constraints before any stage runs
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.id.trim().is_empty() {
            return Err(PipelineError::input("identifier is missing or empty"));
        }
        if self.age < 0 {
            return Err(PipelineError::input(format!(
                "age must be non-negative (got {})",
                self.age
            )));
        }

        validate_tags("symptom", &self.symptoms)?;
        if let Some(history) = &self.history {
            validate_tags("history", history)?;
        }

        Ok(())
    }

    pub fn has_symptom(&self, tag: &str) -> bool {
        self.symptoms.iter().any(|s| s == tag)
    }

    pub fn has_history(&self, tag: &str) -> bool {
        self.history
            .as_ref()
            .map(|h| h.iter().any(|t| t == tag))
            .unwrap_or(false)
    }
}

fn validate_tags(kind: &str, tags: &[String]) -> Result<(), PipelineError> {
    for (idx, tag) in tags.iter().enumerate() {
        if tag.trim().is_empty() {
            return Err(PipelineError::input(format!(
                "{} tag #{} is empty",
                kind, idx
            )));
        }
        if tag.chars().any(char::is_control) {
            return Err(PipelineError::input(format!(
                "{} tag #{} contains control characters",
                kind, idx
            )));
        }
    }
    Ok(())
}

// ============================================================================
// History
// ============================================================================

/// Default number of outcomes kept per estimator history
pub const DEFAULT_HISTORY_CAPACITY: usize = 32;

/// Bounded record of past success/failure outcomes
///
/// Read-only while a run is in flight; callers append between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct History {
    outcomes: VecDeque<bool>,
    capacity: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl History {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            outcomes: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Build a history from existing outcomes, keeping the most recent ones
    pub fn from_outcomes(capacity: usize, outcomes: impl IntoIterator<Item = bool>) -> Self {
        let mut history = Self::new(capacity);
        for outcome in outcomes {
            history.record(outcome);
        }
        history
    }

    /// Append an outcome, dropping the oldest when full
    pub fn record(&mut self, success: bool) {
        if self.outcomes.len() == self.capacity {
            self.outcomes.pop_front();
        }
        self.outcomes.push_back(success);
    }

    pub fn successes(&self) -> usize {
        self.outcomes.iter().filter(|o| **o).count()
    }

    pub fn failures(&self) -> usize {
        self.outcomes.len() - self.successes()
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        self.outcomes.iter().copied()
    }
}
