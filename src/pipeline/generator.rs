//! Stage 1 - candidate generation
//!
//! Rules are checked in priority order. Each matching rule draws its own
//! confidence from the estimator and applies its penalty.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::case::{Candidate, Case, History};
use crate::confidence::ConfidenceEstimator;
use crate::error::ConfigError;

/// What a rule looks at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trigger {
    /// Symptom tag present
    Symptom { tag: String },
    /// Age strictly greater than `years`
    AgeAbove { years: i64 },
    /// History tag present
    History { tag: String },
}

impl Trigger {
    pub fn matches(&self, case: &Case) -> bool {
        match self {
            Trigger::Symptom { tag } => case.has_symptom(tag),
            Trigger::AgeAbove { years } => case.age > *years,
            Trigger::History { tag } => case.has_history(tag),
        }
    }

    fn describe(&self, case: &Case) -> String {
        match self {
            Trigger::Symptom { tag } => format!("symptom '{}' reported", tag),
            Trigger::AgeAbove { years } => format!("age {} is above {}", case.age, years),
            Trigger::History { tag } => format!("history of '{}'", tag),
        }
    }
}

fn full_weight() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub label: String,
    pub trigger: Trigger,
    /// Multiplier applied to the drawn confidence (0 < penalty <= 1)
    #[serde(default = "full_weight")]
    pub penalty: f64,
}

impl Rule {
    pub fn new(label: impl Into<String>, trigger: Trigger, penalty: f64) -> Self {
        Self {
            label: label.into(),
            trigger,
            penalty,
        }
    }
}

/// Ordered rule list; order is evaluation priority
///
/// ```toml
/// [[rules]]
/// label = "Infection"
/// trigger = { kind = "symptom", tag = "fever" }
///
/// [[rules]]
/// label = "Age-related vulnerability"
/// trigger = { kind = "age_above", years = 60 }
/// penalty = 0.8
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    rules: Vec<Rule>,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self {
            rules: vec![
                Rule::new(
                    "Infection",
                    Trigger::Symptom {
                        tag: "fever".into(),
                    },
                    1.0,
                ),
                Rule::new(
                    "Respiratory condition",
                    Trigger::Symptom {
                        tag: "cough".into(),
                    },
                    0.9,
                ),
                Rule::new("Age-related vulnerability", Trigger::AgeAbove { years: 60 }, 0.8),
            ],
        }
    }
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>) -> Result<Self, ConfigError> {
        let set = Self { rules };
        set.validate()?;
        Ok(set)
    }

    pub fn from_toml_str(source: &str, origin: &str) -> Result<Self, ConfigError> {
        let set: RuleSet = toml::from_str(source).map_err(|e| ConfigError::Toml {
            path: origin.to_string(),
            source: e,
        })?;
        set.validate()?;
        Ok(set)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml_str(&source, &path.display().to_string())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (idx, rule) in self.rules.iter().enumerate() {
            if rule.label.trim().is_empty() {
                return Err(ConfigError::Definition(format!("rule #{} has an empty label", idx)));
            }
            if !(rule.penalty > 0.0 && rule.penalty <= 1.0) {
                return Err(ConfigError::Definition(format!(
                    "rule '{}' has penalty {} outside (0, 1]",
                    rule.label, rule.penalty
                )));
            }
        }
        Ok(())
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

pub struct CandidateGenerator {
    rules: RuleSet,
    estimator: Arc<dyn ConfidenceEstimator>,
}

impl CandidateGenerator {
    pub fn new(rules: RuleSet, estimator: Arc<dyn ConfidenceEstimator>) -> Self {
        Self { rules, estimator }
    }

    /// Propose candidates for a case; no match means no candidates
    pub fn generate(&self, case: &Case, history: &History) -> Vec<Candidate> {
        let mut candidates = Vec::new();

        for rule in self.rules.rules() {
            if !rule.trigger.matches(case) {
                continue;
            }

            let drawn = self.estimator.estimate(history);
            let candidate = Candidate::new(
                rule.label.clone(),
                rule.trigger.describe(case),
                drawn * rule.penalty,
            );
            debug!(
                label = candidate.label(),
                confidence = candidate.confidence(),
                "Rule matched"
            );
            candidates.push(candidate);
        }

        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confidence::FixedConfidence;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn generator(conf: f64) -> CandidateGenerator {
        CandidateGenerator::new(RuleSet::default(), Arc::new(FixedConfidence(conf)))
    }

    fn case(symptoms: &[&str], age: i64) -> Case {
        Case::new("c-1", symptoms.iter().map(|s| s.to_string()).collect(), age)
    }

    #[test]
    fn test_default_rules_in_priority_order() {
        let out = generator(0.8).generate(&case(&["cough", "fever"], 65), &History::default());
        let labels: Vec<_> = out.iter().map(|c| c.label()).collect();
        assert_eq!(
            labels,
            vec!["Infection", "Respiratory condition", "Age-related vulnerability"]
        );
        assert!((out[0].confidence() - 0.8).abs() < 1e-9);
        assert!((out[1].confidence() - 0.72).abs() < 1e-9);
        assert!((out[2].confidence() - 0.64).abs() < 1e-9);
        assert_eq!(out[0].provenance(), "symptom 'fever' reported");
    }

    #[test]
    fn test_no_match_is_empty() {
        assert!(generator(0.8)
            .generate(&case(&[], 60), &History::default())
            .is_empty());
        assert!(generator(0.8)
            .generate(&case(&["rash"], 12), &History::default())
            .is_empty());
    }

    #[test]
    fn test_one_draw_per_matching_rule() {
        struct Counting(AtomicUsize);
        impl ConfidenceEstimator for Counting {
            fn estimate(&self, _history: &History) -> f64 {
                self.0.fetch_add(1, Ordering::SeqCst);
                0.5
            }
        }

        let estimator = Arc::new(Counting(AtomicUsize::new(0)));
        let generator = CandidateGenerator::new(RuleSet::default(), estimator.clone());
        generator.generate(&case(&["fever"], 70), &History::default());
        assert_eq!(estimator.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_history_trigger() {
        let rules = RuleSet::new(vec![Rule::new(
            "Cardiovascular risk",
            Trigger::History {
                tag: "hypertension".into(),
            },
            0.7,
        )])
        .unwrap();
        let generator = CandidateGenerator::new(rules, Arc::new(FixedConfidence(1.0)));
        let with = case(&[], 40).with_history(vec!["hypertension".into()]);

        let out = generator.generate(&with, &History::default());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].provenance(), "history of 'hypertension'");
        assert!(generator.generate(&case(&[], 40), &History::default()).is_empty());
    }

    #[test]
    fn test_rule_set_from_toml() {
        let source = r#"
[[rules]]
label = "Infection"
trigger = { kind = "symptom", tag = "fever" }

[[rules]]
label = "Age-related vulnerability"
trigger = { kind = "age_above", years = 60 }
penalty = 0.8
"#;
        let rules = RuleSet::from_toml_str(source, "inline").unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules.rules()[0].penalty, 1.0);
        assert_eq!(rules.rules()[1].trigger, Trigger::AgeAbove { years: 60 });
    }

    #[test]
    fn test_rule_set_rejects_bad_penalty() {
        let source = r#"
[[rules]]
label = "Infection"
trigger = { kind = "symptom", tag = "fever" }
penalty = 1.5
"#;
        assert!(RuleSet::from_toml_str(source, "inline").is_err());
        assert!(RuleSet::new(vec![Rule::new("", Trigger::AgeAbove { years: 1 }, 0.5)]).is_err());
    }
}
