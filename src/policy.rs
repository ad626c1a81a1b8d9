//! Injectable decision policies
//!
//! The review veto and the secondary consistency check are randomized. They
//! live behind [`DecisionPolicy`] so stage logic never draws random numbers
//! itself and tests can swap in [`FixedPolicy`].

use rand::Rng;

/// Default confidence below which a candidate becomes eligible for veto
pub const DEFAULT_VETO_THRESHOLD: f64 = 0.3;
/// Default chance that an eligible candidate is actually vetoed
pub const DEFAULT_VETO_PROBABILITY: f64 = 0.5;
/// Default pass rate of the secondary terminology check
pub const DEFAULT_SECONDARY_PASS_PROBABILITY: f64 = 0.9;

/// Yes/no decision about a candidate with the given confidence
pub trait DecisionPolicy: Send + Sync {
    fn decide(&self, score: f64) -> bool;

    fn name(&self) -> &'static str {
        "policy"
    }
}

// NaN survives f64::clamp and would panic inside random_bool
fn clamp_probability(p: f64) -> f64 {
    if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) }
}

/// Probabilistic veto for low-confidence candidates
///
/// Only candidates below `threshold` are eligible; each eligible one is
/// vetoed with `probability`. The same score can go either way across runs.
#[derive(Debug, Clone, Copy)]
pub struct RiskVetoPolicy {
    threshold: f64,
    probability: f64,
}

impl Default for RiskVetoPolicy {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_VETO_THRESHOLD,
            probability: DEFAULT_VETO_PROBABILITY,
        }
    }
}

impl RiskVetoPolicy {
    pub fn new(threshold: f64, probability: f64) -> Self {
        Self {
            threshold,
            probability: clamp_probability(probability),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }
}

impl DecisionPolicy for RiskVetoPolicy {
    fn decide(&self, score: f64) -> bool {
        score < self.threshold && rand::rng().random_bool(self.probability)
    }

    fn name(&self) -> &'static str {
        "risk-veto"
    }
}

/// Passes with a fixed probability regardless of score
#[derive(Debug, Clone, Copy)]
pub struct BernoulliPolicy {
    probability: f64,
}

impl Default for BernoulliPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_SECONDARY_PASS_PROBABILITY)
    }
}

impl BernoulliPolicy {
    pub fn new(probability: f64) -> Self {
        Self {
            probability: clamp_probability(probability),
        }
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }
}

impl DecisionPolicy for BernoulliPolicy {
    fn decide(&self, _score: f64) -> bool {
        rand::rng().random_bool(self.probability)
    }

    fn name(&self) -> &'static str {
        "bernoulli"
    }
}

/// Always returns the same answer
#[derive(Debug, Clone, Copy)]
pub struct FixedPolicy(pub bool);

impl DecisionPolicy for FixedPolicy {
    fn decide(&self, _score: f64) -> bool {
        self.0
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}
