//! Confidence estimation via Thompson sampling
//!
//! Past outcomes are treated as Bernoulli trials. The confidence proxy is a
//! sample from Beta(1 + successes, 1 + failures), so more successes skew the
//! value upward while repeated calls still vary.

use rand::Rng;
use rand_distr::{Beta, Distribution};

use crate::case::{History, clamp_confidence};

/// Lower bound of the fallback draw when there is no usable history
pub const FALLBACK_MIN: f64 = 0.5;
/// Upper bound of the fallback draw
pub const FALLBACK_MAX: f64 = 0.9;

/// Produces a confidence score in [0, 1] from an outcome history
pub trait ConfidenceEstimator: Send + Sync {
    fn estimate(&self, history: &History) -> f64;
}

/// Beta posterior sampler with a uniform fallback
#[derive(Debug, Clone, Copy, Default)]
pub struct ThompsonEstimator;

impl ThompsonEstimator {
    pub fn new() -> Self {
        Self
    }

    fn fallback() -> f64 {
        rand::rng().random_range(FALLBACK_MIN..=FALLBACK_MAX)
    }
}

impl ConfidenceEstimator for ThompsonEstimator {
    fn estimate(&self, history: &History) -> f64 {
        if history.is_empty() {
            return Self::fallback();
        }

        let alpha = 1.0 + history.successes() as f64;
        let beta = 1.0 + history.failures() as f64;

        match Beta::new(alpha, beta) {
            Ok(dist) => {
                let sample: f64 = dist.sample(&mut rand::rng());
                if sample.is_finite() {
                    clamp_confidence(sample)
                } else {
                    Self::fallback()
                }
            }
            Err(e) => {
                tracing::warn!(alpha, beta, "Beta sampling unavailable ({}), using fallback", e);
                Self::fallback()
            }
        }
    }
}

/// Always returns the same confidence, ignoring history
#[derive(Debug, Clone, Copy)]
pub struct FixedConfidence(pub f64);

impl ConfidenceEstimator for FixedConfidence {
    fn estimate(&self, _history: &History) -> f64 {
        clamp_confidence(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_history_uses_fallback_range() {
        let estimator = ThompsonEstimator::new();
        let history = History::default();
        for _ in 0..200 {
            let v = estimator.estimate(&history);
            assert!((FALLBACK_MIN..=FALLBACK_MAX).contains(&v), "out of range: {}", v);
        }
    }

    #[test]
    fn test_samples_stay_in_unit_interval() {
        let estimator = ThompsonEstimator::new();
        let history = History::from_outcomes(16, [true, false, true]);
        for _ in 0..500 {
            let v = estimator.estimate(&history);
            assert!(v.is_finite());
            assert!((0.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn test_successes_skew_samples_upward() {
        let estimator = ThompsonEstimator::new();
        let good = History::from_outcomes(64, std::iter::repeat_n(true, 40));
        let bad = History::from_outcomes(64, std::iter::repeat_n(false, 40));

        let mean = |h: &History| (0..400).map(|_| estimator.estimate(h)).sum::<f64>() / 400.0;
        let good_mean = mean(&good);
        let bad_mean = mean(&bad);

        assert!(good_mean > 0.85, "good mean {}", good_mean);
        assert!(bad_mean < 0.15, "bad mean {}", bad_mean);
    }

    #[test]
    fn test_sampling_varies_across_calls() {
        let estimator = ThompsonEstimator::new();
        let history = History::from_outcomes(8, [true, false, true]);
        let first = estimator.estimate(&history);
        let varied = (0..50).any(|_| (estimator.estimate(&history) - first).abs() > 1e-9);
        assert!(varied);
    }

    #[test]
    fn test_fixed_confidence_is_clamped() {
        assert_eq!(FixedConfidence(0.8).estimate(&History::default()), 0.8);
        assert_eq!(FixedConfidence(3.0).estimate(&History::default()), 1.0);
    }
}
