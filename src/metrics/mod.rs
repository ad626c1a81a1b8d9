//! Run metrics
//!
//! The pipeline itself never records metrics; callers feed a [`MetricsSink`]
//! after each run. [`MetricsCollector`] keeps everything in memory and
//! produces per-agent summaries.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::info;

/// Destination for per-agent measurements
pub trait MetricsSink: Send + Sync {
    fn record(&self, agent: &str, latency: Duration, confidence: f64, validation_success: bool);
}

/// One recorded measurement
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentMetrics {
    pub latency_ms: f64,
    pub confidence: f64,
    pub validation_success: bool,
}

/// Aggregates for one agent
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentSummary {
    pub agent: String,
    pub samples: usize,
    pub avg_latency_ms: f64,
    pub avg_confidence: f64,
    /// Fraction of samples with successful validation (0.0-1.0)
    pub validation_success_rate: f64,
}

#[derive(Debug, Default)]
pub struct MetricsCollector {
    metrics: Mutex<BTreeMap<String, Vec<AgentMetrics>>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Summaries for every agent, sorted by agent name
    pub fn summaries(&self) -> Vec<AgentSummary> {
        let metrics = match self.metrics.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        metrics
            .iter()
            .filter(|(_, points)| !points.is_empty())
            .map(|(agent, points)| {
                let n = points.len() as f64;
                AgentSummary {
                    agent: agent.clone(),
                    samples: points.len(),
                    avg_latency_ms: points.iter().map(|m| m.latency_ms).sum::<f64>() / n,
                    avg_confidence: points.iter().map(|m| m.confidence).sum::<f64>() / n,
                    validation_success_rate: points
                        .iter()
                        .filter(|m| m.validation_success)
                        .count() as f64
                        / n,
                }
            })
            .collect()
    }

    /// Log one line per agent and return the summaries
    pub fn summarize(&self) -> Vec<AgentSummary> {
        let summaries = self.summaries();
        for s in &summaries {
            info!(
                "Agent: {} | Avg Latency={:.3}s, Avg Confidence={:.2}, Validation Success={:.2}%",
                s.agent,
                s.avg_latency_ms / 1000.0,
                s.avg_confidence,
                s.validation_success_rate * 100.0
            );
        }
        summaries
    }
}

impl MetricsSink for MetricsCollector {
    fn record(&self, agent: &str, latency: Duration, confidence: f64, validation_success: bool) {
        let mut metrics = match self.metrics.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        metrics
            .entry(agent.to_string())
            .or_default()
            .push(AgentMetrics {
                latency_ms: latency.as_secs_f64() * 1000.0,
                confidence,
                validation_success,
            });
    }
}
