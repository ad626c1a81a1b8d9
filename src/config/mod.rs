// src/config/mod.rs
// Pipeline configuration: defaults, then CASEFLOW_* environment overrides

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::case::DEFAULT_HISTORY_CAPACITY;
use crate::error::ConfigError;
use crate::policy::{
    DEFAULT_SECONDARY_PASS_PROBABILITY, DEFAULT_VETO_PROBABILITY, DEFAULT_VETO_THRESHOLD,
};

/// Default reference lookup endpoint (NCBI E-utilities search)
pub const DEFAULT_ENRICHMENT_URL: &str =
    "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi";

/// Which enrichment collaborator to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrichmentMode {
    /// Local synthetic lookups, no network
    Mock,
    /// HTTP reference lookups
    Remote,
}

impl FromStr for EnrichmentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mock" | "local" => Ok(EnrichmentMode::Mock),
            "remote" | "pubmed" | "http" => Ok(EnrichmentMode::Remote),
            other => Err(format!("unknown enrichment mode '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    // ── Enrichment
    pub enrichment_mode: EnrichmentMode,
    pub enrichment_url: String,
    /// Per-lookup timeout in milliseconds
    pub enrichment_timeout_ms: u64,
    /// Simulated latency of the mock lookup in milliseconds
    pub mock_latency_ms: u64,

    // ── Review
    pub veto_threshold: f64,
    pub veto_probability: f64,
    /// Simulated latency of each review sub-evaluation in milliseconds
    pub review_latency_ms: u64,

    // ── Validation
    /// Per-query knowledge store timeout in milliseconds
    pub knowledge_timeout_ms: u64,
    pub secondary_pass_probability: f64,
    /// Simulated latency of each validation sub-evaluation in milliseconds
    pub validation_latency_ms: u64,

    // ── Estimation
    pub history_capacity: usize,

    // ── Files
    pub rules_path: Option<PathBuf>,
    pub knowledge_path: Option<PathBuf>,

    // ── Logging
    pub log_level: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enrichment_mode: EnrichmentMode::Mock,
            enrichment_url: DEFAULT_ENRICHMENT_URL.to_string(),
            enrichment_timeout_ms: 2000,
            mock_latency_ms: 100,
            veto_threshold: DEFAULT_VETO_THRESHOLD,
            veto_probability: DEFAULT_VETO_PROBABILITY,
            review_latency_ms: 50,
            knowledge_timeout_ms: 2000,
            secondary_pass_probability: DEFAULT_SECONDARY_PASS_PROBABILITY,
            validation_latency_ms: 20,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            rules_path: None,
            knowledge_path: None,
            log_level: "info".to_string(),
        }
    }
}

// Handles values with trailing comments and extra whitespace.
// Unparseable values fall back to the default with a warning.
fn var_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(val) => {
            let clean_val = val.split('#').next().unwrap_or("").trim();
            match clean_val.parse::<T>() {
                Ok(parsed) => parsed,
                Err(_) => {
                    eprintln!("Config: {} = '{}' (parse failed, using default)", key, val);
                    default
                }
            }
        }
        None => default,
    }
}

impl PipelineConfig {
    /// Load config from CASEFLOW_* environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load config through an arbitrary key lookup (env, map, ...)
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        let path = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        };

        Self {
            enrichment_mode: var_or(&lookup, "CASEFLOW_ENRICHMENT_MODE", d.enrichment_mode),
            enrichment_url: var_or(&lookup, "CASEFLOW_ENRICHMENT_URL", d.enrichment_url),
            enrichment_timeout_ms: var_or(
                &lookup,
                "CASEFLOW_ENRICHMENT_TIMEOUT_MS",
                d.enrichment_timeout_ms,
            ),
            mock_latency_ms: var_or(&lookup, "CASEFLOW_MOCK_LATENCY_MS", d.mock_latency_ms),
            veto_threshold: var_or(&lookup, "CASEFLOW_VETO_THRESHOLD", d.veto_threshold),
            veto_probability: var_or(&lookup, "CASEFLOW_VETO_PROBABILITY", d.veto_probability),
            review_latency_ms: var_or(&lookup, "CASEFLOW_REVIEW_LATENCY_MS", d.review_latency_ms),
            knowledge_timeout_ms: var_or(
                &lookup,
                "CASEFLOW_KNOWLEDGE_TIMEOUT_MS",
                d.knowledge_timeout_ms,
            ),
            secondary_pass_probability: var_or(
                &lookup,
                "CASEFLOW_SECONDARY_PASS_PROBABILITY",
                d.secondary_pass_probability,
            ),
            validation_latency_ms: var_or(
                &lookup,
                "CASEFLOW_VALIDATION_LATENCY_MS",
                d.validation_latency_ms,
            ),
            history_capacity: var_or(&lookup, "CASEFLOW_HISTORY_CAPACITY", d.history_capacity),
            rules_path: path("CASEFLOW_RULES_PATH"),
            knowledge_path: path("CASEFLOW_KNOWLEDGE_PATH"),
            log_level: var_or(&lookup, "CASEFLOW_LOG_LEVEL", d.log_level),
        }
    }

    /// Reject values the pipeline cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_probability("veto_threshold", self.veto_threshold)?;
        check_probability("veto_probability", self.veto_probability)?;
        check_probability("secondary_pass_probability", self.secondary_pass_probability)?;

        for (key, value) in [
            ("enrichment_timeout_ms", self.enrichment_timeout_ms),
            ("knowledge_timeout_ms", self.knowledge_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    key: key.into(),
                    value: "0".into(),
                });
            }
        }
        if self.history_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "history_capacity".into(),
                value: "0".into(),
            });
        }
        Ok(())
    }

    pub fn enrichment_timeout(&self) -> Duration {
        Duration::from_millis(self.enrichment_timeout_ms)
    }

    pub fn knowledge_timeout(&self) -> Duration {
        Duration::from_millis(self.knowledge_timeout_ms)
    }

    pub fn mock_latency(&self) -> Duration {
        Duration::from_millis(self.mock_latency_ms)
    }

    pub fn review_latency(&self) -> Duration {
        Duration::from_millis(self.review_latency_ms)
    }

    pub fn validation_latency(&self) -> Duration {
        Duration::from_millis(self.validation_latency_ms)
    }
}

fn check_probability(key: &str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.enrichment_mode, EnrichmentMode::Mock);
        assert_eq!(config.veto_threshold, 0.3);
        assert_eq!(config.enrichment_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_overrides_from_lookup() {
        let config = PipelineConfig::from_lookup(lookup_from(&[
            ("CASEFLOW_ENRICHMENT_MODE", "remote"),
            ("CASEFLOW_ENRICHMENT_TIMEOUT_MS", "750  # tighter budget"),
            ("CASEFLOW_VETO_PROBABILITY", "0.25"),
            ("CASEFLOW_RULES_PATH", "/etc/caseflow/rules.toml"),
            ("CASEFLOW_KNOWLEDGE_PATH", "  "),
        ]));
        assert_eq!(config.enrichment_mode, EnrichmentMode::Remote);
        assert_eq!(config.enrichment_timeout_ms, 750);
        assert_eq!(config.veto_probability, 0.25);
        assert_eq!(
            config.rules_path.as_deref(),
            Some(std::path::Path::new("/etc/caseflow/rules.toml"))
        );
        assert!(config.knowledge_path.is_none());
    }

    #[test]
    fn test_unparseable_values_keep_defaults() {
        let config = PipelineConfig::from_lookup(lookup_from(&[
            ("CASEFLOW_ENRICHMENT_MODE", "carrier-pigeon"),
            ("CASEFLOW_HISTORY_CAPACITY", "lots"),
        ]));
        assert_eq!(config.enrichment_mode, EnrichmentMode::Mock);
        assert_eq!(config.history_capacity, DEFAULT_HISTORY_CAPACITY);
    }

    #[test]
    fn test_validate_rejects_bad_probabilities() {
        let config = PipelineConfig {
            veto_probability: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = PipelineConfig {
            secondary_pass_probability: f64::NAN,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
