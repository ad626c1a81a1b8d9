//! External collaborators consumed by the pipeline
//!
//! - [`EnrichmentService`]: reference lookup returning a relevance and a note
//! - [`KnowledgeStore`]: consistency predicate over known labels
//!
//! Implementations are shared across concurrent sub-evaluations through
//! `Arc<dyn ...>`, so they must be `Send + Sync`.

mod enrichment;
mod knowledge;

pub use enrichment::{MockEnrichment, PubMedEnrichment, enrichment_from_config};
pub use knowledge::{KnowledgeDefinition, KnowledgeGraph, RelationDefinition};

use async_trait::async_trait;
use std::time::Duration;

use crate::error::CollaboratorError;

/// Successful enrichment lookup
#[derive(Debug, Clone, PartialEq)]
pub struct Enrichment {
    /// Relevance of the label in the reference source (0.0-1.0)
    pub relevance: f64,
    /// Short human-readable note about what was found
    pub note: String,
}

impl Enrichment {
    pub fn new(relevance: f64, note: impl Into<String>) -> Self {
        Self {
            relevance,
            note: note.into(),
        }
    }
}

/// Reference lookup used by the enrichment stage
#[async_trait]
pub trait EnrichmentService: Send + Sync {
    /// Name for logging
    fn name(&self) -> &'static str;

    /// Look up `label`, giving up after `timeout`
    async fn lookup(&self, label: &str, timeout: Duration)
    -> Result<Enrichment, CollaboratorError>;
}

/// Read-only consistency predicate used by the validation stage
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Name for logging
    fn name(&self) -> &'static str;

    /// Whether `label` is recognized by the store
    async fn is_consistent(&self, label: &str) -> Result<bool, CollaboratorError>;
}
