// src/lib.rs
// caseflow - staged decision-support pipeline

pub mod case;
pub mod collaborators;
pub mod config;
pub mod confidence;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod policy;

pub use case::{Case, Decision, History};
pub use config::PipelineConfig;
pub use error::{CollaboratorError, ConfigError, PipelineError};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineOutcome};
