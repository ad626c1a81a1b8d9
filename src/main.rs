// src/main.rs

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

use caseflow::case::{Case, History};
use caseflow::confidence::FixedConfidence;
use caseflow::config::PipelineConfig;
use caseflow::metrics::{MetricsCollector, MetricsSink};
use caseflow::pipeline::{PipelineBuilder, PipelineOutcome};
use caseflow::policy::FixedPolicy;

#[derive(Parser)]
#[command(name = "caseflow")]
#[command(about = "Staged decision-support pipeline")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one case through the pipeline
    Run {
        /// Case file (JSON). Uses the built-in demo case when omitted
        #[arg(short, long, env = "CASEFLOW_CASE")]
        case: Option<PathBuf>,

        /// Print the full outcome as JSON
        #[arg(long)]
        json: bool,

        /// Use this confidence for every candidate instead of sampling
        #[arg(long)]
        fixed_confidence: Option<f64>,

        /// Never veto during review
        #[arg(long)]
        no_veto: bool,
    },

    /// Run the built-in demo case (default)
    Demo,
}

fn demo_case() -> Case {
    Case::new("1234", vec!["fever".into(), "cough".into()], 65)
        .with_history(vec!["hypertension".into(), "flu last year".into()])
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let max_level = level.trim().parse::<Level>().unwrap_or_else(|_| {
        eprintln!("Unknown log level '{}', using info", level);
        Level::INFO
    });
    let subscriber = FmtSubscriber::builder()
        .with_max_level(max_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn print_outcome(outcome: &PipelineOutcome) {
    println!("Run {} for case {}", outcome.run_id, outcome.case_id);

    println!("\nFinal Recommendations:");
    if outcome.decisions.is_empty() {
        println!("  (none accepted)");
    }
    for decision in &outcome.decisions {
        println!("  {} (confidence {:.2})", decision.label, decision.confidence);
    }

    println!("\nExplanations:");
    for explanation in &outcome.explanations {
        println!("  {}", explanation);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = PipelineConfig::from_env();
    init_tracing(&config.log_level)?;

    let (case_path, json, fixed_confidence, no_veto) = match cli.command {
        Some(Commands::Run {
            case,
            json,
            fixed_confidence,
            no_veto,
        }) => (case, json, fixed_confidence, no_veto),
        Some(Commands::Demo) | None => (None, false, None, false),
    };

    let case = match &case_path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading case file {}", path.display()))?;
            Case::from_json(&raw)?
        }
        None => demo_case(),
    };

    let mut builder = PipelineBuilder::from_config(&config)?;
    if let Some(value) = fixed_confidence {
        if !(0.0..=1.0).contains(&value) {
            anyhow::bail!("--fixed-confidence must be within [0, 1], got {}", value);
        }
        builder = builder.estimator(FixedConfidence(value));
    }
    if no_veto {
        builder = builder.veto_policy(FixedPolicy(false));
    }
    let pipeline = builder.build();

    // Prior outcomes of earlier runs feed the confidence sampler
    let history = History::from_outcomes(config.history_capacity, [true, false, true]);

    info!(case_id = %case.id, enrichment = ?config.enrichment_mode, "Starting caseflow");
    let started = Instant::now();
    let outcome = pipeline.run(&case, &history).await?;
    let elapsed = started.elapsed();

    let metrics = MetricsCollector::new();
    if outcome.decisions.is_empty() {
        warn!(case_id = %case.id, "No candidate was accepted");
    }
    for decision in &outcome.decisions {
        metrics.record("pipeline", elapsed, decision.confidence, true);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome.to_json())?);
    } else {
        print_outcome(&outcome);
    }

    let summaries = metrics.summarize();
    if !json {
        println!("\nMetrics:");
        for s in &summaries {
            println!(
                "  {}: avg latency {:.3}s, avg confidence {:.2}, validation success {:.0}%",
                s.agent,
                s.avg_latency_ms / 1000.0,
                s.avg_confidence,
                s.validation_success_rate * 100.0
            );
        }
    }

    Ok(())
}
