//! churnpipe CLI Module
//!
//! Thin command layer over [`TrainingPipeline`]: `train` runs a full pipeline,
//! `validate` stops after schema validation.

use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::evaluation::SelectionResult;
use crate::pipeline::TrainingPipeline;
use crate::validation::{RuleOutcome, Severity, ValidationReport};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString { s.truecolor(100, 210, 120) }
fn bad(s: &str) -> ColoredString { s.truecolor(235, 100, 100) }
fn caution(s: &str) -> ColoredString { s.truecolor(230, 190, 90) }

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(72)));
}

fn kv(key: &str, val: &str) {
    println!("  {:<18} {}", muted(key), val.white());
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "churnpipe")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Train, evaluate and select churn prediction models")]
#[command(long_about = None)]
pub struct Cli {
    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full training pipeline
    Train {
        /// Pipeline configuration (YAML or JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Override data.path
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Override artifacts.output_dir
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Use this run identifier instead of a generated one
        #[arg(long)]
        run_id: Option<String>,
    },

    /// Ingest and validate the data without training
    Validate {
        /// Pipeline configuration (YAML or JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Override data.path
        #[arg(short, long)]
        data: Option<PathBuf>,
    },
}

fn load_config(path: &Path, data: Option<&Path>, output_dir: Option<&Path>) -> Result<PipelineConfig, PipelineError> {
    let mut config = PipelineConfig::from_file(path)?;
    if let Some(data) = data {
        config = config.with_data_path(data);
    }
    if let Some(dir) = output_dir {
        config = config.with_output_dir(dir);
    }
    Ok(config)
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_train(
    config_path: &Path,
    data: Option<&Path>,
    output_dir: Option<&Path>,
    run_id: Option<&str>,
) -> anyhow::Result<()> {
    section("Train");

    let config = load_config(config_path, data, output_dir)?;
    let pipeline = TrainingPipeline::new(config)?;
    let mut ctx = pipeline.context();
    if let Some(id) = run_id {
        ctx = ctx.with_run_id(id);
    }

    kv("Run", &ctx.run_id);
    kv("Backends", &ctx.config.backends.iter().map(|b| b.name()).collect::<Vec<_>>().join(", "));
    println!();

    step_run("Running pipeline");
    let start = Instant::now();
    let outcome = match pipeline.run(&ctx) {
        Ok(outcome) => outcome,
        Err(err) => {
            println!("{}", bad("failed"));
            return Err(err.into());
        }
    };
    step_done(&format!("{:.2?}", start.elapsed()));

    print_ranking(&outcome.selection);

    for failure in &outcome.failures {
        println!("  {} {} {}", bad("✗"), failure.backend, dim(&failure.reason));
    }

    println!();
    let verdict = if outcome.selection.below_target {
        caution("below target")
    } else {
        ok("meets thresholds")
    };
    println!(
        "  {} {} {}",
        muted("Selected"),
        outcome.selection.selected_backend.white().bold(),
        verdict
    );
    kv("Artifacts", &outcome.output_dir.display().to_string());
    println!();

    Ok(())
}

pub fn cmd_validate(config_path: &Path, data: Option<&Path>) -> anyhow::Result<()> {
    section("Validate");

    let config = load_config(config_path, data, None)?;
    let pipeline = TrainingPipeline::untracked(config)?;
    let ctx = pipeline.context();
    let source = ctx.config.data_source()?;

    step_run("Ingesting and validating");
    let (split, validation) = pipeline.validate(&ctx, &source)?;
    step_done(&format!("{} train / {} test rows", split.train.len(), split.test.len()));

    print_report(&validation.train);
    print_report(&validation.test);
    println!();

    if !validation.passed {
        return Err(PipelineError::ValidationFailure {
            train_failures: validation.train.blocking_failures(),
            test_failures: validation.test.blocking_failures(),
        }
        .into());
    }
    println!("  {}", ok("validation passed"));
    println!();
    Ok(())
}

fn print_ranking(selection: &SelectionResult) {
    section("Ranking");
    let primary = selection.policy.primary;
    let secondary = selection.policy.secondary;
    println!(
        "  {}",
        muted(&format!(
            "{:<4} {:<22} {:>10} {:>10} {:>8} {:>8}  {}",
            "#", "backend", primary, secondary, "recall", "prec", "thresholds"
        ))
    );
    for row in &selection.ranking {
        let status = if row.meets_thresholds {
            ok("met")
        } else {
            let unmet: Vec<String> = row.unmet_thresholds.iter().map(|m| m.to_string()).collect();
            caution(&format!("unmet: {}", unmet.join(", ")))
        };
        let backend = format!("{:<22}", row.backend);
        println!(
            "  {:<4} {} {:>10.4} {:>10.4} {:>8.4} {:>8.4}  {}",
            row.rank,
            if row.rank == 1 { backend.cyan() } else { backend.white() },
            row.metrics.get(primary),
            row.metrics.get(secondary),
            row.metrics.recall,
            row.metrics.precision,
            status
        );
    }
}

fn print_report(report: &ValidationReport) {
    section(&format!(
        "{} ({} rows, positive rate {:.3})",
        report.dataset, report.n_rows, report.positive_rate
    ));
    for rule in &report.rules {
        let mark = match (rule.outcome, rule.severity) {
            (RuleOutcome::Passed, _) => ok("✓"),
            (RuleOutcome::Skipped, _) => dim("-"),
            (RuleOutcome::Failed, Severity::Warning) => caution("!"),
            (RuleOutcome::Failed, Severity::Error) => bad("✗"),
        };
        let column = rule.column.as_deref().unwrap_or("(dataset)");
        println!(
            "  {} {:<20} {:<18} {}",
            mark,
            column,
            format!("{:?}", rule.rule),
            dim(&rule.message)
        );
    }
}
