//! # gcodeprep
//!
//! Command line host: preprocesses G-code files in place with the configured
//! pipeline.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use gcodeprep::{init_logging, Config, PipelineError, PreprocessOutcome, BUILD_DATE, VERSION};

/// Multi-pass G-code preprocessor for multi-tool printers.
#[derive(Parser, Debug)]
#[command(name = "gcodeprep", version, about)]
struct Cli {
    /// Configuration file (.toml or .json); defaults to the user config directory.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// List the configured processors and exit.
    #[arg(short, long)]
    list: bool,

    /// Print one JSON object per file instead of a summary line.
    #[arg(long)]
    json: bool,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// G-code files to preprocess in place.
    #[arg(value_name = "FILE", required_unless_present = "list")]
    files: Vec<PathBuf>,
}

impl Cli {
    fn log_level(&self) -> tracing::Level {
        match self.verbose {
            0 => tracing::Level::INFO,
            1 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }
}

fn list(config: &Config, json: bool) -> Result<()> {
    let processors = gcodeprep::list_processors(config)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&processors)?);
        return Ok(());
    }
    for info in processors {
        let state = if info.enabled { "enabled" } else { "disabled" };
        println!("{:<20} [{}] {}", info.name, state, info.description);
    }
    Ok(())
}

fn summary(outcome: &PreprocessOutcome) -> String {
    match outcome {
        PreprocessOutcome::AlreadyProcessed => "already processed".to_string(),
        PreprocessOutcome::Skipped { reason } => format!("skipped ({})", reason),
        PreprocessOutcome::Processed(report) => format!(
            "processed: {} -> {} lines by {}",
            report.input_lines,
            report.output_lines,
            report.processors.join(", ")
        ),
        PreprocessOutcome::Failed {
            plugin,
            stage,
            reason,
        } => format!("FAILED in {} during {}: {}", plugin, stage, reason),
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.log_level())?;
    tracing::debug!("gcodeprep {} (built {})", VERSION, BUILD_DATE);

    let config = Config::load_or_default(cli.config.as_deref())
        .context("Failed to load configuration")?;

    if cli.list {
        list(&config, cli.json)?;
        return Ok(ExitCode::SUCCESS);
    }

    let pipeline = gcodeprep::build_pipeline(&config)?;
    let mut failures = 0usize;

    for path in &cli.files {
        match pipeline.run(path) {
            Ok(outcome) => {
                if !outcome.is_success() {
                    failures += 1;
                }
                if cli.json {
                    let value = serde_json::json!({ "file": path, "outcome": outcome });
                    println!("{}", serde_json::to_string(&value)?);
                } else {
                    println!("{}: {}", path.display(), summary(&outcome));
                }
            }
            Err(err) => {
                failures += 1;
                if matches!(err, PipelineError::Write { .. }) {
                    tracing::error!("{} (original file left unchanged)", err);
                } else {
                    tracing::error!("{}", err);
                }
                if cli.json {
                    let value = serde_json::json!({ "file": path, "error": err.to_string() });
                    println!("{}", serde_json::to_string(&value)?);
                }
            }
        }
    }

    if failures > 0 {
        tracing::warn!("{} of {} files failed", failures, cli.files.len());
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
