//! `corpus` command-line entry point.
//!
//! Builds training corpora from a pipeline config and validates generated
//! signal records.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use corpus_core::PipelineConfig;
use corpus_ingestion::SourceCatalog;
use corpus_mix::{CorpusPipeline, CorpusWriter};
use corpus_validation::{SchemaValidator, ValidationReport, ValidatorOptions};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "corpus")]
#[command(about = "Build and validate trading-signal training corpora")]
#[command(version)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "CORPUS_JSON_LOGS")]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the corpus and write splits plus manifest
    Build {
        /// Pipeline config (JSON or TOML)
        #[arg(short, long)]
        config: PathBuf,

        /// Output directory (overrides `output_dir` in the config)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show pools and allocation without writing anything
    Plan {
        /// Pipeline config (JSON or TOML)
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Validate a generated record (stdin when no input is given)
    Validate {
        /// File holding the candidate text
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Treat each non-empty line as a separate candidate
        #[arg(long)]
        lines: bool,

        /// Accept fields outside the canonical schema
        #[arg(long)]
        allow_unknown_fields: bool,

        /// Do not strip a surrounding Markdown code fence
        #[arg(long)]
        keep_code_fences: bool,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn load(config: &Path) -> anyhow::Result<(PipelineConfig, SourceCatalog, CorpusPipeline)> {
    tracing::info!(config = %config.display(), "loading pipeline config");
    let config = PipelineConfig::from_path(config)
        .with_context(|| format!("failed to load config {}", config.display()))?;
    let pipeline = CorpusPipeline::from_config(&config).context("invalid pipeline config")?;
    let catalog = SourceCatalog::from_config(&config).context("failed to register sources")?;
    Ok((config, catalog, pipeline))
}

fn build(config: &Path, output: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, catalog, pipeline) = load(config)?;
    let Some(dir) = output.or(config.output_dir) else {
        bail!("no output directory: pass --output or set output_dir in the config");
    };

    let build = pipeline.run(&catalog).context("corpus build failed")?;
    let paths = CorpusWriter
        .write(&build, &dir)
        .with_context(|| format!("failed to write corpus to {}", dir.display()))?;

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "paths": paths,
            "manifest": build.manifest,
        }))?
    );
    Ok(())
}

fn plan(config: &Path) -> anyhow::Result<()> {
    let (_, catalog, pipeline) = load(config)?;
    let plan = pipeline.plan(&catalog).context("allocation failed")?;
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

fn validate(
    input: Option<PathBuf>,
    lines: bool,
    options: ValidatorOptions,
) -> anyhow::Result<ExitCode> {
    let text = match &input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read stdin")?;
            buf
        }
    };

    let validator = SchemaValidator::with_options(options);
    let (reports, all_valid) = check_candidates(&validator, &text, lines);
    for report in &reports {
        if lines {
            println!("{}", serde_json::to_string(report)?);
        } else {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
    }

    Ok(if all_valid {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Validate `text` as one candidate, or as one candidate per non-empty line.
///
/// Returns the reports in input order and whether every candidate is valid.
fn check_candidates(
    validator: &SchemaValidator,
    text: &str,
    lines: bool,
) -> (Vec<ValidationReport>, bool) {
    let reports = if lines {
        let candidates: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        validator.validate_batch(&candidates)
    } else {
        vec![validator.validate(text)]
    };
    let all_valid = reports.iter().all(|r| r.is_valid());
    (reports, all_valid)
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    match cli.command {
        Commands::Build { config, output } => build(&config, output)?,
        Commands::Plan { config } => plan(&config)?,
        Commands::Validate {
            input,
            lines,
            allow_unknown_fields,
            keep_code_fences,
        } => {
            let options = ValidatorOptions {
                strip_code_fences: !keep_code_fences,
                allow_unknown_fields,
            };
            return validate(input, lines, options);
        }
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use corpus_validation::ValidationState;

    const VALID: &str = r#"{"action":"BUY","confidence":78,"current_price":100.0,"stop_loss":95.0,"take_profit":110.0,"forecast_10d":[101.0,102.0,103.0,104.0,105.0,106.0,107.0,108.0,109.0,110.0],"analysis":"Breakout on volume.","risk_score":0.3,"technical_indicators":{"rsi":60.0}}"#;

    #[test]
    fn test_lines_mode_reports_each_candidate() {
        let text = format!("{VALID}\n\n   \nnot json\n{VALID}\n");
        let (reports, all_valid) = check_candidates(&SchemaValidator::new(), &text, true);
        assert!(!all_valid);
        let states: Vec<_> = reports.iter().map(|r| r.state).collect();
        assert_eq!(
            states,
            vec![
                ValidationState::Valid,
                ValidationState::MalformedJson,
                ValidationState::Valid
            ]
        );
    }

    #[test]
    fn test_lines_mode_all_valid() {
        let text = format!("{VALID}\n\n{VALID}");
        let (reports, all_valid) = check_candidates(&SchemaValidator::new(), &text, true);
        assert_eq!(reports.len(), 2);
        assert!(all_valid);
    }

    #[test]
    fn test_whole_text_is_one_candidate() {
        let (reports, all_valid) = check_candidates(&SchemaValidator::new(), VALID, false);
        assert_eq!(reports.len(), 1);
        assert!(all_valid);

        let text = format!("{VALID}\n{VALID}");
        let (reports, all_valid) = check_candidates(&SchemaValidator::new(), &text, false);
        assert_eq!(reports.len(), 1);
        assert!(!all_valid);
    }

    #[test]
    fn test_blank_input_in_lines_mode() {
        let (reports, all_valid) = check_candidates(&SchemaValidator::new(), "\n  \n", true);
        assert!(reports.is_empty());
        assert!(all_valid);
    }
}
