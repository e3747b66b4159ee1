//! covgate - coverage gate CLI
//!
//! ## Commands
//!
//! - `review`: evaluate a merge request's changed files and emit review comments
//! - `resolve`: show which minimum coverage applies to given paths

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use covgate::{GcovrSummarizer, ReviewComment, ReviewConfig, ReviewPipeline};
use serde::Serialize;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "covgate")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Per-file coverage gate for merge request review", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate coverage of the changed files and print review comments as JSON
    Review {
        /// Review configuration file (JSON)
        #[arg(short, long, env = "COVGATE_CONFIG")]
        config: PathBuf,

        /// Write comments to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Coverage summarizer executable (overrides the config)
        #[arg(long)]
        summarizer: Option<String>,

        /// Summarizer timeout in seconds, 0 disables it (overrides the config)
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Base directory for the scratch workspace (overrides the config)
        #[arg(long)]
        scratch_dir: Option<PathBuf>,

        /// Exit with an error when any comment was produced
        #[arg(long)]
        fail_on_comments: bool,
    },

    /// Show the minimum coverage that applies to each path
    Resolve {
        /// Review configuration file (JSON)
        #[arg(short, long, env = "COVGATE_CONFIG")]
        config: PathBuf,

        /// Tree-relative paths to resolve
        #[arg(required = true)]
        paths: Vec<String>,
    },
}

#[derive(Serialize)]
struct ResolvedMinimum<'a> {
    path: &'a str,
    minimum: f64,
    used_fallback: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    covgate::init_tracing(cli.json, level);

    match cli.command {
        Commands::Review {
            config,
            output,
            summarizer,
            timeout_secs,
            scratch_dir,
            fail_on_comments,
        } => {
            cmd_review(
                &config,
                output.as_deref(),
                summarizer,
                timeout_secs,
                scratch_dir,
                fail_on_comments,
            )
            .await
        }
        Commands::Resolve { config, paths } => cmd_resolve(&config, &paths),
    }
}

fn load_config(path: &Path) -> Result<ReviewConfig> {
    ReviewConfig::from_path(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))
}

async fn cmd_review(
    config_path: &Path,
    output: Option<&Path>,
    summarizer: Option<String>,
    timeout_secs: Option<u64>,
    scratch_dir: Option<PathBuf>,
    fail_on_comments: bool,
) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(binary) = summarizer {
        config.configs.summarizer.binary = binary;
    }
    if let Some(secs) = timeout_secs {
        config.configs.summarizer.timeout_secs = secs;
    }
    if scratch_dir.is_some() {
        config.configs.scratch_dir = scratch_dir;
    }

    let settings = config.compile().context("Invalid review configuration")?;
    let summarizer = GcovrSummarizer::new(settings.summarizer.clone());

    let report = ReviewPipeline::run(
        &settings,
        &config.merge.merge_request_id,
        &config.merge.changes,
        &summarizer,
    )
    .await
    .context("Coverage review failed")?;

    info!(
        run_id = %report.run_id,
        comments = report.comments.len(),
        passed = report.passed_count(),
        failed = report.failed_count(),
        skipped = report.skipped.len(),
        "Coverage review finished"
    );

    write_comments(&report.comments, output)?;

    if fail_on_comments && !report.comments.is_empty() {
        anyhow::bail!(
            "{} coverage comment(s) produced for merge request {}",
            report.comments.len(),
            config.merge.merge_request_id
        );
    }
    Ok(())
}

fn write_comments(comments: &[ReviewComment], output: Option<&Path>) -> Result<()> {
    let payload = serde_json::to_string_pretty(comments)?;
    match output {
        Some(path) => std::fs::write(path, payload)
            .with_context(|| format!("Failed to write comments to {}", path.display()))?,
        None => println!("{payload}"),
    }
    Ok(())
}

fn cmd_resolve(config_path: &Path, paths: &[String]) -> Result<()> {
    let config = load_config(config_path)?;
    let settings = config.compile().context("Invalid review configuration")?;

    let resolved: Vec<_> = paths
        .iter()
        .map(|path| {
            let minimum = settings.policy.resolve(path);
            ResolvedMinimum {
                path,
                minimum: minimum.minimum,
                used_fallback: minimum.used_fallback,
            }
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&resolved)?);
    Ok(())
}
