//! Faculty directory scout CLI
//!
//! Runs the pipeline against one or more university websites and prints a
//! JSON summary per root. Profiles go to a JSON Lines file with `--output`.
//!
//! Collaborators are picked up from the environment:
//! - `OPENAI_API_KEY` enables model fallbacks (`OPENAI_MODEL` overrides the model)
//! - `TAVILY_API_KEY` enables the search discovery tier
//! - `SCOUT_*` variables override pipeline tuning (see `config.rs`)

mod config;
mod sink;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use faculty_scout::pipeline::DiscoveryReport;
use faculty_scout::{
    DiscoveryMode, HttpGateway, OpenAiClassifier, Pipeline, PipelineResult, RunLimits, TavilySearcher,
};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::Config;
use sink::JsonLinesSink;

#[derive(Parser)]
#[command(name = "faculty-scout")]
#[command(about = "Find university faculty directories and extract profiles")]
struct Cli {
    /// JSON file with pipeline configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover, classify and extract profiles for each root URL
    Run {
        /// Root URLs or bare hosts
        #[arg(required = true)]
        roots: Vec<String>,

        #[command(flatten)]
        limits: LimitArgs,

        /// Append profiles to this JSON Lines file
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Only rank candidate directory URLs
    Discover {
        root: String,

        #[command(flatten)]
        limits: LimitArgs,
    },
}

#[derive(clap::Args)]
struct LimitArgs {
    /// auto, sitemap, deep or search
    #[arg(long, default_value = "auto")]
    mode: DiscoveryMode,

    #[arg(long, default_value_t = 10)]
    max_candidates: usize,

    /// Pages followed per paginated directory
    #[arg(long, default_value_t = 20)]
    max_pages: usize,

    /// Recursion depth into department directories
    #[arg(long, default_value_t = 1)]
    gateway_depth: usize,

    /// Per-run deadline in seconds
    #[arg(long)]
    deadline: Option<u64>,

    /// Institution name for search queries
    #[arg(long)]
    institution: Option<String>,
}

impl LimitArgs {
    fn to_limits(&self) -> RunLimits {
        let mut limits = RunLimits::new()
            .with_max_candidates(self.max_candidates)
            .with_max_pages(self.max_pages)
            .with_gateway_depth(self.gateway_depth);
        if let Some(secs) = self.deadline {
            limits = limits.with_deadline(Duration::from_secs(secs));
        }
        if let Some(name) = &self.institution {
            limits = limits.with_institution_name(name);
        }
        limits
    }
}

// ============================================================================
// JSON Response Types
// ============================================================================

#[derive(Serialize)]
struct RunSummary {
    root: String,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<String>,
    profiles: usize,
    pages_visited: usize,
    failures: usize,
    blocked_domains: Vec<String>,
    partial: bool,
}

impl RunSummary {
    fn from_result(root: &str, result: &PipelineResult) -> Self {
        Self {
            root: root.to_string(),
            success: true,
            error: None,
            run_id: Some(result.run_id.to_string()),
            outcome: Some(format!("{:?}", result.outcome)),
            profiles: result.candidates.len(),
            pages_visited: result.pages_visited,
            failures: result.failures.len(),
            blocked_domains: result.blocked_domains.clone(),
            partial: result.partial,
        }
    }

    fn from_error(root: &str, error: impl ToString) -> Self {
        Self {
            root: root.to_string(),
            success: false,
            error: Some(error.to_string()),
            run_id: None,
            outcome: None,
            profiles: 0,
            pages_visited: 0,
            failures: 0,
            blocked_domains: Vec::new(),
            partial: false,
        }
    }
}

#[derive(Serialize)]
struct CandidateLine {
    url: String,
    score: f32,
    source: String,
    discovered_from: String,
}

#[derive(Serialize)]
struct DiscoverySummary {
    root: String,
    confidence: String,
    pages_fetched: usize,
    blocked: bool,
    candidates: Vec<CandidateLine>,
    skipped: Vec<String>,
}

impl DiscoverySummary {
    fn new(root: &str, report: DiscoveryReport) -> Self {
        Self {
            root: root.to_string(),
            confidence: format!("{:?}", report.confidence),
            pages_fetched: report.pages_fetched,
            blocked: report.blocked,
            candidates: report
                .candidates
                .into_iter()
                .map(|c| CandidateLine {
                    url: c.url,
                    score: c.score,
                    source: format!("{:?}", c.source_tier),
                    discovered_from: c.discovered_from,
                })
                .collect(),
            skipped: report
                .skipped
                .into_iter()
                .map(|s| format!("{:?}: {}", s.tier, s.reason))
                .collect(),
        }
    }
}

fn build_pipeline(config: Config, output: Option<&PathBuf>) -> Pipeline {
    let mut gateway = HttpGateway::new();
    if let Some(user_agent) = &config.user_agent {
        gateway = gateway.with_user_agent(user_agent);
    }
    let mut pipeline = Pipeline::new(Arc::new(gateway), config.scout);

    match OpenAiClassifier::from_env() {
        Some(mut classifier) => {
            if let Some(model) = &config.openai_model {
                classifier = classifier.with_model(model);
            }
            info!(model = classifier.model(), "Model fallbacks enabled");
            pipeline = pipeline.with_classifier(Arc::new(classifier));
        }
        None => warn!("OPENAI_API_KEY not set, running heuristics only"),
    }

    match TavilySearcher::from_env() {
        Some(searcher) => pipeline = pipeline.with_searcher(Arc::new(searcher)),
        None => info!("TAVILY_API_KEY not set, search discovery disabled"),
    }

    if let Some(path) = output {
        info!(path = %path.display(), "Writing profiles as JSON Lines");
        pipeline = pipeline.with_sink(Arc::new(JsonLinesSink::new(path)));
    }

    pipeline
}

fn print_json(value: &impl Serialize) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{rendered}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,faculty_scout=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_line_number(true),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Run { roots, limits, output } => {
            let pipeline = build_pipeline(config, output.as_ref());

            let cancel = pipeline.cancellation_token();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, cancelling runs");
                    cancel.cancel();
                }
            });

            let results = pipeline.run_all(&roots, limits.mode, &limits.to_limits()).await;
            let summaries: Vec<RunSummary> = roots
                .iter()
                .zip(&results)
                .map(|(root, result)| match result {
                    Ok(result) => RunSummary::from_result(root, result),
                    Err(e) => RunSummary::from_error(root, e),
                })
                .collect();
            print_json(&summaries)?;
        }
        Commands::Discover { root, limits } => {
            let pipeline = build_pipeline(config, None);
            let report = pipeline
                .discover(&root, limits.mode, &limits.to_limits())
                .await
                .with_context(|| format!("Cannot discover {root}"))?;
            print_json(&DiscoverySummary::new(&root, report))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_args_to_limits() {
        let cli = Cli::parse_from([
            "faculty-scout",
            "run",
            "a.edu",
            "https://b.edu",
            "--mode",
            "sitemap",
            "--max-pages",
            "5",
            "--deadline",
            "0",
        ]);
        let Commands::Run { roots, limits, output } = cli.command else {
            panic!("expected run");
        };
        assert_eq!(roots, vec!["a.edu", "https://b.edu"]);
        assert_eq!(limits.mode, DiscoveryMode::Sitemap);
        assert!(output.is_none());

        let limits = limits.to_limits();
        assert_eq!(limits.max_pages_per_directory, 5);
        assert_eq!(limits.max_candidates, 10);
        assert_eq!(limits.deadline_secs, Some(1));
    }

    #[test]
    fn test_unknown_mode_rejected() {
        assert!(Cli::try_parse_from(["faculty-scout", "discover", "a.edu", "--mode", "guess"]).is_err());
    }

    #[test]
    fn test_error_summary() {
        let summary = RunSummary::from_error("nope", "invalid root URL: nope");
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["success"], false);
        assert!(json.get("run_id").is_none());
    }
}
