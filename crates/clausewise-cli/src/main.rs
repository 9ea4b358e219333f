use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use clausewise_ai::{DecisionEngine, HttpEmbedder};
use clausewise_cli::display;
use clausewise_cli::{Config, Pipeline};
use clausewise_core::AttributeExtractor;
use clausewise_store::{ClauseIndex, load_clauses_from_path};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "clausewise",
    version,
    about = "Decide insurance queries against policy clauses"
)]
struct Cli {
    /// Config file (TOML)
    #[arg(long, global = true, env = "CLAUSEWISE_CONFIG")]
    config: Option<PathBuf>,

    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Minimum similarity for a clause to count
    #[arg(long, global = true)]
    threshold: Option<f32>,

    /// Candidate clauses retrieved per query
    #[arg(long, global = true)]
    top_k: Option<usize>,

    #[arg(long, global = true, env = "CLAUSEWISE_EMBEDDER_URL")]
    embedder_url: Option<String>,

    /// Per-attempt embedder timeout in milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the attributes extracted from a query
    Extract {
        query: String,
        #[arg(long, help = "Output machine-readable JSON")]
        json: bool,
    },
    /// Decide one or more queries against a clause corpus
    Decide {
        #[arg(long)]
        clauses: PathBuf,
        #[arg(required = true)]
        queries: Vec<String>,
        #[arg(long, help = "Output machine-readable JSON")]
        json: bool,
    },
    /// Show the clauses ranked for a query
    Search {
        #[arg(long)]
        clauses: PathBuf,
        query: String,
        #[arg(short)]
        k: Option<usize>,
        #[arg(long, help = "Output machine-readable JSON")]
        json: bool,
    },
    /// Load a clause corpus and report what was skipped
    Check {
        #[arg(long)]
        clauses: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = load_config(&cli)?;

    match cli.command {
        Commands::Extract { query, json } => {
            let extractor = AttributeExtractor::new(config.synonym_tables()?)?;
            let structured = extractor.extract(&query);
            if json {
                println!("{}", serde_json::to_string_pretty(&structured)?);
            } else {
                print!("{}", display::render_query(&structured));
            }
        }
        Commands::Decide {
            clauses,
            queries,
            json,
        } => {
            let pipeline = build_pipeline(&config, &clauses)?;
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_signal.cancel();
                }
            });

            let results = pipeline.decide_many(&queries, &cancel).await;
            let mut records = Vec::with_capacity(results.len());
            for (text, result) in queries.iter().zip(results) {
                let outcome = result.with_context(|| format!("deciding {text:?}"))?;
                if json {
                    records.push(display::outcome_json(&outcome));
                } else {
                    print!("{}", display::render_outcome(&outcome));
                }
            }
            if json {
                let out = if records.len() == 1 {
                    records.remove(0)
                } else {
                    serde_json::Value::Array(records)
                };
                println!("{}", serde_json::to_string_pretty(&out)?);
            }
        }
        Commands::Search {
            clauses,
            query,
            k,
            json,
        } => {
            let pipeline = build_pipeline(&config, &clauses)?;
            let k = k.unwrap_or(config.search.top_k);
            let (structured, matches) = pipeline
                .search(&query, k)
                .await
                .context("searching clauses")?;
            if json {
                let out = serde_json::json!({
                    "query": structured,
                    "matches": display::matches_json(&matches),
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                print!("{}", display::render_matches(&structured, &matches));
            }
        }
        Commands::Check { clauses } => {
            let report = load_clauses_from_path(&clauses)
                .with_context(|| format!("loading {}", clauses.display()))?;
            print!(
                "{}",
                display::render_load_report(&clauses.display().to_string(), &report)
            );
            if report.clauses.is_empty() {
                anyhow::bail!("no valid clauses in {}", clauses.display());
            }
        }
    }

    Ok(())
}

/// File config with command-line overrides applied, validated once.
fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = Config::load(cli.config.as_deref()).context("loading config")?;
    if let Some(threshold) = cli.threshold {
        config.decision.threshold = threshold;
    }
    if let Some(top_k) = cli.top_k {
        config.search.top_k = top_k;
    }
    if let Some(url) = &cli.embedder_url {
        config.embedder.url = url.clone();
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config.embedder.timeout_ms = timeout_ms;
    }
    config.validate().context("validating config")?;
    Ok(config)
}

fn build_pipeline(config: &Config, clauses: &Path) -> anyhow::Result<Pipeline> {
    let report = load_clauses_from_path(clauses)
        .with_context(|| format!("loading {}", clauses.display()))?;
    let index = Arc::new(ClauseIndex::build(report.clauses));
    anyhow::ensure!(
        !index.is_empty(),
        "no valid clauses in {}",
        clauses.display()
    );

    let mut embedder = HttpEmbedder::new(&config.embedder.url, &config.embedder.model);
    if let Some(dim) = index.dim() {
        embedder = embedder.with_dim(dim);
    }
    info!(
        clauses = index.len(),
        embedder = %embedder.base_url(),
        "pipeline ready"
    );

    let extractor = AttributeExtractor::new(config.synonym_tables()?)?;
    let engine = DecisionEngine::new(config.decision.clone())?;
    let pipeline = Pipeline::new(extractor, Arc::new(embedder), index, engine)
        .with_top_k(config.search.top_k)?
        .with_retry(config.retry_policy());
    Ok(pipeline)
}
