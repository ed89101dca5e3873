use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use refscout_contracts::{CandidateSelector, RatingPolicy, DEFAULT_POOL_SIZE};
use refscout_engine::{
    FallbackSearcher, GelbooruProvider, SearchConfig, SearchOutcome, DEFAULT_FALLBACK_TAG,
    DEFAULT_RESULT_LIMIT,
};
use serde_json::json;

const EXHAUSTED_MESSAGE: &str = "no matching reference found; try a different description";

#[derive(Debug, Parser)]
#[command(
    name = "refscout",
    version,
    about = "Find anime reference images on Gelbooru with tag-degradation fallback"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Resolve a reference image URL for a tag description.
    Search(SearchArgs),
    /// Resolve, download, and save the reference image.
    Fetch(FetchArgs),
}

#[derive(Debug, Parser)]
struct SearchArgs {
    /// Free-form space-separated tags, most important first.
    #[arg(long)]
    tags: String,
    /// Result-count limit per provider query.
    #[arg(long, default_value_t = DEFAULT_RESULT_LIMIT)]
    limit: u32,
    /// Cap on provider queries (default: tag count + 2).
    #[arg(long)]
    max_attempts: Option<usize>,
    /// Tag tried once after every input tag has been dropped.
    #[arg(long, default_value = DEFAULT_FALLBACK_TAG)]
    fallback_tag: String,
    /// Winner is drawn at random from the top N posts by score.
    #[arg(long, default_value_t = DEFAULT_POOL_SIZE)]
    pool: usize,
    /// Comma-separated allowed ratings (e.g. "general,safe"); unset accepts all.
    #[arg(long)]
    ratings: Option<String>,
    /// Emit the full search outcome as one JSON object.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Parser)]
struct FetchArgs {
    #[command(flatten)]
    search: SearchArgs,
    /// Output directory for the downloaded image.
    #[arg(long)]
    out: PathBuf,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("refscout error: {err:#}");
            std::process::exit(2);
        }
    }
}

fn run() -> Result<i32> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Command::Search(args) => run_search(args),
        Command::Fetch(args) => run_fetch(args),
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn run_search(args: SearchArgs) -> Result<i32> {
    let (searcher, _provider) = build_searcher(&args)?;
    let outcome = searcher.search_description(&args.tags);
    report_outcome(&outcome, args.json);
    Ok(if outcome.is_resolved() { 0 } else { 1 })
}

fn run_fetch(args: FetchArgs) -> Result<i32> {
    let (searcher, provider) = build_searcher(&args.search)?;
    let outcome = searcher.search_description(&args.search.tags);
    let Some(url) = outcome.url.clone() else {
        report_outcome(&outcome, args.search.json);
        return Ok(1);
    };

    let bytes = provider.download(&url)?;
    let format = image::guess_format(&bytes)
        .with_context(|| format!("downloaded reference has an unrecognized image format ({url})"))?;
    let decoded = image::load_from_memory(&bytes)
        .with_context(|| format!("downloaded reference failed to decode ({url})"))?;
    let ext = format.extensions_str().first().copied().unwrap_or("bin");
    let path = save_reference(&args.out, &bytes, ext)?;

    println!("{url}");
    println!(
        "saved {}x{} reference to {}",
        decoded.width(),
        decoded.height(),
        path.display()
    );
    Ok(0)
}

fn build_searcher(args: &SearchArgs) -> Result<(FallbackSearcher, GelbooruProvider)> {
    let rating_policy = match args.ratings.as_deref() {
        Some(raw) => Some(rating_policy_from_arg(raw)?),
        None => None,
    };
    let selector = CandidateSelector::new(args.pool, rating_policy)?;
    let config = SearchConfig {
        fallback_tag: args.fallback_tag.clone(),
        result_limit: args.limit,
        max_attempts: args.max_attempts,
        ..SearchConfig::default()
    };
    let provider = GelbooruProvider::new()?;
    let searcher = FallbackSearcher::new(Box::new(provider.clone()), selector, config)?;
    Ok((searcher, provider))
}

fn rating_policy_from_arg(raw: &str) -> Result<RatingPolicy> {
    let names: Vec<&str> = raw
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .collect();
    RatingPolicy::from_names(names).context("invalid --ratings value")
}

fn report_outcome(outcome: &SearchOutcome, as_json: bool) {
    if as_json {
        let attempts: Vec<_> = outcome
            .attempts
            .iter()
            .map(|attempt| {
                json!({
                    "tags": attempt.tags,
                    "posts_returned": attempt.posts_returned,
                    "provider_error": attempt.provider_error,
                    "resolved": attempt.resolved,
                })
            })
            .collect();
        let payload = json!({
            "url": outcome.url,
            "attempts": attempts,
            "transient_errors": outcome.transient_errors,
        });
        println!("{payload}");
        return;
    }
    match &outcome.url {
        Some(url) => println!("{url}"),
        None => println!("{EXHAUSTED_MESSAGE}"),
    }
}

fn save_reference(dir: &Path, bytes: &[u8], ext: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("failed creating {}", dir.display()))?;
    let stamp = Utc::now().timestamp_millis();
    let path = dir.join(format!("reference-{stamp}.{ext}"));
    fs::write(&path, bytes).with_context(|| format!("failed writing {}", path.display()))?;
    Ok(path)
}
