use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use trend_miner::config::Config;
use trend_miner::enrich::openai::OpenAiAnalyzer;
use trend_miner::enrich::readme::GitHubReadmeClient;
use trend_miner::feed::github_search::GitHubSearchSource;
use trend_miner::feed::types::Project;
use trend_miner::pipeline::{Collaborators, TrendPipeline};
use trend_miner::scheduler::Scheduler;
use trend_miner::store::{BatchStore, ProcessedIndex};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "config.toml";

struct Args {
    config: PathBuf,
    once: bool,
    report: bool,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        config: PathBuf::from(DEFAULT_CONFIG),
        once: false,
        report: false,
    };
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--config" => {
                let path = it.next().context("--config needs a path")?;
                args.config = PathBuf::from(path);
            }
            "--once" => args.once = true,
            "--report" => args.report = true,
            other => anyhow::bail!("unknown argument: {} (expected --config PATH, --once, --report)", other),
        }
    }
    Ok(args)
}

fn init_tracing(config: &Config) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trend_miner=info"));
    match &config.logging.file {
        Some(path) => {
            let log_file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create log file: {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(log_file)
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
    Ok(())
}

/// Print every stored project grouped by language, most-starred first.
fn print_report(projects: Vec<Project>) {
    let mut by_language: BTreeMap<String, Vec<Project>> = BTreeMap::new();
    for p in projects {
        let lang = if p.language.is_empty() { "(unknown)".to_string() } else { p.language.clone() };
        by_language.entry(lang).or_default().push(p);
    }

    let total: usize = by_language.values().map(Vec::len).sum();
    println!();
    println!("  Stored projects: {}", total);
    for (lang, mut projects) in by_language {
        projects.sort_by(|a, b| b.stars.cmp(&a.stars));
        println!();
        println!("  {} ({})", lang, projects.len());
        for p in projects {
            println!("    {:>7}  {:<40}  {}", p.stars, p.id().to_string(), p.description);
        }
    }
    println!();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args()?;

    // Load saved keys from .env (real env vars take precedence)
    Config::load_env_file();
    let config = Config::load(Path::new(&args.config))?;
    init_tracing(&config)?;

    let store = Arc::new(BatchStore::open(&config.storage.dir)?);

    if args.report {
        print_report(store.load_all_projects()?);
        return Ok(());
    }

    println!();
    println!("  Trend Miner v{}", env!("CARGO_PKG_VERSION"));
    println!("  ================");
    println!();

    let github_token = Config::github_token();
    if github_token.is_none() {
        println!("  No GITHUB_TOKEN set: GitHub calls are unauthenticated (low rate limit).");
    }
    let openai_key = Config::openai_api_key()?;

    let batches = store.load_all()?;
    let index = Arc::new(ProcessedIndex::from_batches(&batches, config.storage.recency_window_days));
    tracing::info!(batches = batches.len(), projects = index.len(), "loaded processing history");

    let discovery = Arc::new(GitHubSearchSource::new(
        &config.github.api_base,
        github_token.clone(),
        config.github.per_page,
        Duration::from_millis(config.github.request_timeout_ms),
    )?);
    let readme = Arc::new(GitHubReadmeClient::new(&config.github.api_base, github_token)?);
    let analyzer = Arc::new(OpenAiAnalyzer::new(
        &config.analyzer.base_url,
        openai_key,
        &config.analyzer.model,
        config.analyzer.max_tokens,
        config.analyzer.max_readme_chars,
        Duration::from_millis(config.analyzer.request_timeout_ms),
    )?);
    let collaborators = Collaborators { discovery, readme, analyzer };

    let readme_timeout = Duration::from_millis(config.github.readme_timeout_ms);
    let mut scheduler = Scheduler::new();
    for pipeline_config in &config.pipelines {
        let pipeline = TrendPipeline::from_config(
            pipeline_config,
            readme_timeout,
            collaborators.clone(),
            store.clone(),
            index.clone(),
        )?;
        println!(
            "  Pipeline {:<16} scope {:<16} every {}s, {} callback(s)",
            pipeline.name,
            pipeline.scope.to_string(),
            pipeline.interval.as_secs(),
            pipeline.callback_count(),
        );
        scheduler.register(pipeline)?;
    }
    println!();

    if args.once {
        let failed = scheduler
            .run_once()
            .await
            .into_iter()
            .filter(|(_, r)| r.is_err())
            .count();
        if failed > 0 {
            anyhow::bail!("{} pipeline(s) failed discovery", failed);
        }
        return Ok(());
    }

    tokio::select! {
        _ = scheduler.run_forever() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted, shutting down");
        }
    }
    Ok(())
}
