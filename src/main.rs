mod analysis;
mod error;
mod extract;
mod normalize;
mod pipeline;
mod rank;
mod render;
mod retry;
mod settings;
mod snapshot;
mod sources;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::Local;
use clap::{Parser, Subcommand};
use tracing::error;

use analysis::{AnalysisRun, AnthropicScorer};
use extract::WebExtractor;
use pipeline::Pipeline;
use retry::TokioSleeper;
use settings::Settings;
use snapshot::{SnapshotStore, DATE_FORMAT};
use sources::SourceSpec;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(
    name = "rank_crawler",
    about = "Daily ranked snapshots of 1688, Robinhood, GitHub Trending, HackerNews and ProductHunt"
)]
struct Cli {
    /// Settings file (default: rank_crawler.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, rank and snapshot every category not yet captured today
    Crawl {
        /// Only this source (1688, robinhood, github, hackernews, producthunt)
        #[arg(short, long)]
        source: Option<String>,
    },
    /// Score the latest stock snapshots with the LLM
    Analyze,
    /// Rebuild the HTML dashboards from the latest snapshots
    Render {
        #[arg(short, long)]
        source: Option<String>,
    },
    /// Regenerate the README data link sections
    Readme,
    /// Latest snapshot date per source and category
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("loading settings")?;
    let store = SnapshotStore::new(&settings.data_dir);

    let result = match cli.command {
        Commands::Crawl { source } => {
            let sources = sources::select(sources::catalogue(), source.as_deref())?;
            let spider = if sources.iter().any(SourceSpec::needs_crawler) {
                Some(extract::spider::client_from_env()?)
            } else {
                None
            };
            let http = reqwest::Client::builder()
                .user_agent(concat!("rank_crawler/", env!("CARGO_PKG_VERSION")))
                .connect_timeout(CONNECT_TIMEOUT)
                .timeout(settings.timeout())
                .build()
                .context("building http client")?;
            let extractor = WebExtractor::new(http, spider, settings.timeout());

            let categories: usize = sources.iter().map(|s| s.categories.len()).sum();
            println!("Crawling {} categories across {} sources...", categories, sources.len());
            let summary = Pipeline::new(&settings, &extractor, &TokioSleeper)
                .run(&sources, Local::now())
                .await;
            println!(
                "Done: {} written, {} skipped, {} failed.",
                summary.written, summary.skipped, summary.failed
            );
            Ok(())
        }
        Commands::Analyze => {
            let scorer = AnthropicScorer::from_env(
                &settings.analysis.model,
                settings.analysis.max_tokens,
                settings.timeout(),
            )?;
            let today = Local::now().date_naive();
            for source in sources::catalogue().iter().filter(|s| s.analyzable) {
                let snapshots = pipeline::latest_snapshots(&store, source);
                let run = analysis::analyze_latest(
                    &store,
                    &source.id,
                    &snapshots,
                    &scorer,
                    today,
                    settings.analysis.per_category,
                )
                .await;
                match run {
                    Ok(AnalysisRun::Skipped) => println!("{}: analysis for today already exists.", source.id),
                    Ok(AnalysisRun::Written { path, scored }) => {
                        println!("{}: scored {} stocks -> {}", source.id, scored, path.display())
                    }
                    Err(e) => error!(source = %source.id, error = %e, "analysis failed"),
                }
            }
            Ok(())
        }
        Commands::Render { source } => {
            let sources = sources::select(sources::catalogue(), source.as_deref())?;
            let generated = Local::now().format("%Y-%m-%d %H:%M").to_string();
            for source in &sources {
                match render::render_source(&store, source, &settings.docs_dir, &generated) {
                    Ok(path) => println!("{}: {}", source.id, path.display()),
                    Err(e) => error!(source = %source.id, error = %e, "dashboard not written"),
                }
            }
            Ok(())
        }
        Commands::Readme => {
            let sections = sources::catalogue()
                .iter()
                .map(|s| render::readme::collect_section(&store, s, &settings))
                .collect::<Vec<_>>();
            render::readme::update_readme(&settings.readme_path, &sections)
                .with_context(|| format!("updating {}", settings.readme_path.display()))?;
            println!(
                "Updated {} sections in {}",
                sections.len(),
                settings.readme_path.display()
            );
            Ok(())
        }
        Commands::Status => {
            let catalogue = sources::catalogue();
            let rows = pipeline::status(&store, &catalogue)?;
            println!("{:<12} | {:<28} | {:<10}", "Source", "Category", "Latest");
            println!("{}", "-".repeat(56));
            for r in &rows {
                let latest = r
                    .latest
                    .map(|d| d.format(DATE_FORMAT).to_string())
                    .unwrap_or_else(|| "-".into());
                println!("{:<12} | {:<28} | {:<10}", r.source_id, truncate(&r.category, 28), latest);
            }
            let captured = rows.iter().filter(|r| r.latest.is_some()).count();
            println!("\n{}/{} categories captured", captured, rows.len());
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
