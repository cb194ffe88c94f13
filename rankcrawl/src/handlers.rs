use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::ArgMatches;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use rankcrawl_core::crawl::{
    CrawlOptions, CrawlProgress, CrawlProgressCallback, CrawlScope, execute_crawl,
};
use rankcrawl_core::rank::RankEngine;
use rankcrawl_core::report::{RankedSnapshot, ReportFormat, default_output_path};
use rankcrawl_scanner::{HttpFetcher, ProgressCallback};
use rankcrawl_scanner::normalize::normalize_url;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;
use url::Url;

/// Everything `rankcrawl crawl` needs, resolved from the command line.
#[derive(Debug, Clone)]
pub struct CrawlSettings {
    pub options: CrawlOptions,
    pub damping: f64,
    pub top: usize,
    pub format: ReportFormat,
    pub output: PathBuf,
}

/// Parse a start URL, adding http:// when no scheme is given
pub fn parse_start_url(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    // Try to parse as-is
    if let Ok(url) = normalize_url(line) {
        return Some(url);
    }

    // Try adding http://
    normalize_url(&format!("http://{}", line)).ok()
}

/// Extract the path component from a URL
pub fn extract_url_path(url: &str) -> String {
    Url::parse(url)
        .ok()
        .map(|u| {
            let path = u.path().to_string();
            if path.is_empty() || path == "/" {
                "/".to_string()
            } else {
                path
            }
        })
        .unwrap_or_else(|| url.to_string())
}

/// Validate raw CLI values into crawl options. Fails before any fetching.
pub fn build_crawl_options(
    url: &str,
    duration_secs: u64,
    threads: usize,
    timeout_secs: u64,
    batch_size: Option<usize>,
    same_host: bool,
) -> Result<CrawlOptions> {
    let Some(start_url) = parse_start_url(url) else {
        bail!("Invalid start URL '{}'", url);
    };
    if threads == 0 {
        bail!("--threads must be at least 1");
    }
    if timeout_secs == 0 {
        bail!("--timeout must be at least 1 second");
    }
    match batch_size {
        Some(0) => bail!("--batch-size must be at least 1"),
        Some(size) if size > threads => {
            bail!("--batch-size ({}) cannot exceed --threads ({})", size, threads)
        }
        _ => {}
    }

    Ok(CrawlOptions {
        start_url,
        max_duration: Duration::from_secs(duration_secs),
        concurrency: threads,
        fetch_timeout: Duration::from_secs(timeout_secs),
        batch_size,
        scope: if same_host {
            CrawlScope::SameHost
        } else {
            CrawlScope::AnyHost
        },
    })
}

/// Use the given output path, or a timestamped file under `data/`
pub fn resolve_output_path(output: Option<&PathBuf>) -> PathBuf {
    output
        .cloned()
        .unwrap_or_else(|| default_output_path(Utc::now()))
}

pub fn crawl_settings_from_matches(sub_matches: &ArgMatches) -> Result<CrawlSettings> {
    let url = sub_matches
        .get_one::<String>("url")
        .context("--url is required")?;
    let duration = sub_matches.get_one::<u64>("duration").copied().unwrap_or(30);
    let threads = sub_matches.get_one::<usize>("threads").copied().unwrap_or(10);
    let timeout = sub_matches.get_one::<u64>("timeout").copied().unwrap_or(10);
    let batch_size = sub_matches.get_one::<usize>("batch-size").copied();
    let same_host = sub_matches.get_flag("same-host");
    let damping = sub_matches.get_one::<f64>("damping").copied().unwrap_or(0.85);
    let top = sub_matches.get_one::<usize>("top").copied().unwrap_or(20);
    let format = sub_matches
        .get_one::<String>("format")
        .and_then(|f| ReportFormat::from_str(f))
        .unwrap_or(ReportFormat::Text);

    Ok(CrawlSettings {
        options: build_crawl_options(url, duration, threads, timeout, batch_size, same_host)?,
        damping,
        top,
        format,
        output: resolve_output_path(sub_matches.get_one::<PathBuf>("output")),
    })
}

pub fn init_tracing(verbose: bool, quiet: bool) {
    let level = if verbose {
        Level::DEBUG
    } else if quiet {
        Level::WARN
    } else {
        Level::INFO
    };
    // A subscriber may already be installed (e.g. by tests); keep it.
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init();
}

pub fn print_banner() {
    println!(
        "{} {}",
        "rankcrawl".bright_cyan().bold(),
        env!("CARGO_PKG_VERSION").bright_black()
    );
    println!("{}", "time-boxed crawling, ranked".bright_black());
    println!();
}

fn crawl_spinner(quiet: bool) -> Result<ProgressBar> {
    if quiet {
        return Ok(ProgressBar::hidden());
    }
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message("Starting crawl...");
    Ok(spinner)
}

/// Crawl, rank and save. Returns the snapshot that was written.
pub async fn run_crawl(settings: &CrawlSettings, spinner: &ProgressBar) -> Result<RankedSnapshot> {
    let engine = RankEngine::with_damping(settings.damping)?;
    let timeout_secs = settings.options.fetch_timeout.as_secs().max(1);
    let fetcher = Arc::new(HttpFetcher::with_timeout(timeout_secs)?);

    let progress_bar = spinner.clone();
    let progress_callback: CrawlProgressCallback = Arc::new(move |progress: CrawlProgress| {
        progress_bar.set_message(format!(
            "Batch {}: {} pages, {} links, {} queued, {} failed",
            progress.batch, progress.nodes, progress.edges, progress.frontier, progress.failed
        ));
    });
    let fetch_bar = spinner.clone();
    let fetch_callback: ProgressCallback = Arc::new(move |worker_id: usize, url: String| {
        fetch_bar.set_message(format!("Worker {}: {}", worker_id, extract_url_path(&url)));
    });

    let outcome = execute_crawl(
        settings.options.clone(),
        fetcher,
        Some(progress_callback),
        Some(fetch_callback),
    )
    .await
    .context("Crawl failed")?;

    spinner.set_message("Ranking pages...");
    let ranks = engine.compute(&outcome.graph.snapshot());
    let snapshot = RankedSnapshot::from_crawl(&outcome, &ranks);

    snapshot
        .write_json(&settings.output)
        .with_context(|| format!("Failed to save graph to {}", settings.output.display()))?;

    Ok(snapshot)
}

pub async fn handle_crawl(sub_matches: &ArgMatches, quiet: bool) -> Result<()> {
    let settings = crawl_settings_from_matches(sub_matches)?;
    let options = &settings.options;

    if !quiet {
        println!("Crawling {}", options.start_url.bright_white());
        println!("Duration: {:?}", options.max_duration);
        println!("Workers: {}", options.concurrency);
        println!("Fetch timeout: {:?}", options.fetch_timeout);
        let scope = match options.scope {
            CrawlScope::AnyHost => "any host",
            CrawlScope::SameHost => "same host only",
        };
        println!("Scope: {}\n", scope);
    }

    let spinner = crawl_spinner(quiet)?;
    let result = run_crawl(&settings, &spinner).await;
    spinner.finish_and_clear();
    let snapshot = result?;

    if !quiet {
        println!(
            "{} Crawl complete! Saved {} pages to {}\n",
            "✓".green().bold(),
            snapshot.nodes.len(),
            settings.output.display()
        );
    }

    print!("{}", snapshot.render(settings.format, settings.top)?);
    Ok(())
}

