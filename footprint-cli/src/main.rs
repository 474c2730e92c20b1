//! Footprint CLI
//!
//! Discover the public profiles linked from one or more seed URLs and print
//! the aggregated identity as JSON.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{warn, Level};
use tracing_subscriber::FmtSubscriber;

use footprint_adapters::Registry;
use footprint_core::normalize_url;
use footprint_net::{DomainRateLimiter, Fetcher, HttpConfig, NoCache, ResponseCache, SharedCache};
use footprint_runtime::{CrawlConfig, CrawlEngine};

#[derive(Parser)]
#[command(name = "footprint")]
#[command(author, version, about = "Footprint: cross-platform public profile discovery", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level (0-3)
    #[arg(short, long, default_value = "1")]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl outward from seed profile URLs
    Discover(DiscoverArgs),

    /// List supported platforms in resolution order
    Platforms,

    /// Show which platform a URL routes to and its dedup key
    Match {
        /// URL to classify
        url: String,
    },
}

#[derive(clap::Args)]
struct DiscoverArgs {
    /// Seed profile URLs
    #[arg(required = true)]
    urls: Vec<String>,

    /// TOML config file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Maximum link depth from the seeds
    #[arg(long)]
    max_depth: Option<usize>,

    /// Maximum fetches per crawl
    #[arg(long)]
    max_visited: Option<usize>,

    /// Concurrent fetches
    #[arg(long)]
    workers: Option<usize>,

    /// Per-request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Minimum delay between requests to one host, in milliseconds
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Response cache lifetime in seconds
    #[arg(long)]
    cache_ttl: Option<u64>,

    /// Stop the whole crawl after this many seconds
    #[arg(long)]
    crawl_timeout: Option<u64>,

    /// Try the seed usernames on other platforms
    #[arg(long)]
    guess: bool,

    /// Persist the response cache here (or set FOOTPRINT_CACHE_DIR)
    #[arg(long, env = "FOOTPRINT_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Disable response caching
    #[arg(long, conflicts_with = "cache_dir")]
    no_cache: bool,

    /// Proxy URL (http://, socks5h://)
    #[arg(long)]
    proxy: Option<String>,

    /// Write JSON here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl DiscoverArgs {
    /// File config (or defaults) with command-line overrides applied
    fn crawl_config(&self) -> Result<CrawlConfig> {
        let mut config = match &self.config {
            Some(path) => CrawlConfig::load(path)?,
            None => CrawlConfig::default(),
        };

        if let Some(depth) = self.max_depth {
            config.max_depth = depth;
        }
        if let Some(visited) = self.max_visited {
            config.max_visited = visited;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(secs) = self.timeout {
            config.request_timeout_secs = secs;
        }
        if let Some(ms) = self.delay_ms {
            config.min_host_delay_ms = ms;
        }
        if let Some(secs) = self.cache_ttl {
            config.cache_ttl_secs = secs;
        }
        if self.crawl_timeout.is_some() {
            config.crawl_timeout_secs = self.crawl_timeout;
        }
        if self.guess {
            config.guess = true;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging; stdout is reserved for JSON
    let log_level = match cli.verbose {
        0 => Level::ERROR,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    match cli.command {
        Commands::Discover(args) => run_discover(args).await?,
        Commands::Platforms => {
            for (i, platform) in offline_registry()?.platforms().iter().enumerate() {
                println!("{:>2}. {}", i + 1, platform);
            }
        }
        Commands::Match { url } => {
            let registry = offline_registry()?;
            let adapter = registry.resolve(&url);
            println!("platform: {}", adapter.platform());
            match normalize_url(&url, adapter.keeps_query()) {
                Ok(key) => println!("key:      {}", key),
                Err(e) => println!("key:      (unusable: {})", e),
            }
            if adapter.requires_auth() {
                println!("note:     requires credentials");
            }
        }
    }

    Ok(())
}

/// Registry for commands that only classify URLs
fn offline_registry() -> Result<Registry> {
    let fetcher = Fetcher::new(
        &HttpConfig::default(),
        Arc::new(NoCache),
        Arc::new(DomainRateLimiter::new(std::time::Duration::ZERO)),
    )?;
    Ok(Registry::standard(fetcher))
}

async fn run_discover(args: DiscoverArgs) -> Result<()> {
    let config = args.crawl_config()?;

    // Keep the concrete cache around so pending disk writes can be flushed
    let disk_cache = match (&args.cache_dir, args.no_cache) {
        (Some(dir), false) => Some(Arc::new(
            ResponseCache::with_dir(dir, config.cache_ttl())
                .with_context(|| format!("cannot use cache dir {}", dir.display()))?,
        )),
        _ => None,
    };
    let cache: SharedCache = match (&disk_cache, args.no_cache) {
        (Some(cache), _) => cache.clone(),
        (None, true) => Arc::new(NoCache),
        (None, false) => Arc::new(ResponseCache::in_memory(config.cache_ttl())),
    };

    let limiter = Arc::new(DomainRateLimiter::new(config.min_host_delay()));
    let http = HttpConfig {
        request_timeout: config.request_timeout(),
        proxy: args.proxy.clone(),
        ..HttpConfig::default()
    };
    let fetcher = Fetcher::new(&http, cache, limiter.clone())?;
    let engine = CrawlEngine::new(Arc::new(Registry::standard(fetcher))).with_limiter(limiter);

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing with partial results");
            interrupt.cancel();
        }
    });

    let outcome = engine.discover(&args.urls, &config, cancel).await?;

    if let Some(cache) = &disk_cache {
        cache.flush().await;
    }

    let json = serde_json::to_string_pretty(&outcome)?;
    match &args.output {
        Some(path) => {
            fs::write(path, &json)
                .with_context(|| format!("cannot write {}", path.display()))?;
            eprintln!("📄 Results saved to: {}", path.display());
        }
        None => println!("{}", json),
    }

    let diagnostics = &outcome.diagnostics;
    eprintln!(
        "✅ {} profile(s) from {} fetch(es), {} failed",
        outcome.identity.len(),
        diagnostics.visited,
        diagnostics.failures.len()
    );
    if let Some(truncation) = diagnostics.truncation {
        eprintln!("⚠️  Crawl truncated: {:?}", truncation);
    }

    Ok(())
}
