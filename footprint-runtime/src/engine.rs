//! Crawl engine
//!
//! Drives one discovery crawl:
//! - Seeds enter the frontier at depth 0 as authoritative entries
//! - A bounded set of fetch tasks drains the frontier one depth level at a
//!   time; the rate limiter inside the fetch path paces same-host requests,
//!   not the engine
//! - Each resolved profile is offered to the identity aggregate and its links
//!   are filtered (same platform, duplicate, depth) before enqueue
//! - Retryable failures get one more attempt after a backoff
//! - Cancellation and the optional crawl deadline stop dispatch, cancel
//!   in-flight fetches and return whatever was gathered. Dropping the
//!   `discover` future cancels in-flight fetches too.

use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use footprint_adapters::{AdapterHandle, Registry};
use footprint_core::{
    ensure_scheme, normalize_url, FetchError, Identity, IdentityBuilder, Profile, Provenance,
    RecordOutcome,
};
use footprint_net::DomainRateLimiter;

use crate::{
    Admission, CrawlConfig, Diagnostics, EntryState, Frontier, FrontierEntry, SkipReason,
    Truncation, VisitRecord,
};

/// One retry for retryable failures
const MAX_ATTEMPTS: u32 = 2;

/// Hosts idle this long lose their rate-limit state when a crawl ends
const LIMITER_IDLE: Duration = Duration::from_secs(300);

/// Fatal errors at crawl entry. Per-link failures never surface here.
#[derive(Debug, Error)]
pub enum DiscoverError {
    #[error("No seed URLs given")]
    NoSeeds,

    #[error("Invalid seed {0}: {1}")]
    InvalidSeed(String, String),

    #[error("Visit budget must be at least 1")]
    ZeroBudget,

    #[error("Invalid crawl config: {0}")]
    InvalidConfig(String),
}

/// Result of a crawl: the identity plus what happened along the way
#[derive(Debug, Clone, Serialize)]
pub struct CrawlOutcome {
    pub identity: Identity,
    pub diagnostics: Diagnostics,
}

/// Outcome of one fetch task
enum Attempt {
    Fetched(Profile),
    Failed(FetchError),
    Cancelled,
}

/// Discovery crawler over a platform registry
pub struct CrawlEngine {
    registry: Arc<Registry>,
    limiter: Option<Arc<DomainRateLimiter>>,
}

impl CrawlEngine {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            limiter: None,
        }
    }

    /// Reap idle hosts from this limiter after each crawl
    pub fn with_limiter(mut self, limiter: Arc<DomainRateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Crawl outward from `seeds` and aggregate every profile found.
    ///
    /// Only configuration problems are errors. Failed links, cancellation
    /// and timeouts still return an outcome, possibly with an empty identity.
    pub async fn discover(
        &self,
        seeds: &[String],
        config: &CrawlConfig,
        cancel: CancellationToken,
    ) -> Result<CrawlOutcome, DiscoverError> {
        if seeds.is_empty() {
            return Err(DiscoverError::NoSeeds);
        }
        if config.max_visited == 0 {
            return Err(DiscoverError::ZeroBudget);
        }
        config
            .validate()
            .map_err(|e| DiscoverError::InvalidConfig(e.to_string()))?;

        let mut crawl = Crawl::new(&self.registry, config);
        crawl.seed(seeds)?;

        info!(
            "Crawl {} started: {} seed(s), depth {}, budget {}",
            crawl.diagnostics.crawl_id,
            seeds.len(),
            config.max_depth,
            config.max_visited
        );

        let token = cancel.child_token();
        // Spawned fetches outlive this future unless told to stop
        let _cancel_on_drop = token.clone().drop_guard();
        let crawl_timeout = config.crawl_timeout();
        let deadline = async move {
            match crawl_timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        let mut in_flight = FuturesUnordered::new();
        let mut stop: Option<Truncation> = None;
        let mut level = 0;

        loop {
            if stop.is_none() && token.is_cancelled() {
                stop = Some(Truncation::Cancelled);
            }

            if stop.is_none() {
                while in_flight.len() < config.workers {
                    let Some(entry) = crawl.frontier.next(level) else {
                        break;
                    };
                    crawl.diagnostics.record_visit(VisitRecord {
                        url: entry.url.clone(),
                        platform: entry.platform.to_string(),
                        depth: entry.depth,
                        discovered_from: entry.discovered_from.clone(),
                    });
                    debug!("Dispatching {} (depth {})", entry.url, entry.depth);

                    let adapter = self.registry.resolve(&entry.url).clone();
                    let url = entry.url.clone();
                    let backoff = config.retry_backoff();
                    let task = tokio::spawn(fetch_with_retry(adapter, url, backoff, token.clone()));
                    in_flight.push(async move { (entry, task.await) });
                }
            }

            if in_flight.is_empty() {
                // Level fully settled; every key of the next one is known
                match crawl.frontier.next_level() {
                    Some(next) if stop.is_none() && next > level => {
                        debug!("Crawl {} advancing to depth {}", crawl.diagnostics.crawl_id, next);
                        level = next;
                        continue;
                    }
                    _ => break,
                }
            }

            tokio::select! {
                Some((entry, joined)) = in_flight.next() => crawl.settle(entry, joined),
                _ = token.cancelled(), if stop.is_none() => {
                    info!("Crawl {} cancelled", crawl.diagnostics.crawl_id);
                    stop = Some(Truncation::Cancelled);
                }
                _ = &mut deadline, if stop.is_none() => {
                    info!("Crawl {} hit its deadline", crawl.diagnostics.crawl_id);
                    stop = Some(Truncation::Timeout);
                    token.cancel();
                }
            }
        }

        let outcome = crawl.finish(stop);

        if let Some(limiter) = &self.limiter {
            let reaped = limiter.reap_idle(LIMITER_IDLE);
            if reaped > 0 {
                debug!("Reaped {} idle host(s) from the rate limiter", reaped);
            }
        }

        Ok(outcome)
    }
}

/// Fetch with one retry for retryable errors. Cancellation wins over any
/// pending fetch or backoff.
async fn fetch_with_retry(
    adapter: AdapterHandle,
    url: String,
    backoff: Duration,
    cancel: CancellationToken,
) -> (Attempt, u32) {
    let mut attempts = 0;
    loop {
        attempts += 1;
        let result = tokio::select! {
            _ = cancel.cancelled() => return (Attempt::Cancelled, attempts),
            result = adapter.fetch(&url) => result,
        };

        match result {
            Ok(profile) => return (Attempt::Fetched(profile), attempts),
            Err(e) if e.is_retryable() && attempts < MAX_ATTEMPTS => {
                debug!("Retrying {} after {:?}: {}", url, backoff, e);
                tokio::select! {
                    _ = cancel.cancelled() => return (Attempt::Cancelled, attempts),
                    _ = tokio::time::sleep(backoff) => {}
                }
            }
            Err(e) => return (Attempt::Failed(e), attempts),
        }
    }
}

/// Mutable state of one crawl, touched only by the dispatch loop
struct Crawl<'a> {
    registry: &'a Registry,
    config: &'a CrawlConfig,
    frontier: Frontier,
    builder: IdentityBuilder,
    diagnostics: Diagnostics,
}

impl<'a> Crawl<'a> {
    fn new(registry: &'a Registry, config: &'a CrawlConfig) -> Self {
        Self {
            registry,
            config,
            frontier: Frontier::new(config.max_depth, config.max_visited),
            builder: IdentityBuilder::new(),
            diagnostics: Diagnostics::new(),
        }
    }

    fn seed(&mut self, seeds: &[String]) -> Result<(), DiscoverError> {
        for seed in seeds {
            let url = ensure_scheme(seed.trim());
            let adapter = self.registry.resolve(&url);
            let key = normalize_url(&url, adapter.keeps_query())
                .map_err(|e| DiscoverError::InvalidSeed(seed.clone(), e.to_string()))?;

            let entry = FrontierEntry {
                url: url.clone(),
                key,
                platform: adapter.platform(),
                depth: 0,
                discovered_from: None,
                verified: true,
                guess: false,
            };
            if self.frontier.offer(entry) == Admission::Duplicate {
                self.diagnostics.record_skip(&url, SkipReason::Duplicate);
            }
        }
        Ok(())
    }

    fn settle(&mut self, entry: FrontierEntry, joined: Result<(Attempt, u32), JoinError>) {
        match joined {
            Ok((Attempt::Fetched(profile), _)) => {
                self.frontier.complete(&entry.key, EntryState::Resolved);
                self.diagnostics.resolved += 1;
                self.resolve(entry, profile);
            }
            Ok((Attempt::Failed(e), attempts)) => {
                warn!("Fetch failed for {}: {}", entry.url, e);
                self.frontier.complete(&entry.key, EntryState::Failed);
                self.diagnostics.record_failure(&entry.url, &e, attempts);
            }
            Ok((Attempt::Cancelled, _)) => {
                self.frontier.complete(&entry.key, EntryState::Skipped);
                self.diagnostics.record_skip(&entry.url, SkipReason::Cancelled);
            }
            Err(e) => {
                warn!("Fetch task for {} died: {}", entry.url, e);
                self.frontier.complete(&entry.key, EntryState::Failed);
                let error = FetchError::Invalid(format!("fetch task failed: {}", e));
                self.diagnostics.record_failure(&entry.url, &error, 1);
            }
        }
    }

    fn resolve(&mut self, entry: FrontierEntry, profile: Profile) {
        let links = profile.social_links.clone();
        let verified: Vec<bool> = links
            .iter()
            .map(|l| entry.verified && profile.is_verified_link(l))
            .collect();
        let username = profile.username.trim().to_string();

        let provenance = if entry.guess {
            Provenance::Guess
        } else if entry.verified {
            Provenance::Authoritative
        } else {
            Provenance::Linked
        };
        match self.builder.record(profile, provenance) {
            RecordOutcome::Inserted => {
                debug!("Recorded {} profile from {}", entry.platform, entry.url)
            }
            RecordOutcome::Deferred => {
                debug!("Holding {} guess {} for scoring", entry.platform, entry.url)
            }
            RecordOutcome::Discarded => {
                debug!("{} slot already filled, discarding {}", entry.platform, entry.url);
                self.diagnostics.discarded.push(entry.url.clone());
            }
        }

        // Links are followed even from a discarded profile so the set of
        // visited URLs does not depend on which profile won the slot.
        // Whatever a guess links to is a guess as well.
        for (link, verified) in links.iter().zip(verified) {
            self.admit(link, &entry, verified, entry.guess);
        }

        if self.config.guess && provenance == Provenance::Authoritative && !username.is_empty() {
            for candidate in self.registry.candidate_urls(&username, entry.platform) {
                self.admit(&candidate, &entry, false, true);
            }
        }
    }

    fn admit(&mut self, link: &str, parent: &FrontierEntry, verified: bool, guess: bool) {
        let url = ensure_scheme(link);
        let link = url.as_str();
        let adapter = self.registry.resolve(link);
        let platform = adapter.platform();
        if platform == parent.platform {
            self.diagnostics.record_skip(link, SkipReason::SamePlatform);
            return;
        }

        let key = match normalize_url(link, adapter.keeps_query()) {
            Ok(key) => key,
            Err(e) => {
                debug!("Ignoring link {} from {}: {}", link, parent.url, e);
                return;
            }
        };

        let entry = FrontierEntry {
            url: link.to_string(),
            key,
            platform,
            depth: parent.depth + 1,
            discovered_from: Some(parent.url.clone()),
            verified,
            guess,
        };
        match self.frontier.offer(entry) {
            Admission::Enqueued => debug!("Enqueued {} ({}) from {}", link, platform, parent.url),
            Admission::Duplicate => self.diagnostics.record_skip(link, SkipReason::Duplicate),
            Admission::TooDeep => {
                self.diagnostics.record_skip(link, SkipReason::Depth);
                self.diagnostics.truncate(Truncation::Depth);
            }
        }
    }

    fn finish(mut self, stop: Option<Truncation>) -> CrawlOutcome {
        let leftovers = self.frontier.drain();
        let reason = match stop {
            Some(cause) => {
                self.diagnostics.truncate(cause);
                SkipReason::Cancelled
            }
            None => {
                if !leftovers.is_empty() {
                    self.diagnostics.truncate(Truncation::Budget);
                }
                SkipReason::Budget
            }
        };
        for entry in &leftovers {
            self.diagnostics.record_skip(&entry.url, reason);
        }

        let (identity, rejected) = self.builder.finalize(&self.config.weights);
        self.diagnostics.rejected_guesses = rejected;
        self.diagnostics.finish();

        info!(
            "Crawl {} finished: {} visited, {} resolved, {} failed, {} platform(s){}",
            self.diagnostics.crawl_id,
            self.diagnostics.visited,
            self.diagnostics.resolved,
            self.diagnostics.failures.len(),
            identity.len(),
            self.diagnostics
                .truncation
                .map(|t| format!(", truncated ({:?})", t))
                .unwrap_or_default()
        );

        CrawlOutcome {
            identity,
            diagnostics: self.diagnostics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use footprint_adapters::Adapter;
    use footprint_core::{host_key, ErrorKind};
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-process adapter serving scripted responses for one host
    struct FakeAdapter {
        platform: &'static str,
        host: Option<&'static str>,
        guessable: bool,
        delay: Duration,
        scripts: HashMap<String, Vec<Result<Profile, FetchError>>>,
        calls: Mutex<HashMap<String, usize>>,
        completed: AtomicUsize,
    }

    impl FakeAdapter {
        fn new(platform: &'static str, host: &'static str) -> Self {
            Self {
                platform,
                host: Some(host),
                guessable: false,
                delay: Duration::ZERO,
                scripts: HashMap::new(),
                calls: Mutex::new(HashMap::new()),
                completed: AtomicUsize::new(0),
            }
        }

        fn fallback() -> Self {
            Self {
                host: None,
                ..Self::new("generic", "")
            }
        }

        fn serve(mut self, url: &str, result: Result<Profile, FetchError>) -> Self {
            self.scripts.entry(url.to_string()).or_default().push(result);
            self
        }

        fn guessable(mut self) -> Self {
            self.guessable = true;
            self
        }

        fn slow(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn calls(&self, url: &str) -> usize {
            self.calls.lock().get(url).copied().unwrap_or(0)
        }

        fn total_calls(&self) -> usize {
            self.calls.lock().values().sum()
        }

        /// Fetches that ran to the end instead of being dropped
        fn completed(&self) -> usize {
            self.completed.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Adapter for FakeAdapter {
        fn platform(&self) -> &'static str {
            self.platform
        }

        fn matches(&self, url: &str) -> bool {
            match self.host {
                Some(host) => host_key(url).as_deref() == Some(host),
                None => true,
            }
        }

        fn profile_url(&self, username: &str) -> Option<String> {
            match self.host {
                Some(host) if self.guessable => Some(format!("https://{}/{}", host, username)),
                _ => None,
            }
        }

        async fn fetch(&self, url: &str) -> Result<Profile, FetchError> {
            let call = {
                let mut calls = self.calls.lock();
                let count = calls.entry(url.to_string()).or_insert(0);
                *count += 1;
                *count
            };
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.completed.fetch_add(1, Ordering::SeqCst);
            match self.scripts.get(url) {
                Some(script) => script[(call - 1).min(script.len() - 1)].clone(),
                None => Err(FetchError::NotFound(url.to_string())),
            }
        }
    }

    fn profile(platform: &str, url: &str, username: &str, links: &[&str], verified: &[&str]) -> Profile {
        let mut profile = Profile::new(platform, url).with_username(username);
        for link in links {
            profile.add_link(link);
        }
        for link in verified {
            profile.add_verified_link(link);
        }
        profile
    }

    fn registry(x: &Arc<FakeAdapter>, y: &Arc<FakeAdapter>, generic: &Arc<FakeAdapter>) -> Arc<Registry> {
        Arc::new(
            Registry::new(generic.clone())
                .with(x.clone())
                .with(y.clone()),
        )
    }

    fn config() -> CrawlConfig {
        CrawlConfig::default().with_retry_backoff_ms(10)
    }

    async fn run(registry: Arc<Registry>, seed: &str, config: &CrawlConfig) -> CrawlOutcome {
        CrawlEngine::new(registry)
            .discover(&[seed.to_string()], config, CancellationToken::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_same_platform_links_filtered() {
        let x = Arc::new(FakeAdapter::new("x", "x.test").serve(
            "https://x.test/alice",
            Ok(profile(
                "x",
                "https://x.test/alice",
                "alice",
                &["https://x.test/alice2"],
                &["https://y.test/alice"],
            )),
        ));
        let y = Arc::new(FakeAdapter::new("y", "y.test").serve(
            "https://y.test/alice",
            Ok(profile("y", "https://y.test/alice", "alice", &[], &[])),
        ));
        let generic = Arc::new(FakeAdapter::fallback());

        let outcome = run(registry(&x, &y, &generic), "https://x.test/alice", &config()).await;

        assert_eq!(x.calls("https://x.test/alice2"), 0);
        assert_eq!(y.calls("https://y.test/alice"), 1);
        assert_eq!(outcome.identity.platforms().collect::<Vec<_>>(), vec!["x", "y"]);
        assert!(!outcome.identity.get("y").unwrap().is_guess);

        let same: Vec<_> = outcome
            .diagnostics
            .skipped_for(SkipReason::SamePlatform)
            .map(|s| s.url.as_str())
            .collect();
        assert_eq!(same, vec!["https://x.test/alice2"]);
        let visited: Vec<_> = outcome.diagnostics.visits.iter().map(|v| v.url.as_str()).collect();
        assert_eq!(visited, vec!["https://x.test/alice", "https://y.test/alice"]);
    }

    #[tokio::test]
    async fn test_not_found_seed() {
        let x = Arc::new(FakeAdapter::new("x", "x.test"));
        let y = Arc::new(FakeAdapter::new("y", "y.test"));
        let generic = Arc::new(FakeAdapter::fallback());

        let outcome = run(registry(&x, &y, &generic), "https://x.test/ghost", &config()).await;

        assert!(outcome.identity.is_empty());
        assert_eq!(outcome.diagnostics.failures.len(), 1);
        let failure = &outcome.diagnostics.failures[0];
        assert_eq!(failure.kind, ErrorKind::NotFound);
        assert_eq!(failure.attempts, 1);
        assert_eq!(x.calls("https://x.test/ghost"), 1);
        assert!(outcome.diagnostics.truncation.is_none());
    }

    #[tokio::test]
    async fn test_max_depth_zero() {
        let x = Arc::new(FakeAdapter::new("x", "x.test").serve(
            "https://x.test/alice",
            Ok(profile("x", "https://x.test/alice", "alice", &[], &["https://y.test/alice"])),
        ));
        let y = Arc::new(FakeAdapter::new("y", "y.test"));
        let generic = Arc::new(FakeAdapter::fallback());

        let outcome = run(
            registry(&x, &y, &generic),
            "https://x.test/alice",
            &config().with_max_depth(0),
        )
        .await;

        assert_eq!(outcome.identity.platforms().collect::<Vec<_>>(), vec!["x"]);
        assert_eq!(y.total_calls(), 0);
        assert_eq!(outcome.diagnostics.skipped_for(SkipReason::Depth).count(), 1);
        assert_eq!(outcome.diagnostics.truncation, Some(Truncation::Depth));
    }

    #[tokio::test]
    async fn test_budget_bound() {
        let links = ["https://y.test/1", "https://y.test/2", "https://y.test/3"];
        let x = Arc::new(FakeAdapter::new("x", "x.test").serve(
            "https://x.test/alice",
            Ok(profile("x", "https://x.test/alice", "alice", &links, &[])),
        ));
        let y = Arc::new(FakeAdapter::new("y", "y.test"));
        let generic = Arc::new(FakeAdapter::fallback());

        let outcome = run(
            registry(&x, &y, &generic),
            "https://x.test/alice",
            &config().with_max_visited(2),
        )
        .await;

        assert_eq!(outcome.diagnostics.visited, 2);
        assert_eq!(x.total_calls() + y.total_calls(), 2);
        assert_eq!(outcome.diagnostics.skipped_for(SkipReason::Budget).count(), 2);
        assert_eq!(outcome.diagnostics.truncation, Some(Truncation::Budget));
    }

    #[tokio::test]
    async fn test_no_duplicate_fetches() {
        let x = Arc::new(FakeAdapter::new("x", "x.test").serve(
            "https://x.test/alice",
            Ok(profile(
                "x",
                "https://x.test/alice",
                "alice",
                &["https://y.test/bob", "https://Y.TEST/bob/#top", "https://z.test/"],
                &[],
            )),
        ));
        let y = Arc::new(FakeAdapter::new("y", "y.test").serve(
            "https://y.test/bob",
            Ok(profile("y", "https://y.test/bob", "bob", &["https://x.test/alice", "https://z.test"], &[])),
        ));
        let generic = Arc::new(FakeAdapter::fallback());

        let outcome = run(registry(&x, &y, &generic), "https://x.test/alice", &config()).await;

        assert_eq!(x.total_calls(), 1);
        assert_eq!(y.total_calls(), 1);
        assert_eq!(generic.total_calls(), 1);

        let mut keys: Vec<String> = outcome
            .diagnostics
            .visits
            .iter()
            .map(|v| normalize_url(&v.url, false).unwrap())
            .collect();
        let total = keys.len();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), total);
        assert_eq!(outcome.diagnostics.skipped_for(SkipReason::Duplicate).count(), 3);
    }

    #[tokio::test]
    async fn test_depth_monotonic() {
        let x = Arc::new(
            FakeAdapter::new("x", "x.test")
                .serve(
                    "https://x.test/a",
                    Ok(profile("x", "https://x.test/a", "a", &[], &["https://y.test/b"])),
                )
                .serve("https://x.test/d", Ok(profile("x", "https://x.test/d", "d", &[], &[]))),
        );
        let y = Arc::new(FakeAdapter::new("y", "y.test").serve(
            "https://y.test/b",
            Ok(profile("y", "https://y.test/b", "b", &["https://z.test/c"], &[])),
        ));
        let generic = Arc::new(FakeAdapter::fallback().serve(
            "https://z.test/c",
            Ok(profile("generic", "https://z.test/c", "", &["https://x.test/d"], &[])),
        ));

        let outcome = run(registry(&x, &y, &generic), "https://x.test/a", &config()).await;

        let depths: HashMap<&str, usize> = outcome
            .diagnostics
            .visits
            .iter()
            .map(|v| (v.url.as_str(), v.depth))
            .collect();
        for visit in &outcome.diagnostics.visits {
            assert!(visit.depth <= 2);
            if let Some(parent) = &visit.discovered_from {
                assert_eq!(visit.depth, depths[parent.as_str()] + 1);
            }
        }
        assert_eq!(depths.len(), 3);
        assert_eq!(x.calls("https://x.test/d"), 0);
        assert_eq!(outcome.diagnostics.truncation, Some(Truncation::Depth));
    }

    #[tokio::test]
    async fn test_retry_once() {
        let flaky = profile("x", "https://x.test/flaky", "flaky", &[], &[]);
        let x = Arc::new(
            FakeAdapter::new("x", "x.test")
                .serve("https://x.test/flaky", Err(FetchError::TransientNetwork("reset".into())))
                .serve("https://x.test/flaky", Ok(flaky)),
        );
        let y = Arc::new(
            FakeAdapter::new("y", "y.test")
                .serve("https://y.test/busy", Err(FetchError::RateLimited("429".into()))),
        );
        let generic = Arc::new(FakeAdapter::fallback());
        let registry = registry(&x, &y, &generic);

        let outcome = run(registry.clone(), "https://x.test/flaky", &config()).await;
        assert_eq!(x.calls("https://x.test/flaky"), 2);
        assert!(outcome.identity.get("x").is_some());
        assert!(outcome.diagnostics.failures.is_empty());

        let outcome = run(registry, "https://y.test/busy", &config()).await;
        assert_eq!(y.calls("https://y.test/busy"), 2);
        assert_eq!(outcome.diagnostics.failures[0].kind, ErrorKind::RateLimited);
        assert_eq!(outcome.diagnostics.failures[0].attempts, 2);
    }

    #[tokio::test]
    async fn test_terminal_errors_not_retried() {
        let x = Arc::new(
            FakeAdapter::new("x", "x.test")
                .serve("https://x.test/private", Err(FetchError::AuthRequired("login".into()))),
        );
        let y = Arc::new(FakeAdapter::new("y", "y.test"));
        let generic = Arc::new(FakeAdapter::fallback());

        let outcome = run(registry(&x, &y, &generic), "https://x.test/private", &config()).await;
        assert_eq!(x.calls("https://x.test/private"), 1);
        assert_eq!(outcome.diagnostics.failures[0].kind, ErrorKind::AuthRequired);
    }

    #[tokio::test]
    async fn test_cancellation_returns_partial() {
        let x = Arc::new(
            FakeAdapter::new("x", "x.test")
                .serve("https://x.test/slow", Ok(profile("x", "https://x.test/slow", "s", &[], &[])))
                .slow(Duration::from_secs(30)),
        );
        let y = Arc::new(FakeAdapter::new("y", "y.test"));
        let generic = Arc::new(FakeAdapter::fallback());
        let engine = CrawlEngine::new(registry(&x, &y, &generic));

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            engine.discover(&["https://x.test/slow".to_string()], &config(), cancel),
        )
        .await
        .unwrap()
        .unwrap();

        assert!(outcome.identity.is_empty());
        assert_eq!(outcome.diagnostics.truncation, Some(Truncation::Cancelled));
        assert_eq!(outcome.diagnostics.skipped_for(SkipReason::Cancelled).count(), 1);
        assert!(outcome.diagnostics.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let x = Arc::new(FakeAdapter::new("x", "x.test"));
        let y = Arc::new(FakeAdapter::new("y", "y.test"));
        let generic = Arc::new(FakeAdapter::fallback());

        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = CrawlEngine::new(registry(&x, &y, &generic))
            .discover(&["https://x.test/a".to_string()], &config(), cancel)
            .await
            .unwrap();

        assert_eq!(x.total_calls(), 0);
        assert_eq!(outcome.diagnostics.visited, 0);
        assert_eq!(outcome.diagnostics.truncation, Some(Truncation::Cancelled));
    }

    #[tokio::test]
    async fn test_crawl_timeout() {
        let x = Arc::new(FakeAdapter::new("x", "x.test").slow(Duration::from_secs(30)));
        let y = Arc::new(FakeAdapter::new("y", "y.test"));
        let generic = Arc::new(FakeAdapter::fallback());

        let outcome = tokio::time::timeout(
            Duration::from_secs(10),
            run(
                registry(&x, &y, &generic),
                "https://x.test/a",
                &config().with_crawl_timeout_secs(Some(1)),
            ),
        )
        .await
        .unwrap();

        assert_eq!(outcome.diagnostics.truncation, Some(Truncation::Timeout));
        assert!(outcome.diagnostics.failures.is_empty());
    }

    #[tokio::test]
    async fn test_aggregate_deterministic() {
        let x = Arc::new(FakeAdapter::new("x", "x.test").serve(
            "https://x.test/alice",
            Ok(profile(
                "x",
                "https://x.test/alice",
                "alice",
                &[],
                &["https://y.test/alice", "https://one.test", "https://two.test"],
            )),
        ));
        let y = Arc::new(
            FakeAdapter::new("y", "y.test")
                .serve("https://y.test/alice", Ok(profile("y", "https://y.test/alice", "alice", &[], &[])))
                .slow(Duration::from_millis(20)),
        );
        let generic = Arc::new(
            FakeAdapter::fallback()
                .serve("https://one.test", Ok(profile("generic", "https://one.test", "", &[], &[])))
                .serve("https://two.test", Ok(profile("generic", "https://two.test", "", &[], &[]))),
        );
        let registry = registry(&x, &y, &generic);
        let config = config().with_workers(4);

        let first = run(registry.clone(), "https://x.test/alice", &config).await;
        let second = run(registry, "https://x.test/alice", &config).await;

        assert_eq!(
            first.identity.platforms().collect::<Vec<_>>(),
            second.identity.platforms().collect::<Vec<_>>()
        );
        assert_eq!(first.identity.get("y"), second.identity.get("y"));
        assert_eq!(first.diagnostics.discarded.len(), 1);
        assert_eq!(second.diagnostics.visited, 4);
    }

    #[tokio::test]
    async fn test_guess_mode() {
        let x = Arc::new(
            FakeAdapter::new("x", "x.test")
                .serve("https://x.test/alice", Ok(profile("x", "https://x.test/alice", "alice", &[], &[])))
                .serve(
                    "https://x.test/bob",
                    Ok(profile("x", "https://x.test/bob", "bob", &["https://y.test/zed"], &[])),
                ),
        );
        let y = Arc::new(
            FakeAdapter::new("y", "y.test")
                .guessable()
                .serve("https://y.test/alice", Ok(profile("y", "https://y.test/alice", "alice", &[], &[])))
                .serve("https://y.test/zed", Ok(profile("y", "https://y.test/zed", "zed", &[], &[]))),
        );
        let generic = Arc::new(FakeAdapter::fallback());
        let registry = registry(&x, &y, &generic);

        let plain = run(registry.clone(), "https://x.test/alice", &config()).await;
        assert_eq!(y.calls("https://y.test/alice"), 0);
        assert!(plain.identity.get("y").is_none());

        // A plain link is kept without scoring, guess mode or not
        let linked = run(registry.clone(), "https://x.test/bob", &config().with_guess(true)).await;
        let zed = linked.identity.get("y").unwrap();
        assert_eq!(zed.url, "https://y.test/zed");
        assert!(!zed.is_guess);
        assert!(linked.diagnostics.rejected_guesses.is_empty());

        let guessed = run(registry, "https://x.test/alice", &config().with_guess(true)).await;
        assert_eq!(y.calls("https://y.test/alice"), 1);
        let y_profile = guessed.identity.get("y").unwrap();
        assert!(y_profile.is_guess);
        assert_eq!(y_profile.guess_match, vec!["username"]);
        assert!((y_profile.confidence - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_entry_errors() {
        let x = Arc::new(FakeAdapter::new("x", "x.test"));
        let y = Arc::new(FakeAdapter::new("y", "y.test"));
        let generic = Arc::new(FakeAdapter::fallback());
        let engine = CrawlEngine::new(registry(&x, &y, &generic));
        let seeds = vec!["https://x.test/a".to_string()];

        let err = engine.discover(&[], &config(), CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, DiscoverError::NoSeeds));

        let err = engine
            .discover(&seeds, &config().with_max_visited(0), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoverError::ZeroBudget));

        let err = engine
            .discover(&seeds, &config().with_workers(0), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoverError::InvalidConfig(_)));

        let err = engine
            .discover(&["ftp://x.test/a".to_string()], &config(), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoverError::InvalidSeed(..)));
        assert_eq!(x.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_reaps_limiter() {
        let limiter = Arc::new(DomainRateLimiter::new(Duration::ZERO));
        limiter.wait("https://x.test/a").await;
        assert_eq!(limiter.tracked_hosts(), 1);

        let x = Arc::new(FakeAdapter::new("x", "x.test"));
        let y = Arc::new(FakeAdapter::new("y", "y.test"));
        let generic = Arc::new(FakeAdapter::fallback());
        let engine = CrawlEngine::new(registry(&x, &y, &generic)).with_limiter(limiter.clone());
        engine
            .discover(&["https://x.test/a".to_string()], &config(), CancellationToken::new())
            .await
            .unwrap();

        // Recently used hosts survive the reap
        assert_eq!(limiter.tracked_hosts(), 1);
    }

    #[tokio::test]
    async fn test_plain_links_kept() {
        let x = Arc::new(FakeAdapter::new("x", "x.test").serve(
            "https://x.test/alice",
            Ok(profile("x", "https://x.test/alice", "alice", &["https://y.test/alice_dev"], &[])),
        ));
        let y = Arc::new(FakeAdapter::new("y", "y.test").serve(
            "https://y.test/alice_dev",
            Ok(profile("y", "https://y.test/alice_dev", "alice_dev", &[], &[])),
        ));
        let generic = Arc::new(FakeAdapter::fallback());

        let outcome = run(registry(&x, &y, &generic), "https://x.test/alice", &config()).await;

        let linked = outcome.identity.get("y").unwrap();
        assert!(!linked.is_guess);
        assert_eq!(linked.confidence, 1.0);
        assert!(outcome.diagnostics.rejected_guesses.is_empty());
    }

    #[tokio::test]
    async fn test_followed_link_beats_guess_for_slot() {
        let x = Arc::new(FakeAdapter::new("x", "x.test").serve(
            "https://x.test/alice",
            Ok(profile("x", "https://x.test/alice", "alice", &["https://y.test/zed"], &[])),
        ));
        let y = Arc::new(
            FakeAdapter::new("y", "y.test")
                .guessable()
                .serve("https://y.test/alice", Ok(profile("y", "https://y.test/alice", "alice", &[], &[])))
                .serve("https://y.test/zed", Ok(profile("y", "https://y.test/zed", "zed", &[], &[]))),
        );
        let generic = Arc::new(FakeAdapter::fallback());

        let outcome = run(
            registry(&x, &y, &generic),
            "https://x.test/alice",
            &config().with_guess(true),
        )
        .await;

        assert_eq!(y.calls("https://y.test/alice"), 1);
        assert_eq!(outcome.identity.get("y").unwrap().url, "https://y.test/zed");
        assert_eq!(outcome.diagnostics.rejected_guesses, vec!["https://y.test/alice"]);
    }

    #[tokio::test]
    async fn test_schemeless_urls_fetched_as_https() {
        let x = Arc::new(FakeAdapter::new("x", "x.test").serve(
            "https://x.test/alice",
            Ok(profile("x", "https://x.test/alice", "alice", &["y.test/alice"], &[])),
        ));
        let y = Arc::new(FakeAdapter::new("y", "y.test").serve(
            "https://y.test/alice",
            Ok(profile("y", "https://y.test/alice", "alice", &[], &[])),
        ));
        let generic = Arc::new(FakeAdapter::fallback());

        let outcome = run(registry(&x, &y, &generic), "x.test/alice", &config()).await;

        assert_eq!(x.calls("https://x.test/alice"), 1);
        assert_eq!(y.calls("https://y.test/alice"), 1);
        assert_eq!(generic.total_calls(), 0);
        assert_eq!(outcome.identity.platforms().collect::<Vec<_>>(), vec!["x", "y"]);
        assert_eq!(outcome.diagnostics.visits[0].url, "https://x.test/alice");
    }

    /// Seed links A (slow) and B; B reaches C at depth 2, whose link to D
    /// is too deep, while A links D at depth 2
    fn sibling_graph(a_delay: Duration) -> (Arc<Registry>, Arc<FakeAdapter>) {
        let x = Arc::new(
            FakeAdapter::new("x", "x.test")
                .serve(
                    "https://x.test/s",
                    Ok(profile("x", "https://x.test/s", "s", &[], &["https://y.test/a", "https://w.test/b"])),
                )
                .serve(
                    "https://x.test/c",
                    Ok(profile("x", "https://x.test/c", "c", &["https://d.test/"], &[])),
                ),
        );
        let y = Arc::new(
            FakeAdapter::new("y", "y.test")
                .serve(
                    "https://y.test/a",
                    Ok(profile("y", "https://y.test/a", "a", &["https://d.test/"], &[])),
                )
                .slow(a_delay),
        );
        let w = Arc::new(FakeAdapter::new("w", "w.test").serve(
            "https://w.test/b",
            Ok(profile("w", "https://w.test/b", "b", &["https://x.test/c"], &[])),
        ));
        let generic = Arc::new(FakeAdapter::fallback().serve(
            "https://d.test/",
            Ok(profile("generic", "https://d.test/", "", &[], &[])),
        ));
        let registry = Arc::new(
            Registry::new(generic.clone())
                .with(x)
                .with(y)
                .with(w),
        );
        (registry, generic)
    }

    #[tokio::test]
    async fn test_slow_sibling_does_not_change_aggregate() {
        let config = config().with_max_depth(2).with_workers(4);

        let (fast, fast_generic) = sibling_graph(Duration::ZERO);
        let (slow, slow_generic) = sibling_graph(Duration::from_millis(300));
        let quick = run(fast, "https://x.test/s", &config).await;
        let lagged = run(slow, "https://x.test/s", &config).await;

        assert_eq!(fast_generic.calls("https://d.test/"), 1);
        assert_eq!(slow_generic.calls("https://d.test/"), 1);
        for outcome in [&quick, &lagged] {
            assert_eq!(
                outcome.identity.platforms().collect::<Vec<_>>(),
                vec!["generic", "w", "x", "y"]
            );
            let d = outcome
                .diagnostics
                .visits
                .iter()
                .find(|v| v.url == "https://d.test/")
                .unwrap();
            assert_eq!(d.depth, 2);
            assert_eq!(d.discovered_from.as_deref(), Some("https://y.test/a"));
        }
    }

    #[tokio::test]
    async fn test_dropped_crawl_cancels_fetches() {
        let x = Arc::new(
            FakeAdapter::new("x", "x.test")
                .serve("https://x.test/slow", Ok(profile("x", "https://x.test/slow", "s", &[], &[])))
                .slow(Duration::from_millis(300)),
        );
        let y = Arc::new(FakeAdapter::new("y", "y.test"));
        let generic = Arc::new(FakeAdapter::fallback());
        let engine = CrawlEngine::new(registry(&x, &y, &generic));

        let seeds = vec!["https://x.test/slow".to_string()];
        let abandoned = tokio::time::timeout(
            Duration::from_millis(50),
            engine.discover(&seeds, &config(), CancellationToken::new()),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(x.calls("https://x.test/slow"), 1);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(x.completed(), 0);
    }
}
