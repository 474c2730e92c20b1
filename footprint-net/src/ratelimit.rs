//! Per-host rate limiter
//!
//! Enforces a minimum delay between successive requests to the same host.
//! Each host gets its own lock, created on first sight, so pacing one host
//! never blocks requests to another.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::trace;

use footprint_core::host_key;

type HostSlot = Arc<Mutex<Option<Instant>>>;

/// Shared per-host pacing state
#[derive(Debug)]
pub struct DomainRateLimiter {
    hosts: DashMap<String, HostSlot>,
    min_delay: Duration,
}

impl DomainRateLimiter {
    pub fn new(min_delay: Duration) -> Self {
        Self {
            hosts: DashMap::new(),
            min_delay,
        }
    }

    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    /// Wait until a request to `url`'s host is allowed, then record the issue
    /// time. Returns that time, or `None` when the URL has no parseable host
    /// (no wait happens in that case).
    pub async fn wait(&self, url: &str) -> Option<Instant> {
        let host = host_key(url)?;

        // Clone the slot out so the map shard lock is released before awaiting
        let slot: HostSlot = self
            .hosts
            .entry(host.clone())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone();

        let mut last = slot.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_delay {
                let remaining = self.min_delay - elapsed;
                trace!("Pacing {} for {:?}", host, remaining);
                sleep(remaining).await;
            }
        }

        let issued = Instant::now();
        *last = Some(issued);
        Some(issued)
    }

    /// Drop state for hosts idle longer than `idle_for`. Hosts whose lock is
    /// held or awaited are kept.
    pub fn reap_idle(&self, idle_for: Duration) -> usize {
        let before = self.hosts.len();
        self.hosts.retain(|_, slot| {
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            match slot.try_lock() {
                Ok(last) => (*last).is_some_and(|t| t.elapsed() < idle_for),
                Err(_) => true,
            }
        });
        before - self.hosts.len()
    }

    /// Number of hosts with pacing state
    pub fn tracked_hosts(&self) -> usize {
        self.hosts.len()
    }
}
