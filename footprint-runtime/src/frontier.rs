//! Crawl frontier
//!
//! Discovered-but-unprocessed links plus the state of every key ever seen.
//! All mutation happens under one lock, so the dedup check and the insert
//! are a single atomic step.
//!
//! The queue is handed out one depth level at a time (see `next`), which
//! keeps it sorted by depth and means a key is always admitted at the
//! shallowest depth it can be reached from.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

/// Lifecycle of a frontier key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Pending,
    Fetching,
    Resolved,
    Failed,
    Skipped,
}

/// A link waiting to be fetched
#[derive(Debug, Clone, PartialEq)]
pub struct FrontierEntry {
    /// Absolute URL handed to the adapter
    pub url: String,
    /// Normalized dedup key
    pub key: String,
    /// Platform the registry routes `url` to
    pub platform: &'static str,
    pub depth: usize,
    /// URL of the profile that linked here; `None` for seeds
    pub discovered_from: Option<String>,
    /// Seed, or reached through a chain of verified links
    pub verified: bool,
    /// Username candidate (or reached only from one); scored at finalize
    pub guess: bool,
}

/// Result of offering an entry to the frontier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Enqueued,
    /// Key already known, in any state
    Duplicate,
    /// Deeper than the limit; the key stays unclaimed
    TooDeep,
}

#[derive(Debug, Default)]
struct State {
    states: HashMap<String, EntryState>,
    queue: VecDeque<FrontierEntry>,
    dispatched: usize,
}

/// Shared frontier for one crawl
#[derive(Debug)]
pub struct Frontier {
    max_depth: usize,
    max_visited: usize,
    state: Mutex<State>,
}

impl Frontier {
    pub fn new(max_depth: usize, max_visited: usize) -> Self {
        Self {
            max_depth,
            max_visited,
            state: Mutex::new(State::default()),
        }
    }

    /// Check-and-insert. First discovery of a key wins; later offers of the
    /// same key are duplicates whatever state it has reached. A duplicate
    /// that arrives while the key still waits at the same depth merges its
    /// provenance: any verified path makes it verified, any non-guess path
    /// makes it a non-guess.
    pub fn offer(&self, entry: FrontierEntry) -> Admission {
        let mut state = self.state.lock();
        if state.states.contains_key(&entry.key) {
            if let Some(queued) = state
                .queue
                .iter_mut()
                .find(|q| q.key == entry.key && entry.depth <= q.depth)
            {
                queued.verified |= entry.verified;
                queued.guess &= entry.guess;
            }
            return Admission::Duplicate;
        }
        if entry.depth > self.max_depth {
            return Admission::TooDeep;
        }
        state.states.insert(entry.key.clone(), EntryState::Pending);
        state.queue.push_back(entry);
        Admission::Enqueued
    }

    /// Pop the next pending entry no deeper than `level` and mark it
    /// fetching. Returns `None` when nothing at that level waits or the
    /// visit budget is spent.
    pub fn next(&self, level: usize) -> Option<FrontierEntry> {
        let mut state = self.state.lock();
        if state.dispatched >= self.max_visited {
            return None;
        }
        if state.queue.front()?.depth > level {
            return None;
        }
        let entry = state.queue.pop_front()?;
        state.states.insert(entry.key.clone(), EntryState::Fetching);
        state.dispatched += 1;
        Some(entry)
    }

    /// Depth of the next entry `next` would hand out, if the budget allows
    pub fn next_level(&self) -> Option<usize> {
        let state = self.state.lock();
        if state.dispatched >= self.max_visited {
            return None;
        }
        state.queue.front().map(|entry| entry.depth)
    }

    /// Record the terminal state of a fetched key
    pub fn complete(&self, key: &str, outcome: EntryState) {
        let mut state = self.state.lock();
        if let Some(current) = state.states.get_mut(key) {
            *current = outcome;
        }
    }

    /// Remove every pending entry, marking it skipped
    pub fn drain(&self) -> Vec<FrontierEntry> {
        let mut state = self.state.lock();
        let leftovers: Vec<FrontierEntry> = state.queue.drain(..).collect();
        for entry in &leftovers {
            state.states.insert(entry.key.clone(), EntryState::Skipped);
        }
        leftovers
    }
}

#[cfg(test)]
impl Frontier {
    fn state(&self, key: &str) -> Option<EntryState> {
        self.state.lock().states.get(key).copied()
    }

    fn queued(&self, key: &str) -> Option<FrontierEntry> {
        self.state.lock().queue.iter().find(|e| e.key == key).cloned()
    }
}
