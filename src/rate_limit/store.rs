//! Shared concurrent store of per-key rate-limit windows

use dashmap::DashMap;
use std::time::{Duration, Instant};

/// One fixed window: admissions counted since `started_at`
#[derive(Debug, Clone)]
struct Window {
    count: u32,
    started_at: Instant,
}

/// Concurrent map of rate-limit windows keyed by identifier.
///
/// Creation of a window is race-free: the `DashMap` entry API guarantees
/// that exactly one window exists per key and that concurrent first-callers
/// join it. The count only resets when the window has lapsed, never earlier.
#[derive(Debug, Default)]
pub struct WindowStore {
    windows: DashMap<String, Window>,
}

impl WindowStore {
    pub fn new() -> Self {
        Self {
            windows: DashMap::new(),
        }
    }

    /// Atomically increment the window for `key`, creating or rotating it as
    /// needed. Returns the post-increment count and the time remaining in
    /// the current window.
    pub fn increment(&self, key: &str, window_len: Duration) -> (u32, Duration) {
        let mut entry = self
            .windows
            .entry(key.to_string())
            .or_insert_with(|| Window {
                count: 0,
                started_at: Instant::now(),
            });

        if entry.started_at.elapsed() >= window_len {
            entry.count = 0;
            entry.started_at = Instant::now();
        }
        entry.count += 1;

        let remaining = window_len.saturating_sub(entry.started_at.elapsed());
        (entry.count, remaining)
    }

    /// Drop windows that have lapsed. Called periodically; correctness does
    /// not depend on it since `increment` rotates stale windows itself.
    pub fn purge_expired(&self, window_len: Duration) {
        self.windows
            .retain(|_, window| window.started_at.elapsed() < window_len);
    }

    /// Number of live windows, for observability
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}
