//! Fixed-window rate limiter with two independent scopes

use crate::config::RateLimitScopeConfig;
use crate::rate_limit::store::WindowStore;
use std::time::Duration;
use tracing::warn;

/// Key used for the single global window
pub const GLOBAL_KEY: &str = "global";

/// Sentinel identifier when the caller's address is unavailable
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Admission scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Global,
    PerClient,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Global => "global",
            Scope::PerClient => "per_client",
        }
    }
}

/// Outcome of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    /// Denied; the caller may retry after this many seconds
    Deny { retry_after_secs: u64 },
}

/// Counts admissions per key in non-overlapping fixed windows.
///
/// A denial never bans a key permanently: the window always lapses, after
/// which the next admission starts a fresh count.
pub struct FixedWindowLimiter {
    scope: Scope,
    threshold: u32,
    window: Duration,
    store: WindowStore,
}

impl FixedWindowLimiter {
    pub fn new(scope: Scope, threshold: u32, window: Duration) -> Self {
        Self {
            scope,
            threshold,
            window,
            store: WindowStore::new(),
        }
    }

    pub fn from_config(scope: Scope, config: &RateLimitScopeConfig) -> Self {
        Self::new(scope, config.times, Duration::from_secs(config.window_secs))
    }

    /// Admit or deny one request for `identifier`
    pub fn admit(&self, identifier: &str) -> Decision {
        let (count, remaining) = self.store.increment(identifier, self.window);
        if count > self.threshold {
            let retry_after_secs = ceil_secs(remaining).max(1);
            warn!(
                scope = self.scope.as_str(),
                identifier,
                count,
                threshold = self.threshold,
                retry_after_secs,
                "request denied by rate limit"
            );
            Decision::Deny { retry_after_secs }
        } else {
            Decision::Allow
        }
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Drop lapsed windows; safe to call at any time
    pub fn purge_expired(&self) {
        self.store.purge_expired(self.window);
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    let millis = duration.as_millis() as u64;
    millis.div_ceil(1000)
}
