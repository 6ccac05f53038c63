//! Fixed-window request admission control keyed by caller identifier.
//!
//! Windows do not slide: a burst straddling a window boundary can admit up to
//! twice the limit in a short span. That is acceptable for abuse prevention;
//! this is not a precise quota.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// Per-identifier window state.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitEntry {
    pub count: u32,
    pub window_reset_at: Instant,
}

impl RateLimitEntry {
    fn fresh(now: Instant, window: Duration) -> Self {
        Self {
            count: 0,
            window_reset_at: now + window,
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.window_reset_at <= now
    }
}

/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub current: u32,
    pub limit: u32,
    pub reset_in_secs: u64,
}

impl RateLimitDecision {
    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.current)
    }

    /// Standard `X-RateLimit-*` response headers.
    pub fn headers(&self) -> [(&'static str, String); 3] {
        [
            ("x-ratelimit-limit", self.limit.to_string()),
            ("x-ratelimit-remaining", self.remaining().to_string()),
            ("x-ratelimit-reset", self.reset_in_secs.to_string()),
        ]
    }
}

/// In-process fixed-window rate limiter.
#[derive(Debug, Default)]
pub struct RateLimiter {
    entries: DashMap<String, RateLimitEntry>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit or deny one request from `id`.
    pub fn check(&self, id: &str, max_requests: u32, window: Duration) -> RateLimitDecision {
        let now = Instant::now();

        let mut entry = self
            .entries
            .entry(id.to_string())
            .or_insert_with(|| RateLimitEntry::fresh(now, window));

        // Replace, never extend, an elapsed window
        if entry.is_expired(now) {
            *entry = RateLimitEntry::fresh(now, window);
        }

        let allowed = entry.count < max_requests;
        if allowed {
            entry.count += 1;
        }

        let remaining = entry.window_reset_at.saturating_duration_since(now);
        RateLimitDecision {
            allowed,
            current: entry.count,
            limit: max_requests,
            reset_in_secs: remaining.as_millis().div_ceil(1000) as u64,
        }
    }

    /// Remove every entry whose window has elapsed. Returns how many were dropped.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Run [`sweep`](Self::sweep) every `interval` until the limiter is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let limiter: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick fires immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(limiter) = limiter.upgrade() else {
                    break;
                };
                let removed = limiter.sweep();
                if removed > 0 {
                    debug!(removed, remaining = limiter.len(), "Swept expired rate limit windows");
                }
            }
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
