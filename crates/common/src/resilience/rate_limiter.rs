//! Server-reported rate-limit tracking
//!
//! The X API reports quota on every response through `x-rate-limit-*`
//! headers. [`RateLimitTracker`] keeps the latest window per endpoint and
//! answers whether a new call may proceed now or must wait for the reset.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use reqwest::header::HeaderMap;
use tern_domain::{RateLimitEvent, RateLimitSnapshot, RateLimitWindow};
use tracing::{debug, info, warn};

use crate::sync::Feed;
use crate::time::Clock;

pub const REMAINING_HEADER: &str = "x-rate-limit-remaining";
pub const LIMIT_HEADER: &str = "x-rate-limit-limit";
pub const RESET_HEADER: &str = "x-rate-limit-reset";

/// Outcome of [`RateLimitTracker::check_before_call`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Proceed,
    WaitUntil { reset_at: DateTime<Utc>, wait: Duration },
}

impl RateLimitDecision {
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::WaitUntil { .. })
    }
}

/// Parse `x-rate-limit-*` headers into a snapshot.
///
/// `x-rate-limit-reset` is epoch seconds. Returns `None` unless both the
/// remaining count and the reset time are present and well formed; a missing
/// limit defaults to the remaining count.
#[must_use]
pub fn rate_limit_from_headers(headers: &HeaderMap) -> Option<RateLimitSnapshot> {
    fn parse<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
        headers.get(name)?.to_str().ok()?.trim().parse().ok()
    }

    let remaining: u32 = parse(headers, REMAINING_HEADER)?;
    let reset_epoch: i64 = parse(headers, RESET_HEADER)?;
    let reset_at = Utc.timestamp_opt(reset_epoch, 0).single()?;
    let limit = parse(headers, LIMIT_HEADER).unwrap_or(remaining);
    Some(RateLimitSnapshot { remaining, limit, reset_at })
}

/// Per-endpoint quota windows.
///
/// A window's `reset_at` never moves backwards: a response carrying an older
/// reset time than the stored one is ignored.
#[derive(Debug)]
pub struct RateLimitTracker {
    windows: Mutex<HashMap<String, RateLimitWindow>>,
    clock: Arc<dyn Clock>,
    events: Option<Feed<RateLimitEvent>>,
}

impl RateLimitTracker {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { windows: Mutex::new(HashMap::new()), clock, events: None }
    }

    /// Publish window changes on `feed`.
    #[must_use]
    pub fn with_events(mut self, feed: Feed<RateLimitEvent>) -> Self {
        self.events = Some(feed);
        self
    }

    /// Record the quota reported by a response.
    ///
    /// Returns `false` when the window was rejected for being older than the
    /// stored one.
    pub fn record_response(
        &self,
        endpoint: &str,
        remaining: u32,
        limit: u32,
        reset_at: DateTime<Utc>,
    ) -> bool {
        let window = RateLimitWindow { endpoint: endpoint.to_string(), remaining, limit, reset_at };
        {
            let mut windows = self.windows.lock();
            if let Some(existing) = windows.get(endpoint) {
                if reset_at < existing.reset_at {
                    debug!(
                        endpoint,
                        stored_reset = %existing.reset_at,
                        received_reset = %reset_at,
                        "Ignoring stale rate-limit window"
                    );
                    return false;
                }
            }
            windows.insert(endpoint.to_string(), window.clone());
        }

        debug!(endpoint, remaining, limit, reset_at = %reset_at, "Rate-limit window updated");
        self.publish(RateLimitEvent::Updated(window));
        if remaining == 0 {
            warn!(endpoint, reset_at = %reset_at, "Rate limit exhausted");
            self.publish(RateLimitEvent::Exceeded { endpoint: endpoint.to_string(), reset_at });
        }
        true
    }

    pub fn record_snapshot(&self, endpoint: &str, snapshot: RateLimitSnapshot) -> bool {
        self.record_response(endpoint, snapshot.remaining, snapshot.limit, snapshot.reset_at)
    }

    /// Mark `endpoint` exhausted until `reset_at` (a 429 without usable
    /// headers).
    pub fn record_exhausted(&self, endpoint: &str, reset_at: DateTime<Utc>) -> bool {
        let limit = self.window(endpoint).map_or(0, |window| window.limit);
        self.record_response(endpoint, 0, limit, reset_at)
    }

    /// Whether a call to `endpoint` may be made now.
    #[must_use]
    pub fn check_before_call(&self, endpoint: &str) -> RateLimitDecision {
        let now = self.clock.now();
        let windows = self.windows.lock();
        match windows.get(endpoint) {
            Some(window) if window.is_exhausted_at(now) => RateLimitDecision::WaitUntil {
                reset_at: window.reset_at,
                wait: (window.reset_at - now).to_std().unwrap_or(Duration::ZERO),
            },
            _ => RateLimitDecision::Proceed,
        }
    }

    #[must_use]
    pub fn window(&self, endpoint: &str) -> Option<RateLimitWindow> {
        self.windows.lock().get(endpoint).cloned()
    }

    /// All known windows, ordered by endpoint.
    #[must_use]
    pub fn snapshot(&self) -> Vec<RateLimitWindow> {
        let mut windows: Vec<_> = self.windows.lock().values().cloned().collect();
        windows.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));
        windows
    }

    /// Earliest reset among windows that are currently blocking calls.
    #[must_use]
    pub fn next_reset_at(&self) -> Option<DateTime<Utc>> {
        let now = self.clock.now();
        self.windows
            .lock()
            .values()
            .filter(|window| window.is_exhausted_at(now))
            .map(|window| window.reset_at)
            .min()
    }

    /// Endpoints whose exhausted window has elapsed since the last call.
    ///
    /// Each such window is restored to its full limit and reported once.
    pub fn take_reset_windows(&self) -> Vec<String> {
        let now = self.clock.now();
        let mut reset = Vec::new();
        {
            let mut windows = self.windows.lock();
            for window in windows.values_mut() {
                if window.remaining == 0 && now >= window.reset_at {
                    window.remaining = window.limit;
                    reset.push(window.endpoint.clone());
                }
            }
        }
        reset.sort();

        for endpoint in &reset {
            info!(endpoint = %endpoint, "Rate-limit window reset");
            self.publish(RateLimitEvent::Reset { endpoint: endpoint.clone() });
        }
        reset
    }

    fn publish(&self, event: RateLimitEvent) {
        if let Some(feed) = &self.events {
            feed.publish(event);
        }
    }
}
