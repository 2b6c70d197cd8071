use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Sliding-window rate limiter keyed by an opaque string (the client IP).
///
/// Each key holds the timestamps of its recently allowed attempts; entries
/// older than the window are pruned lazily on access. Denied attempts are not
/// recorded, so being rate-limited never extends the lockout.
pub struct RateLimiter {
    limit: usize,
    window: Duration,
    attempts: Mutex<HashMap<String, Vec<Instant>>>,
}

impl RateLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        let limit = limit.max(1);
        let window = if window.is_zero() {
            Duration::from_secs(60)
        } else {
            window
        };

        Self {
            limit,
            window,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    /// Returns whether an attempt for `key` is allowed right now, recording
    /// the attempt if so.
    pub fn allow(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut attempts = self.attempts.lock().expect("rate limiter lock");

        let recent = attempts.entry(key.to_string()).or_default();
        recent.retain(|stamp| now.duration_since(*stamp) < self.window);

        if recent.len() >= self.limit {
            return false;
        }

        recent.push(now);
        true
    }
}
