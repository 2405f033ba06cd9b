//! Sliding-window rate limiter for the upstream API.
//!
//! Keeps the timestamps of the last minute's calls in a bounded window.
//! `acquire` blocks until a slot frees up, then records the call. State
//! is process-local and resets on restart, which is acceptable because a
//! restart implies no in-flight external calls.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Trailing window covered by the limiter.
const WINDOW: Duration = Duration::from_secs(60);

/// Admission control bounding outbound API calls per minute.
///
/// Clones share the same window. The window mutex is held across the
/// wait so only one admission decision is evaluated at a time.
#[derive(Clone)]
pub struct RateLimiter {
    max_calls: usize,
    window: Arc<Mutex<VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(max_calls_per_minute: usize) -> Self {
        Self {
            max_calls: max_calls_per_minute.max(1),
            window: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Block until a call slot is available, then record the call.
    pub async fn acquire(&self) {
        let mut window = self.window.lock().await;

        Self::purge(&mut window, Instant::now());

        if window.len() >= self.max_calls
            && let Some(&oldest) = window.front()
        {
            let wait = (oldest + WINDOW).saturating_duration_since(Instant::now());
            if !wait.is_zero() {
                tracing::debug!(wait_ms = %wait.as_millis(), "Rate limit reached, waiting");
                tokio::time::sleep(wait).await;
            }
            Self::purge(&mut window, Instant::now());
        }

        window.push_back(Instant::now());
    }

    /// Current occupancy of the trailing window, for observability.
    pub async fn calls_in_window(&self) -> usize {
        let window = self.window.lock().await;
        match Instant::now().checked_sub(WINDOW) {
            Some(cutoff) => window.iter().filter(|&&t| t > cutoff).count(),
            // The process is younger than the window; nothing has expired.
            None => window.len(),
        }
    }

    // A timestamp expires once it is a full window old.
    fn purge(window: &mut VecDeque<Instant>, now: Instant) {
        let Some(cutoff) = now.checked_sub(WINDOW) else {
            return;
        };
        while let Some(&oldest) = window.front() {
            if oldest <= cutoff {
                window.pop_front();
            } else {
                break;
            }
        }
    }
}

impl Default for RateLimiter {
    /// 60 calls per minute, the upstream free-tier limit.
    fn default() -> Self {
        Self::new(60)
    }
}
