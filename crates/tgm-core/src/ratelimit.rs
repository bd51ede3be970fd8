//! Rolling-window limiter for outbound remote calls.
//!
//! At most `max_calls` calls are admitted per `window`. The call that would
//! exceed the ceiling is suspended until the window has run out, plus a random
//! jitter, and then opens a fresh window.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::info;

use crate::pacing::uniform_between;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowConfig {
    pub max_calls: u32,
    pub window: Duration,
    pub jitter_min: Duration,
    pub jitter_max: Duration,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            max_calls: 20,
            window: Duration::from_secs(60),
            jitter_min: Duration::from_secs(1),
            jitter_max: Duration::from_secs(5),
        }
    }
}

#[derive(Debug)]
struct WindowState {
    count: u32,
    window_start: Instant,
}

impl WindowState {
    fn new(now: Instant) -> Self {
        Self {
            count: 0,
            window_start: now,
        }
    }

    /// Account for one call issued at `now` and return how long it has to be
    /// suspended first (if at all).
    fn reserve_at(&mut self, cfg: &WindowConfig, now: Instant, jitter: Duration) -> Option<Duration> {
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed >= cfg.window {
            self.count = 0;
            self.window_start = now;
        }

        let mut wait = None;
        if self.count >= cfg.max_calls {
            let elapsed = now.saturating_duration_since(self.window_start);
            let d = cfg.window.saturating_sub(elapsed) + jitter;
            // The suspended call opens the next window once it wakes up.
            self.count = 0;
            self.window_start = now + d;
            wait = Some(d);
        }

        self.count += 1;
        wait
    }
}

pub struct WindowLimiter {
    cfg: WindowConfig,
    state: Mutex<WindowState>,
}

impl WindowLimiter {
    pub fn new(cfg: WindowConfig) -> Self {
        Self {
            cfg,
            state: Mutex::new(WindowState::new(Instant::now())),
        }
    }

    /// Wait (cooperatively) until one more remote call is allowed.
    pub async fn acquire(&self) {
        // The lock is held across the sleep so concurrent callers queue up
        // behind the suspended one instead of overshooting the new window.
        let mut st = self.state.lock().await;
        let jitter = uniform_between(self.cfg.jitter_min, self.cfg.jitter_max);
        if let Some(wait) = st.reserve_at(&self.cfg, Instant::now(), jitter) {
            info!(
                wait_secs = wait.as_secs_f64(),
                max_calls = self.cfg.max_calls,
                "Rate limit window exhausted, suspending"
            );
            sleep(wait).await;
        }
    }

    /// Calls already admitted in the current window.
    #[cfg(test)]
    async fn used(&self) -> u32 {
        let st = self.state.lock().await;
        if Instant::now().saturating_duration_since(st.window_start) >= self.cfg.window {
            0
        } else {
            st.count
        }
    }
}
