//! Randomized delays between remote calls.
//!
//! Channels are processed one at a time with human-looking gaps between them
//! and between messages, to keep the automation footprint small.

use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DelayRange {
    pub min: Duration,
    pub max: Duration,
}

impl DelayRange {
    pub const ZERO: DelayRange = DelayRange {
        min: Duration::ZERO,
        max: Duration::ZERO,
    };

    pub fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    pub fn sample(&self) -> Duration {
        uniform_between(self.min, self.max)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pacing {
    pub between_channels: DelayRange,
    pub between_messages: DelayRange,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            between_channels: DelayRange::new(Duration::from_secs(2), Duration::from_secs(5)),
            between_messages: DelayRange::new(
                Duration::from_millis(300),
                Duration::from_millis(700),
            ),
        }
    }
}

impl Pacing {
    pub fn none() -> Self {
        Self {
            between_channels: DelayRange::ZERO,
            between_messages: DelayRange::ZERO,
        }
    }

    pub async fn channel_gap(&self) {
        pause(self.between_channels.sample()).await;
    }

    pub async fn message_gap(&self) {
        pause(self.between_messages.sample()).await;
    }
}

/// Uniform sample in `[lo, hi)`; collapses to `lo` for empty ranges.
pub fn uniform_between(lo: Duration, hi: Duration) -> Duration {
    if hi <= lo {
        return lo;
    }
    let secs = rand::rng().random_range(lo.as_secs_f64()..hi.as_secs_f64());
    Duration::from_secs_f64(secs)
}

async fn pause(d: Duration) {
    if !d.is_zero() {
        sleep(d).await;
    }
}
