use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::debug;

/// An inclusive range of milliseconds to pick a random delay from, written `lo..hi`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DelayRange {
    lo: u64,
    hi: u64,
}

impl DelayRange {
    pub fn new(lo: u64, hi: u64) -> Result<Self, String> {
        if lo > hi {
            return Err(format!("delay range {lo}..{hi} is empty"));
        }
        Ok(Self { lo, hi })
    }

    pub const fn none() -> Self {
        Self { lo: 0, hi: 0 }
    }

    /// For constants; swaps the bounds instead of failing.
    pub const fn between(lo: u64, hi: u64) -> Self {
        if lo <= hi {
            Self { lo, hi }
        } else {
            Self { lo: hi, hi: lo }
        }
    }

    pub fn millis(&self) -> RangeInclusive<u64> {
        self.lo..=self.hi
    }

    pub fn pick(&self) -> Duration {
        let ms = rand::thread_rng().gen_range(self.millis());
        Duration::from_millis(ms)
    }
}

impl FromStr for DelayRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lo, hi) = s
            .split_once("..")
            .ok_or_else(|| format!("expected <lo>..<hi> milliseconds, got {s:?}"))?;
        let parse = |n: &str| {
            n.trim()
                .parse::<u64>()
                .map_err(|e| format!("bad delay {n:?}: {e}"))
        };
        Self::new(parse(lo)?, parse(hi)?)
    }
}

impl TryFrom<String> for DelayRange {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DelayRange> for String {
    fn from(value: DelayRange) -> Self {
        value.to_string()
    }
}

impl fmt::Display for DelayRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.lo, self.hi)
    }
}

/// Random pauses between network-bound steps.
#[derive(Debug, Clone, Copy)]
pub struct RateLimiter {
    /// After each page load, whatever the outcome.
    load: DelayRange,
    /// After each finished (or skipped) page.
    page: DelayRange,
}

impl RateLimiter {
    pub fn new(load: DelayRange, page: DelayRange) -> Self {
        Self { load, page }
    }

    /// No delays at all.
    pub fn disabled() -> Self {
        Self::new(DelayRange::none(), DelayRange::none())
    }

    pub async fn after_load(&self) {
        Self::pause(self.load, "load").await;
    }

    pub async fn after_page(&self) {
        Self::pause(self.page, "page").await;
    }

    async fn pause(range: DelayRange, what: &str) {
        let delay = range.pick();
        if delay.is_zero() {
            return;
        }
        debug!("Waiting for {:.2} seconds ({what} delay)...", delay.as_secs_f64());
        sleep(delay).await;
    }
}
