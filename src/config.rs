use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::throttle::{DelayRange, RateLimiter};
use crate::{
    Error, Result, DEFAULT_LOAD_DELAY, DEFAULT_PAGE_DELAY, DEFAULT_RESTART_EVERY,
    DEFAULT_SAVE_EVERY, DEFAULT_STALE_BACKOFF_MS, DEFAULT_STALE_RETRIES, DEFAULT_WAIT_TIMEOUT_SECS,
    PAGE_PLACEHOLDER,
};

/// One dataset to scrape: a listing URL and the pages of it we want.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionConfig {
    /// Listing URL with a `{page}` placeholder.
    pub url: String,
    pub state: String,
    pub output: PathBuf,
    pub backup: PathBuf,
    pub start_page: u32,
    pub finish_page: u32,
}

impl PartitionConfig {
    pub fn page_url(&self, page: u32) -> String {
        self.url.replace(PAGE_PLACEHOLDER, &page.to_string())
    }

    pub fn pages(&self) -> std::ops::RangeInclusive<u32> {
        self.start_page..=self.finish_page
    }

    pub fn validate(&self) -> Result<()> {
        if self.state.trim().is_empty() {
            return Err(Error::Config("partition identifier is empty".into()));
        }
        if !self.url.contains(PAGE_PLACEHOLDER) {
            return Err(Error::Config(format!(
                "{}: url {:?} has no {PAGE_PLACEHOLDER} placeholder",
                self.state, self.url
            )));
        }
        if self.start_page > self.finish_page {
            return Err(Error::Config(format!(
                "{}: start page {} is after finish page {}",
                self.state, self.start_page, self.finish_page
            )));
        }
        if self.output == self.backup {
            return Err(Error::Config(format!(
                "{}: output and backup are the same file",
                self.state
            )));
        }
        Ok(())
    }
}

/// Tuning shared by every partition of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    /// Backup chunk size.
    pub save_every: usize,
    /// Recycle the session every this many records.
    pub restart_every: usize,
    pub wait_timeout_secs: u64,
    pub stale_retries: u32,
    pub stale_backoff_ms: u64,
    pub load_delay: DelayRange,
    pub page_delay: DelayRange,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            save_every: DEFAULT_SAVE_EVERY,
            restart_every: DEFAULT_RESTART_EVERY,
            wait_timeout_secs: DEFAULT_WAIT_TIMEOUT_SECS,
            stale_retries: DEFAULT_STALE_RETRIES,
            stale_backoff_ms: DEFAULT_STALE_BACKOFF_MS,
            load_delay: DEFAULT_LOAD_DELAY,
            page_delay: DEFAULT_PAGE_DELAY,
        }
    }
}

impl RunOptions {
    pub fn validate(&self) -> Result<()> {
        if self.save_every == 0 {
            return Err(Error::Config("save_every must be positive".into()));
        }
        if self.restart_every == 0 {
            return Err(Error::Config("restart_every must be positive".into()));
        }
        Ok(())
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }

    pub fn stale_backoff(&self) -> Duration {
        Duration::from_millis(self.stale_backoff_ms)
    }

    pub fn rate_limiter(&self) -> RateLimiter {
        RateLimiter::new(self.load_delay, self.page_delay)
    }
}

/// A whole run described in one JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunFile {
    #[serde(default)]
    pub options: RunOptions,
    pub partitions: Vec<PartitionConfig>,
}

impl RunFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let run: RunFile = serde_json::from_str(&contents)?;
        run.options.validate()?;
        if run.partitions.is_empty() {
            return Err(Error::Config("no partitions configured".into()));
        }
        for partition in &run.partitions {
            partition.validate()?;
        }
        check_shared_files(&run.partitions)?;
        Ok(run)
    }
}

/// Partitions may share an output (they then run one after the other and keep
/// one numbering), but a backup belongs to exactly one output and never doubles
/// as anybody's output.
fn check_shared_files(partitions: &[PartitionConfig]) -> Result<()> {
    for (i, a) in partitions.iter().enumerate() {
        for b in &partitions[i + 1..] {
            if a.backup == b.backup && a.output != b.output {
                return Err(Error::Config(format!(
                    "{} and {} share backup {} but write different outputs",
                    a.state,
                    b.state,
                    a.backup.display()
                )));
            }
            if a.output == b.backup || a.backup == b.output {
                return Err(Error::Config(format!(
                    "{} and {} use the same file as output and backup",
                    a.state, b.state
                )));
            }
        }
    }
    Ok(())
}
