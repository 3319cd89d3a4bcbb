//! Resumable scraper for paginated agent directory listings.
//!
//! Each partition (one state's listing) is walked page by page; every card on a
//! page becomes a [`Record`] numbered `agent_<N>`, where `N` keeps counting from
//! the highest index already in the partition's output file. Records are backed
//! up in chunks while the run goes on and appended to the output at the end.

mod error;
mod macros;

pub mod checkpoint;
pub mod config;
pub mod extract;
pub mod logger;
pub mod parse;
pub mod persist;
pub mod process;
pub mod record;
pub mod request;
pub mod session;
pub mod throttle;

pub use checkpoint::resume_index;
pub use config::{PartitionConfig, RunFile, RunOptions};
pub use error::{Error, FieldFault, Result};
pub use process::{process_partition, process_partitions, process_partitions_with, RunSummary};
pub use record::Record;

use throttle::DelayRange;

/// Field separator of the output and backup files.
pub const OUTPUT_DELIMITER: u8 = b'*';
/// Replaced by the page number in a partition's listing URL.
pub const PAGE_PLACEHOLDER: &str = "{page}";

pub const DEFAULT_SAVE_EVERY: usize = 100;
pub const DEFAULT_RESTART_EVERY: usize = 500;
pub const DEFAULT_WAIT_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_STALE_RETRIES: u32 = 3;
pub const DEFAULT_STALE_BACKOFF_MS: u64 = 1000;
/// Right after a page load.
pub const DEFAULT_LOAD_DELAY: DelayRange = DelayRange::between(2000, 3000);
/// Between pages.
pub const DEFAULT_PAGE_DELAY: DelayRange = DelayRange::between(800, 1500);
