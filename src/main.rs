use std::path::{Path, PathBuf};

use chrono::Local;
use clap::{Args, Parser, Subcommand};
use tracing::{error, info, info_span};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use agent_scrap::logger::PartitionLogFiles;
use agent_scrap::request::HttpSessionProvider;
use agent_scrap::throttle::DelayRange;
use agent_scrap::{
    info_time, process_partition, process_partitions, resume_index, PartitionConfig, Result,
    RunFile, RunOptions, RunSummary, DEFAULT_LOAD_DELAY, DEFAULT_PAGE_DELAY,
    DEFAULT_RESTART_EVERY, DEFAULT_SAVE_EVERY, DEFAULT_STALE_BACKOFF_MS, DEFAULT_STALE_RETRIES,
    DEFAULT_WAIT_TIMEOUT_SECS,
};

#[derive(Parser)]
#[command(name = "agent_scrap", about = "Resumable scraper for paginated agent listings")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape one partition's page range
    Run {
        #[command(flatten)]
        partition: PartitionArgs,
        #[command(flatten)]
        tuning: Tuning,
        /// Directory of the <state>_log_info.log file
        #[arg(long, env = "LOG_DIR", default_value = ".")]
        log_dir: PathBuf,
    },
    /// Scrape every partition of a JSON run file; partitions sharing an output run in order
    RunAll {
        #[arg(short, long)]
        config: PathBuf,
        /// Directory of the per-partition <state>_log_info.log files
        #[arg(long, env = "LOG_DIR", default_value = ".")]
        log_dir: PathBuf,
    },
    /// Print the agent index a run on this output file would resume after
    ResumeIndex {
        #[arg(long, env = "OUTPUT_FILE")]
        output: PathBuf,
    },
}

#[derive(Args)]
struct PartitionArgs {
    /// Listing URL with a {page} placeholder
    #[arg(long, env = "URL")]
    url: String,
    /// Partition identifier, stored in every record
    #[arg(long, env = "STATE")]
    state: String,
    #[arg(long, env = "OUTPUT_FILE")]
    output: PathBuf,
    #[arg(long, env = "BACKUP_FILE")]
    backup: PathBuf,
    /// First page (inclusive)
    #[arg(long, env = "START_PAGE", default_value_t = 1)]
    start: u32,
    /// Last page (inclusive)
    #[arg(long, env = "FINISH_PAGE")]
    finish: u32,
}

#[derive(Args)]
struct Tuning {
    /// Backup every N agents
    #[arg(long, env = "SAVE_EVERY", default_value_t = DEFAULT_SAVE_EVERY)]
    save_every: usize,
    /// Restart the session every N agents
    #[arg(long, env = "RESTART_EVERY", default_value_t = DEFAULT_RESTART_EVERY)]
    restart_every: usize,
    #[arg(long, env = "WAIT_TIMEOUT_SECS", default_value_t = DEFAULT_WAIT_TIMEOUT_SECS)]
    wait_timeout_secs: u64,
    #[arg(long, default_value_t = DEFAULT_STALE_RETRIES)]
    stale_retries: u32,
    #[arg(long, default_value_t = DEFAULT_STALE_BACKOFF_MS)]
    stale_backoff_ms: u64,
    /// Random pause after each page load, <lo>..<hi> ms
    #[arg(long, default_value_t = DEFAULT_LOAD_DELAY)]
    load_delay_ms: DelayRange,
    /// Random pause between pages, <lo>..<hi> ms
    #[arg(long, default_value_t = DEFAULT_PAGE_DELAY)]
    page_delay_ms: DelayRange,
}

impl From<PartitionArgs> for PartitionConfig {
    fn from(args: PartitionArgs) -> Self {
        PartitionConfig {
            url: args.url,
            state: args.state,
            output: args.output,
            backup: args.backup,
            start_page: args.start,
            finish_page: args.finish,
        }
    }
}

impl From<Tuning> for RunOptions {
    fn from(t: Tuning) -> Self {
        RunOptions {
            save_every: t.save_every,
            restart_every: t.restart_every,
            wait_timeout_secs: t.wait_timeout_secs,
            stale_retries: t.stale_retries,
            stale_backoff_ms: t.stale_backoff_ms,
            load_delay: t.load_delay_ms,
            page_delay: t.page_delay_ms,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let start_time = Local::now();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            partition,
            tuning,
            log_dir,
        } => {
            init_tracing(&log_dir)?;
            let partition = PartitionConfig::from(partition);
            let options = RunOptions::from(tuning);

            let provider = HttpSessionProvider::new(options.wait_timeout());
            let summary = process_partition(provider, &partition, &options).await?;
            log_summary(&summary);
        }
        Commands::RunAll { config, log_dir } => {
            init_tracing(&log_dir)?;
            let run = RunFile::load(&config)?;
            info!("Running {} partitions from {}", run.partitions.len(), config.display());

            let mut first_err = None;
            for result in process_partitions(run.partitions, run.options).await {
                match result {
                    Ok(summary) => log_summary(&summary),
                    Err(e) => {
                        error!("Partition failed: {e}");
                        if first_err.is_none() {
                            first_err = Some(e);
                        }
                    }
                }
            }
            if let Some(e) = first_err {
                return Err(e);
            }
        }
        Commands::ResumeIndex { output } => {
            println!("{}", resume_index(&output));
            return Ok(());
        }
    }

    info_time!(start_time, "Full program time:");
    Ok(())
}

fn log_summary(s: &RunSummary) {
    info_span!("partition", state = %s.state).in_scope(|| {
        info!(
            "{} pages ({} skipped), {} agents (agent_{}..agent_{}), {} backups, {} session restarts",
            s.pages_total,
            s.pages_skipped,
            s.records,
            s.first_index.unwrap_or_default(),
            s.last_index.unwrap_or_default(),
            s.backup_flushes,
            s.recycles,
        )
    });
}

/// Logs to stderr, and each partition's events to its own file in `log_dir`.
/// `RUST_LOG` overrides the `info` default.
fn init_tracing(log_dir: &Path) -> Result<()> {
    let partition_files = PartitionLogFiles::new(log_dir)?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(partition_files)
        .init();
    Ok(())
}
