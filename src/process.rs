use chrono::Local;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::checkpoint::resume_index;
use crate::config::{PartitionConfig, RunOptions};
use crate::extract::{RecordExtractor, CARD_SELECTOR, CONTAINER_SELECTOR};
use crate::persist::Persister;
use crate::record::Record;
use crate::request::HttpSessionProvider;
use crate::session::{Session, SessionManager, SessionProvider};
use crate::throttle::RateLimiter;
use crate::{info_time, Error, Result};

type CardOf<P> = <<P as SessionProvider>::Session as Session>::Element;

/// What a partition run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub state: String,
    pub pages_total: usize,
    pub pages_skipped: usize,
    pub records: usize,
    /// Agent index of the first record written by this run.
    pub first_index: Option<u64>,
    pub last_index: Option<u64>,
    pub recycles: usize,
    pub backup_flushes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageOutcome {
    Scraped(usize),
    Skipped,
}

/// Scrapes every partition over HTTP. See [`process_partitions_with`].
pub async fn process_partitions(
    partitions: Vec<PartitionConfig>,
    options: RunOptions,
) -> Vec<Result<RunSummary>> {
    let provider = HttpSessionProvider::new(options.wait_timeout());
    process_partitions_with(provider, partitions, options).await
}

/// Scrapes partitions concurrently, each with its own sessions. Partitions that
/// write the same output file continue one numbering, so they run one after the
/// other in the order given. Results come back in completion order.
pub async fn process_partitions_with<P>(
    provider: P,
    partitions: Vec<PartitionConfig>,
    options: RunOptions,
) -> Vec<Result<RunSummary>>
where
    P: SessionProvider + Clone + 'static,
{
    let mut groups: Vec<Vec<PartitionConfig>> = Vec::new();
    for partition in partitions {
        match groups.iter_mut().find(|g| g[0].output == partition.output) {
            Some(group) => group.push(partition),
            None => groups.push(vec![partition]),
        }
    }

    let mut tasks = JoinSet::new();
    for group in groups {
        let (provider, options) = (provider.clone(), options.clone());
        tasks.spawn(async move {
            let mut results = Vec::with_capacity(group.len());
            for partition in &group {
                results.push(process_partition(provider.clone(), partition, &options).await);
            }
            results
        });
    }

    let mut results = Vec::new();
    while let Some(task) = tasks.join_next().await {
        match task {
            Ok(group) => results.extend(group),
            Err(e) => results.push(Err(Error::from(e))),
        }
    }
    results
}

/// Scrapes one partition's page range, resuming numbering after whatever is
/// already in its output file.
///
/// Page-level faults only skip the page. The only error returned is a session that
/// couldn't be started (or a final write that failed); whatever was collected up to
/// that point is written to the output file first.
pub async fn process_partition<P: SessionProvider>(
    provider: P,
    partition: &PartitionConfig,
    options: &RunOptions,
) -> Result<RunSummary> {
    partition.validate()?;
    options.validate()?;

    let span = info_span!("partition", state = %partition.state);
    Paginator::new(provider, partition, options)
        .run()
        .instrument(span)
        .await
}

struct Paginator<'a, P: SessionProvider> {
    partition: &'a PartitionConfig,
    options: &'a RunOptions,
    sessions: SessionManager<P>,
    extractor: RecordExtractor<CardOf<P>>,
    persister: Persister,
    limiter: RateLimiter,
    summary: RunSummary,
}

impl<'a, P: SessionProvider> Paginator<'a, P> {
    fn new(provider: P, partition: &'a PartitionConfig, options: &'a RunOptions) -> Self {
        Self {
            partition,
            options,
            sessions: SessionManager::new(provider),
            extractor: RecordExtractor::new(partition.state.clone()),
            persister: Persister::new(&partition.output, &partition.backup, options.save_every),
            limiter: options.rate_limiter(),
            summary: RunSummary {
                state: partition.state.clone(),
                ..RunSummary::default()
            },
        }
    }

    async fn run(mut self) -> Result<RunSummary> {
        let start_time = Local::now();
        let (start, finish) = (self.partition.start_page, self.partition.finish_page);
        info!("Start scrapping: Pages: {start}-{finish}");

        let resume = resume_index(&self.partition.output);
        let mut buffer = Vec::new();
        let scraped = self.scrape_pages(resume, &mut buffer).await;

        // Whatever made it into the buffer gets written, even after a fatal error.
        let saved = self.persister.write_final(&buffer);
        self.summary.backup_flushes = self.persister.flushes();
        self.summary.recycles = self.sessions.release().await;
        self.summary.records = buffer.len();
        if !buffer.is_empty() {
            self.summary.first_index = Some(resume + 1);
            self.summary.last_index = Some(resume + buffer.len() as u64);
        }

        if let Err(e) = &scraped {
            error!("Run aborted after {} agents: {e}", buffer.len());
        }
        let last = scraped?;
        saved?;
        self.summary.last_index = (last > resume).then_some(last);

        info_time!(
            start_time,
            "Done! {}: Pages: {}-{} Agents: {} Data saved into {}",
            self.partition.state,
            start,
            finish,
            buffer.len(),
            self.partition.output.display()
        );
        Ok(self.summary)
    }

    /// Walks the page range in order. Returns the last agent index handed out.
    async fn scrape_pages(&mut self, mut index: u64, buffer: &mut Vec<Record>) -> Result<u64> {
        // A session that can't start at all is fatal; find out before the first page.
        self.sessions.acquire().await?;

        for page in self.partition.pages() {
            info!("Scraping page {page}");
            self.summary.pages_total += 1;

            let (next, outcome) = self.process_page(page, index, buffer).await?;
            index = next;
            match outcome {
                PageOutcome::Scraped(cards) => debug!("Page {page}: {cards} agents"),
                PageOutcome::Skipped => self.summary.pages_skipped += 1,
            }

            self.limiter.after_page().await;
        }
        Ok(index)
    }

    /// Loads one page and turns its cards into records. Takes the running agent
    /// index and returns it advanced by the number of cards.
    async fn process_page(
        &mut self,
        page: u32,
        mut index: u64,
        buffer: &mut Vec<Record>,
    ) -> Result<(u64, PageOutcome)> {
        let Some(cards) = self.collect_cards(page, index).await? else {
            return Ok((index, PageOutcome::Skipped));
        };

        for card in &cards {
            index += 1;
            buffer.push(self.extractor.extract(card, page, index));

            if let Err(e) = self.persister.flush_check(buffer) {
                error!("Failed to save backup after agent_{index}: {e}");
            }
            if buffer.len() % self.options.restart_every == 0 {
                self.sessions.recycle().await?;
            }
        }

        Ok((index, PageOutcome::Scraped(cards.len())))
    }

    /// The cards of `page`, or `None` if the page has to be skipped.
    async fn collect_cards(&mut self, page: u32, index: u64) -> Result<Option<Vec<CardOf<P>>>> {
        let url = self.partition.page_url(page);
        let timeout = self.options.wait_timeout();
        let session = self.sessions.acquire().await?;

        let loaded = session.load(&url).await;
        self.limiter.after_load().await;
        let ready = match loaded {
            Ok(()) => session.wait_for(CONTAINER_SELECTOR, timeout).await,
            Err(e) => Err(e),
        };
        if let Err(e) = ready {
            error!("Failed on page {page}: {e}");
            return Ok(None);
        }

        let attempts = self.options.stale_retries.max(1);
        let mut attempt = 1;
        let cards = loop {
            match session.find_many(CONTAINER_SELECTOR, CARD_SELECTOR).await {
                Ok(cards) => break cards,
                Err(Error::StaleReference(reason)) if attempt < attempts => {
                    warn!("Page {page} Agent agent_{index}: Retrying due to stale element ({reason})...");
                    attempt += 1;
                    sleep(self.options.stale_backoff()).await;
                }
                Err(Error::StaleReference(reason)) => {
                    error!("Page {page} contains 0 agent cards: still stale after {attempts} attempts ({reason})");
                    return Ok(None);
                }
                Err(e) => {
                    error!("Failed on page {page}: {e}");
                    return Ok(None);
                }
            }
        };

        if cards.is_empty() {
            error!("Page {page} contains 0 agent cards.");
            return Ok(None);
        }
        Ok(Some(cards))
    }
}
