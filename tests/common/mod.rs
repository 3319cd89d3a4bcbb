#![allow(dead_code)]

use std::collections::HashMap;
use std::fmt::Debug;
use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agent_scrap::session::{Element, Session, SessionProvider};
use agent_scrap::throttle::DelayRange;
use agent_scrap::{Error, PartitionConfig, Record, Result, RunOptions, OUTPUT_DELIMITER};
use async_trait::async_trait;
use tracing::field::{Field, Visit};
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

pub const URL: &str = "https://listing.test/agents?page={page}";

pub fn page_url(page: u32) -> String {
    URL.replace("{page}", &page.to_string())
}

/// A card made of canned answers: selector -> element, no HTML involved.
#[derive(Debug, Clone, Default)]
pub struct CannedCard {
    text: String,
    found: Vec<(String, CannedCard)>,
    children: Vec<CannedCard>,
}

impl CannedCard {
    pub fn text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            ..Self::default()
        }
    }

    pub fn with(mut self, selector: &str, el: CannedCard) -> Self {
        self.found.push((selector.to_string(), el));
        self
    }

    /// A listing card with a name and (optionally) a phone.
    pub fn agent(name: &str, phone: Option<&str>) -> Self {
        let card = CannedCard::default()
            .with(".qa-flh-resource-name", CannedCard::text(name))
            .with(".ds-u-font-size--md", CannedCard::text("3 years\non the marketplace"))
            .with(".ds-c-badge", CannedCard::text("Elite"));
        match phone {
            Some(phone) => card.with(".qa-flh-resource-phone", CannedCard::text(phone)),
            None => card,
        }
    }
}

impl Element for CannedCard {
    fn find(&self, selector: &str) -> Result<Option<Self>> {
        Ok(self
            .found
            .iter()
            .find(|(s, _)| s == selector)
            .map(|(_, el)| el.clone()))
    }

    fn find_all(&self, selector: &str) -> Result<Vec<Self>> {
        Ok(self
            .found
            .iter()
            .filter(|(s, _)| s == selector)
            .map(|(_, el)| el.clone())
            .collect())
    }

    fn children(&self) -> Vec<Self> {
        self.children.clone()
    }

    fn text(&self) -> String {
        self.text.clone()
    }
}

pub fn agents(prefix: &str, n: usize) -> Vec<CannedCard> {
    (1..=n)
        .map(|i| CannedCard::agent(&format!("{prefix} {i}"), Some("555-0100")))
        .collect()
}

#[derive(Debug, Clone)]
pub enum ScriptedPage {
    Cards(Vec<CannedCard>),
    LoadFails,
    NeverReady,
    /// `find_many` reports a stale container `faults` times before answering.
    Stale { faults: u32, cards: Vec<CannedCard> },
}

/// Hands out sessions that serve scripted pages. Counts how many sessions were
/// started and can refuse to start more than `max_starts`.
#[derive(Clone, Default)]
pub struct ScriptedProvider {
    pages: Arc<HashMap<String, ScriptedPage>>,
    starts: Arc<AtomicUsize>,
    max_starts: Option<usize>,
}

impl ScriptedProvider {
    pub fn new(pages: impl IntoIterator<Item = (u32, ScriptedPage)>) -> Self {
        let pages = pages
            .into_iter()
            .map(|(page, script)| (page_url(page), script))
            .collect();
        Self {
            pages: Arc::new(pages),
            ..Self::default()
        }
    }

    pub fn max_starts(mut self, max: usize) -> Self {
        self.max_starts = Some(max);
        self
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionProvider for ScriptedProvider {
    type Session = ScriptedSession;

    async fn start(&self) -> Result<ScriptedSession> {
        let n = self.starts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.max_starts.is_some_and(|max| n > max) {
            return Err(Error::SessionStart(format!("session #{n} refused")));
        }
        Ok(ScriptedSession {
            pages: Arc::clone(&self.pages),
            current: None,
            stale_left: AtomicU32::new(0),
        })
    }
}

pub struct ScriptedSession {
    pages: Arc<HashMap<String, ScriptedPage>>,
    current: Option<ScriptedPage>,
    stale_left: AtomicU32,
}

#[async_trait]
impl Session for ScriptedSession {
    type Element = CannedCard;

    async fn load(&mut self, url: &str) -> Result<()> {
        self.current = None;
        let load_failed = || Error::LoadFailed {
            url: url.to_string(),
            reason: "scripted".into(),
        };
        match self.pages.get(url) {
            None | Some(ScriptedPage::LoadFails) => Err(load_failed()),
            Some(page) => {
                let faults = match page {
                    ScriptedPage::Stale { faults, .. } => *faults,
                    _ => 0,
                };
                self.stale_left.store(faults, Ordering::SeqCst);
                self.current = Some(page.clone());
                Ok(())
            }
        }
    }

    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<()> {
        match &self.current {
            Some(ScriptedPage::NeverReady) | None => Err(Error::Timeout {
                selector: selector.to_string(),
                after: timeout,
            }),
            Some(_) => Ok(()),
        }
    }

    async fn find_many(&self, scope: &str, _selector: &str) -> Result<Vec<CannedCard>> {
        let stale = || Error::StaleReference(format!("{scope} went stale"));
        match &self.current {
            Some(ScriptedPage::Cards(cards)) => Ok(cards.clone()),
            Some(ScriptedPage::Stale { cards, .. }) => {
                let left = self.stale_left.load(Ordering::SeqCst);
                if left > 0 {
                    self.stale_left.store(left - 1, Ordering::SeqCst);
                    Err(stale())
                } else {
                    Ok(cards.clone())
                }
            }
            _ => Err(stale()),
        }
    }

    async fn quit(self) -> Result<()> {
        Ok(())
    }
}

pub fn partition(dir: &Path, start: u32, finish: u32) -> PartitionConfig {
    PartitionConfig {
        url: URL.to_string(),
        state: "Ohio".to_string(),
        output: dir.join("ohio.csv"),
        backup: dir.join("ohio_backup.csv"),
        start_page: start,
        finish_page: finish,
    }
}

/// Default options without any waiting.
pub fn fast_options() -> RunOptions {
    RunOptions {
        stale_backoff_ms: 0,
        load_delay: DelayRange::none(),
        page_delay: DelayRange::none(),
        ..RunOptions::default()
    }
}

pub fn read_records(path: &Path) -> Vec<Record> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(OUTPUT_DELIMITER)
        .from_path(path)
        .unwrap();
    rdr.deserialize().map(|r| r.unwrap()).collect()
}

pub fn indices(records: &[Record]) -> Vec<u64> {
    records
        .iter()
        .map(|r| r.agent_index.trim_start_matches("agent_").parse().unwrap())
        .collect()
}

/// Every event emitted while the guard is alive, as (level, message).
#[derive(Clone, Default)]
pub struct Events(Arc<Mutex<Vec<(Level, String)>>>);

impl Events {
    pub fn capture() -> (Self, DefaultGuard) {
        let events = Events::default();
        let guard = tracing_subscriber::registry()
            .with(events.clone())
            .set_default();
        (events, guard)
    }

    pub fn at(&self, level: Level) -> Vec<String> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, msg)| msg.clone())
            .collect()
    }
}

impl<S: Subscriber> Layer<S> for Events {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut message = Message::default();
        event.record(&mut message);
        self.0
            .lock()
            .unwrap()
            .push((*event.metadata().level(), message.0));
    }
}

#[derive(Default)]
struct Message(String);

impl Visit for Message {
    fn record_debug(&mut self, field: &Field, value: &dyn Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }
}
