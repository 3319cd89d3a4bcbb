use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::Client;
use tokio::task::spawn_blocking;
use tokio::time::{sleep, Instant};

use crate::parse::{contains, outermost_in_scope, Fragment};
use crate::session::{Session, SessionProvider};
use crate::{Error, Result};

const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
/// How long to wait between re-fetches while a page isn't ready yet.
const READY_POLL: Duration = Duration::from_millis(500);

/// Starts [`HttpSession`]s: a fresh `reqwest::Client` (and connection pool) each time.
#[derive(Debug, Clone)]
pub struct HttpSessionProvider {
    request_timeout: Duration,
}

impl HttpSessionProvider {
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }
}

#[async_trait]
impl SessionProvider for HttpSessionProvider {
    type Session = HttpSession;

    async fn start(&self) -> Result<HttpSession> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_UA));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let client = Client::builder()
            .timeout(self.request_timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| Error::SessionStart(e.to_string()))?;

        Ok(HttpSession {
            client,
            current_url: None,
            page_source: String::new(),
        })
    }
}

/// A session that "renders" a page by fetching its HTML.
pub struct HttpSession {
    client: Client,
    current_url: Option<String>,
    page_source: String,
}

impl HttpSession {
    /// Requests a page and returns its HTML.
    async fn request_page_html(&self, url: &str) -> Result<String> {
        let load_failed = |reason: String| Error::LoadFailed {
            url: url.to_string(),
            reason,
        };

        let res = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| load_failed(e.to_string()))?;
        if !res.status().is_success() {
            return Err(load_failed(format!("status {}", res.status())));
        }
        res.text().await.map_err(|e| load_failed(e.to_string()))
    }
}

#[async_trait]
impl Session for HttpSession {
    type Element = Fragment;

    async fn load(&mut self, url: &str) -> Result<()> {
        // Forget the previous page first so a failed load can't be mistaken for it.
        self.current_url = None;
        self.page_source.clear();

        self.page_source = self.request_page_html(url).await?;
        self.current_url = Some(url.to_string());
        Ok(())
    }

    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let timed_out = || Error::Timeout {
            selector: selector.to_string(),
            after: timeout,
        };

        loop {
            let found = spawn_blocking({
                let source = self.page_source.clone();
                let selector = selector.to_string();
                move || contains(&source, &selector)
            })
            .await??;
            if found {
                return Ok(());
            }
            if Instant::now() + READY_POLL >= deadline {
                return Err(timed_out());
            }
            sleep(READY_POLL).await;

            let Some(url) = self.current_url.clone() else {
                return Err(timed_out());
            };
            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, self.request_page_html(&url)).await {
                Ok(Ok(html)) => self.page_source = html,
                // A failed re-fetch keeps the last good source; the deadline still applies.
                Ok(Err(_)) => {}
                Err(_) => return Err(timed_out()),
            }
        }
    }

    async fn find_many(&self, scope: &str, selector: &str) -> Result<Vec<Fragment>> {
        let found = spawn_blocking({
            let source = self.page_source.clone();
            let (scope, selector) = (scope.to_string(), selector.to_string());
            move || outermost_in_scope(&source, &scope, &selector)
        })
        .await??;
        found.ok_or_else(|| Error::StaleReference(format!("{scope} is no longer in the page")))
    }

    async fn quit(self) -> Result<()> {
        drop(self.client);
        Ok(())
    }
}
