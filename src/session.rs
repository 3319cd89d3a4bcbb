//! The narrow view of a rendering engine the scraper works against.
//!
//! A [`Session`] loads one page at a time and hands out [`Element`] handles;
//! a [`SessionProvider`] knows how to start fresh sessions. [`SessionManager`]
//! owns the single live session of a partition run and is the only place
//! where sessions are created, recycled and torn down.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::Result;

/// A handle to an element of a rendered page.
///
/// Handles are owned values so they stay usable after the page that produced them
/// is gone; that is what lets a test double hand out canned cards.
pub trait Element: Sized + Send + Sync {
    /// First descendant matching `selector`, if any.
    fn find(&self, selector: &str) -> Result<Option<Self>>;

    /// All descendants matching `selector`, in document order.
    fn find_all(&self, selector: &str) -> Result<Vec<Self>>;

    /// Direct element children.
    fn children(&self) -> Vec<Self>;

    /// Visible text, one line per text node, trimmed.
    fn text(&self) -> String;
}

#[async_trait]
pub trait Session: Send + Sync + Sized {
    type Element: Element;

    /// Navigates to `url`. Fails with `Error::LoadFailed`.
    async fn load(&mut self, url: &str) -> Result<()>;

    /// Blocks until `selector` is present in the current page, or fails with
    /// `Error::Timeout` once `timeout` has elapsed.
    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<()>;

    /// Locates `scope`, then the outermost elements matching `selector` inside it.
    /// Fails with `Error::StaleReference` if the scope is gone.
    async fn find_many(&self, scope: &str, selector: &str) -> Result<Vec<Self::Element>>;

    /// Tears the session down.
    async fn quit(self) -> Result<()>;
}

#[async_trait]
pub trait SessionProvider: Send + Sync {
    type Session: Session;

    /// Starts a new session. A failure here is fatal for the run.
    async fn start(&self) -> Result<Self::Session>;
}

/// Owns at most one live session at a time.
pub struct SessionManager<P: SessionProvider> {
    provider: P,
    session: Option<P::Session>,
    recycles: usize,
}

impl<P: SessionProvider> SessionManager<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            session: None,
            recycles: 0,
        }
    }

    /// Returns the live session, starting one if there is none.
    pub async fn acquire(&mut self) -> Result<&mut P::Session> {
        let session = match self.session.take() {
            Some(session) => session,
            None => self.provider.start().await?,
        };
        Ok(self.session.insert(session))
    }

    /// Tears down the live session (if any) and starts a new one unconditionally.
    pub async fn recycle(&mut self) -> Result<()> {
        info!("Restarting session to clear memory...");
        self.shutdown().await;
        self.session = Some(self.provider.start().await?);
        self.recycles += 1;
        Ok(())
    }

    /// Tears down the live session and returns how many times it was recycled.
    pub async fn release(mut self) -> usize {
        self.shutdown().await;
        self.recycles
    }

    async fn shutdown(&mut self) {
        if let Some(session) = self.session.take() {
            if let Err(e) = session.quit().await {
                warn!("Failed to shut the session down cleanly: {e}");
            }
        }
    }
}
