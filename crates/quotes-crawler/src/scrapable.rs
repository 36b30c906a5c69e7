use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use url::Url;

pub trait Scrapable {
    type Config: Clone + Send + 'static;

    /// Identifies the parsing logic a fetched page is handed to.
    type Handler: Copy + fmt::Debug + Send + 'static;

    fn new(config: &Self::Config) -> anyhow::Result<Self>
    where
        Self: Sized;

    fn seed(&self) -> Vec<Request<Self::Handler>>;

    fn scrap(&mut self, page: String, ctx: ScrapingContext<Self::Handler>) -> anyhow::Result<()>;

    fn finalizer(&mut self) {}
}

/// A URL to fetch, together with the handler that will parse it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request<H> {
    pub url: Url,
    pub handler: H,
}

impl<H> Request<H> {
    pub fn new(url: Url, handler: H) -> Self {
        Self { url, handler }
    }
}

#[derive(Debug)]
struct Frontier {
    dedup: bool,
    page_limit: Option<usize>,
    seen: Mutex<HashSet<String>>,
    scheduled: AtomicUsize,
}

/// Sending half of the crawler's work queue.
///
/// Every accepted request increments `pages_in`, which the crawler compares
/// against the number of processed pages to detect the end of the crawl.
#[derive(Debug)]
pub struct Scheduler<H> {
    tx: mpsc::UnboundedSender<Request<H>>,
    pages_in: Arc<AtomicUsize>,
    frontier: Arc<Frontier>,
}

impl<H> Clone for Scheduler<H> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            pages_in: self.pages_in.clone(),
            frontier: self.frontier.clone(),
        }
    }
}

impl<H: fmt::Debug> Scheduler<H> {
    pub fn new(
        tx: mpsc::UnboundedSender<Request<H>>,
        pages_in: Arc<AtomicUsize>,
        dedup: bool,
        page_limit: Option<usize>,
    ) -> Self {
        Self {
            tx,
            pages_in,
            frontier: Arc::new(Frontier {
                dedup,
                page_limit,
                seen: Mutex::new(HashSet::new()),
                scheduled: AtomicUsize::new(0),
            }),
        }
    }

    /// Enqueues `request` unless it was already seen or the page limit is reached.
    pub fn schedule(&self, request: Request<H>) -> bool {
        if self.frontier.dedup {
            let mut seen = match self.frontier.seen.lock() {
                Ok(seen) => seen,
                Err(poisoned) => poisoned.into_inner(),
            };
            let mut key = request.url.clone();
            key.set_fragment(None);
            if !seen.insert(key.to_string()) {
                log::debug!("Filtered duplicate request {}", request.url);
                return false;
            }
        }

        if let Some(limit) = self.frontier.page_limit {
            let reserved = self
                .frontier
                .scheduled
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                    (n < limit).then_some(n + 1)
                });
            if reserved.is_err() {
                log::debug!("Page limit {limit} reached, dropping {}", request.url);
                return false;
            }
        }

        self.pages_in.fetch_add(1, Ordering::SeqCst);
        match self.tx.send(request) {
            Ok(()) => true,
            Err(e) => {
                self.pages_in.fetch_sub(1, Ordering::SeqCst);
                log::error!("Couldn't schedule request: {:?}", e.0);
                false
            }
        }
    }
}

/// What a scraper knows about the page it is currently processing.
#[derive(Debug)]
pub struct ScrapingContext<H> {
    url: Url,
    handler: H,
    scheduler: Option<Scheduler<H>>,
}

impl<H: Copy + fmt::Debug> ScrapingContext<H> {
    pub fn new(url: Url, handler: H, scheduler: Scheduler<H>) -> Self {
        Self {
            url,
            handler,
            scheduler: Some(scheduler),
        }
    }

    /// A context for a page scraped outside of a crawl, follow-up requests are dropped.
    pub fn detached(url: Url, handler: H) -> Self {
        Self {
            url,
            handler,
            scheduler: None,
        }
    }

    /// Final URL of the page, after redirects.
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn handler(&self) -> H {
        self.handler
    }

    pub fn send_request(&self, request: Request<H>) -> bool {
        match &self.scheduler {
            Some(scheduler) => scheduler.schedule(request),
            None => {
                log::debug!("Not crawling, dropping request {}", request.url);
                false
            }
        }
    }
}
