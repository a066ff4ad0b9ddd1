//! Drives one store's extractor against one live page until products show
//! up or the store's polling budget runs out.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tokio::sync::mpsc::UnboundedSender;
use tokio_retry::Retry;
use tokio_retry::strategy::FixedInterval;
use tracing::{debug, info, warn};

use crate::browser::PageContext;
use crate::coordinator::CoordinatorEvent;
use crate::models::{Product, SessionId, StoreId};
use crate::stores::StoreDescriptor;

/// What a browsing context sends back: exactly one per context.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeReport {
    /// `None` for reports from senders that do not track sessions.
    pub session: Option<SessionId>,
    pub store: StoreId,
    pub products: Vec<Product>,
    pub source_url: String,
}

/// Sends a store's terminal report at most once.
pub struct Reporter {
    session: SessionId,
    store: StoreId,
    events: UnboundedSender<CoordinatorEvent>,
    sent: AtomicBool,
}

impl Reporter {
    pub fn new(session: SessionId, store: StoreId, events: UnboundedSender<CoordinatorEvent>) -> Self {
        Self {
            session,
            store,
            events,
            sent: AtomicBool::new(false),
        }
    }

    /// Returns false if a report was already sent.
    pub fn send(&self, products: Vec<Product>, source_url: impl Into<String>) -> bool {
        if self.sent.swap(true, Ordering::SeqCst) {
            debug!("[{}] Report already sent, ignoring", self.store);
            return false;
        }

        let report = ScrapeReport {
            session: Some(self.session),
            store: self.store,
            products,
            source_url: source_url.into(),
        };
        if self.events.send(CoordinatorEvent::Report(report)).is_err() {
            warn!("[{}] Coordinator is gone, report dropped", self.store);
        }
        true
    }

    pub fn is_sent(&self) -> bool {
        self.sent.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrapeOutcome {
    Products(usize),
    NoResultsPage,
    Exhausted,
}

/// Why a tick did not finish the scrape.
enum Pending {
    NoCards,
    NoProducts(usize),
    Unavailable(String),
}

impl std::fmt::Display for Pending {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Pending::NoCards => write!(f, "no product cards"),
            Pending::NoProducts(cards) => write!(f, "{} cards without name and price", cards),
            Pending::Unavailable(reason) => write!(f, "page unreadable: {}", reason),
        }
    }
}

enum Ready {
    Products { products: Vec<Product>, url: String },
    NoResultsPage { url: String },
}

pub struct ScrapeRunner {
    store: Arc<StoreDescriptor>,
    page: Arc<dyn PageContext>,
    search_url: String,
    reporter: Reporter,
}

impl ScrapeRunner {
    pub fn new(store: Arc<StoreDescriptor>, page: Arc<dyn PageContext>, search_url: String, reporter: Reporter) -> Self {
        Self {
            store,
            page,
            search_url,
            reporter,
        }
    }

    pub async fn run(self) -> ScrapeOutcome {
        let policy = self.store.polling;
        let retries = policy.max_attempts.saturating_sub(1) as usize;
        let strategy = FixedInterval::new(policy.interval).take(retries);
        let attempts = AtomicU32::new(0);

        let result = Retry::start(strategy, || self.tick(&attempts)).await;

        match result {
            Ok(Ready::Products { products, url }) => {
                let count = products.len();
                info!(
                    "[{}] Found {} products after {} attempt(s)",
                    self.store.display_name,
                    count,
                    attempts.load(Ordering::SeqCst)
                );
                self.reporter.send(products, url);
                ScrapeOutcome::Products(count)
            }
            Ok(Ready::NoResultsPage { url }) => {
                info!("[{}] Store reported no results for this search", self.store.display_name);
                self.reporter.send(Vec::new(), url);
                ScrapeOutcome::NoResultsPage
            }
            Err(last) => {
                warn!(
                    "[{}] No products after {} attempts, last: {}",
                    self.store.display_name, policy.max_attempts, last
                );
                let url = self.current_url().await;
                self.reporter.send(Vec::new(), url);
                ScrapeOutcome::Exhausted
            }
        }
    }

    async fn tick(&self, attempts: &AtomicU32) -> Result<Ready, Pending> {
        let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;

        let url = self.current_url().await;
        if self.store.is_no_results_page(&url) {
            return Ok(Ready::NoResultsPage { url });
        }

        let html = match self.page.content().await {
            Ok(html) => html,
            Err(e) => {
                debug!("[{}] Attempt {}: page not readable: {}", self.store.display_name, attempt, e);
                return Err(Pending::Unavailable(e.to_string()));
            }
        };

        // Reading the page may have followed a redirect.
        let url = self.current_url().await;
        if self.store.is_no_results_page(&url) {
            return Ok(Ready::NoResultsPage { url });
        }

        let scan = self.store.extractor.scan(&html, &url);
        if scan.cards == 0 {
            debug!("[{}] Attempt {}: no product cards yet", self.store.display_name, attempt);
            return Err(Pending::NoCards);
        }
        if scan.products.is_empty() {
            debug!(
                "[{}] Attempt {}: {} cards but none complete",
                self.store.display_name, attempt, scan.cards
            );
            return Err(Pending::NoProducts(scan.cards));
        }

        Ok(Ready::Products {
            products: scan.products,
            url,
        })
    }

    async fn current_url(&self) -> String {
        match self.page.current_url().await {
            Ok(url) if !url.is_empty() => url,
            _ => self.search_url.clone(),
        }
    }
}
