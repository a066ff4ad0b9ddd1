// Integration tests for shelfscan
// These drive the coordinator, runners and extractors together through a
// scripted browser instead of live storefronts.

pub mod api_tests;
pub mod search_flow_tests;

use async_trait::async_trait;
use shelfscan::browser::{Browser, PageContext};
use shelfscan::config::SearchConfig;
use shelfscan::coordinator::{self, CoordinatorHandle};
use shelfscan::results_view::ResultsView;
use shelfscan::{SharedState, StoreRegistry};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

pub const KROGER_PAGE: &str = r#"
    <div class="ProductCard">
        <span class="kds-Text--l" data-testid="cart-page-item-description">Kroger 2% Reduced Fat Milk</span>
        <mark class="kds-Price-promotional"><data data-qa="cart-page-item-price" value="3.29"></data></mark>
    </div>"#;

pub const MEIJER_PAGE: &str = r#"
    <div class="product-tile">
        <h3 class="ads-type-heading-07">Meijer 2% Milk, Gallon</h3>
        <div class="product-tile__regular-price">
            <span class="product-tile__regular-price-text">$2.79</span>
        </div>
    </div>"#;

pub const ALDI_PAGE: &str = r#"
    <div class="product-tile">
        <div class="product-tile__name"><p>Friendly Farms 2% Milk</p></div>
        <div class="product-tile__price">$2.65</div>
    </div>"#;

pub const WALMART_PAGE: &str = r#"
    <div data-item-id="10450114">
        <span data-automation-id="product-title">Great Value 2% Milk, 1 Gallon</span>
        <div data-automation-id="product-price"><span class="w_iUH7">current price $3.12</span></div>
        <span data-testid="badgeTagComponent">Rollback</span>
    </div>"#;

pub const COSTCO_PAGE: &str = r#"
    <div data-testid="ProductTile_100">
        <h3 data-testid="Text_ProductTile_100_title">Kirkland Signature Organic Milk, 3-pack</h3>
        <div data-testid="Text_Price_100">$12.99</div>
    </div>"#;

/// A page that returns its snapshots in order, repeating the last one.
pub struct ScriptedPage {
    url: String,
    snapshots: Vec<String>,
    reads: AtomicUsize,
    closed: AtomicBool,
}

impl ScriptedPage {
    pub fn new(url: &str, snapshots: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            url: url.to_string(),
            snapshots: snapshots.iter().map(|s| s.to_string()).collect(),
            reads: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        })
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageContext for ScriptedPage {
    async fn current_url(&self) -> shelfscan::Result<String> {
        Ok(self.url.clone())
    }

    async fn content(&self) -> shelfscan::Result<String> {
        let read = self.reads.fetch_add(1, Ordering::SeqCst);
        let index = read.min(self.snapshots.len().saturating_sub(1));
        Ok(self.snapshots.get(index).cloned().unwrap_or_default())
    }

    async fn close(&self) -> shelfscan::Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Serves scripted pages by URL fragment. Anything else gets a page that
/// never shows a product card.
#[derive(Default)]
pub struct ScriptedBrowser {
    pages: Mutex<Vec<(String, Arc<ScriptedPage>)>>,
    opened: Mutex<Vec<String>>,
}

impl ScriptedBrowser {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn serve(&self, fragment: &str, page: Arc<ScriptedPage>) {
        self.pages.lock().unwrap().push((fragment.to_string(), page));
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }

    /// Every store serving its fixture on the first read.
    pub fn with_all_stores() -> Arc<Self> {
        let browser = Self::new();
        browser.serve("kroger.com", ScriptedPage::new("https://www.kroger.com/search?query=milk", &[KROGER_PAGE]));
        browser.serve("meijer.com", ScriptedPage::new("https://www.meijer.com/shopping/search.html?text=milk", &[MEIJER_PAGE]));
        browser.serve("aldi.us", ScriptedPage::new("https://www.aldi.us/results?q=milk", &[ALDI_PAGE]));
        browser.serve("walmart.com", ScriptedPage::new("https://www.walmart.com/search?q=milk", &[WALMART_PAGE]));
        browser.serve("costco.com", ScriptedPage::new("https://www.costco.com/s?keyword=milk", &[COSTCO_PAGE]));
        browser
    }
}

#[async_trait]
impl Browser for ScriptedBrowser {
    async fn open(&self, url: &str) -> shelfscan::Result<Arc<dyn PageContext>> {
        self.opened.lock().unwrap().push(url.to_string());
        let page = self
            .pages
            .lock()
            .unwrap()
            .iter()
            .find(|(fragment, _)| url.contains(fragment.as_str()))
            .map(|(_, page)| page.clone())
            .unwrap_or_else(|| ScriptedPage::new(url, &["<html><body></body></html>"]));
        Ok(page as Arc<dyn PageContext>)
    }
}

/// Counts how often a results view was opened.
#[derive(Default)]
pub struct CountingView {
    pub opened: Mutex<Vec<String>>,
}

impl ResultsView for CountingView {
    fn open(&self, term: &str) {
        self.opened.lock().unwrap().push(term.to_string());
    }
}

pub struct TestCoordinator {
    pub handle: CoordinatorHandle,
    pub task: JoinHandle<()>,
    pub state: SharedState,
    pub view: Arc<CountingView>,
}

/// Spawn a coordinator over in-memory state with the default deadline.
pub fn start_coordinator(browser: Arc<ScriptedBrowser>) -> TestCoordinator {
    start_coordinator_with_state(browser, SharedState::in_memory())
}

pub fn start_coordinator_with_state(browser: Arc<ScriptedBrowser>, state: SharedState) -> TestCoordinator {
    let view = Arc::new(CountingView::default());
    let (handle, task) = coordinator::spawn(
        StoreRegistry::new().unwrap(),
        browser,
        state.clone(),
        view.clone(),
        &SearchConfig::default(),
    );
    TestCoordinator {
        handle,
        task,
        state,
        view,
    }
}
