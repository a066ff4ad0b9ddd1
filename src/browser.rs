//! Browsing contexts: something that can load a store's search page and
//! hand back its current DOM as HTML.

use async_trait::async_trait;
use headless_chrome::{LaunchOptions, Tab};
use std::ffi::OsStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use url::Url;

use crate::config::{BrowserBackend, BrowserConfig};
use crate::utils::error::{AppError, Result};

/// Opens browsing contexts.
#[async_trait]
pub trait Browser: Send + Sync {
    async fn open(&self, url: &str) -> Result<Arc<dyn PageContext>>;
}

/// One live page. Content is re-read on every call so pages that render
/// client-side can be polled.
#[async_trait]
pub trait PageContext: Send + Sync {
    async fn current_url(&self) -> Result<String>;
    async fn content(&self) -> Result<String>;
    async fn close(&self) -> Result<()>;
}

pub fn from_config(config: &BrowserConfig) -> Result<Arc<dyn Browser>> {
    Ok(match config.backend {
        BrowserBackend::Chrome => Arc::new(ChromeBrowser::launch(config)?),
        BrowserBackend::Http => Arc::new(HttpBrowser::new(config)?),
    })
}

fn browser_error(context: &str, e: impl std::fmt::Display) -> AppError {
    AppError::Browser(format!("{}: {}", context, e))
}

pub struct ChromeBrowser {
    browser: Arc<headless_chrome::Browser>,
    user_agent: String,
}

impl ChromeBrowser {
    pub fn launch(config: &BrowserConfig) -> Result<Self> {
        let mut launch_options = LaunchOptions::default_builder()
            .headless(config.headless)
            .sandbox(false)
            .idle_browser_timeout(Duration::from_secs(3600))
            .args(vec![
                OsStr::new("--no-sandbox"),
                OsStr::new("--disable-dev-shm-usage"),
                OsStr::new("--disable-gpu"),
                OsStr::new("--disable-extensions"),
                // Background tabs must keep rendering while they are polled
                OsStr::new("--disable-background-timer-throttling"),
                OsStr::new("--disable-backgrounding-occluded-windows"),
                OsStr::new("--disable-renderer-backgrounding"),
            ])
            .build()
            .map_err(|e| browser_error("Failed to create launch options", e))?;

        if let Some(chrome_path) = &config.chrome_path {
            launch_options.path = Some(std::path::PathBuf::from(chrome_path));
        }

        let browser =
            headless_chrome::Browser::new(launch_options).map_err(|e| browser_error("Failed to launch browser", e))?;

        Ok(Self {
            browser: Arc::new(browser),
            user_agent: config.user_agent.clone(),
        })
    }
}

#[async_trait]
impl Browser for ChromeBrowser {
    async fn open(&self, url: &str) -> Result<Arc<dyn PageContext>> {
        let browser = Arc::clone(&self.browser);
        let user_agent = self.user_agent.clone();
        let url = url.to_string();

        let tab = tokio::task::spawn_blocking(move || -> Result<Arc<Tab>> {
            let tab = browser.new_tab().map_err(|e| browser_error("Failed to create tab", e))?;
            tab.set_user_agent(&user_agent, None, None)
                .map_err(|e| browser_error("Failed to set user agent", e))?;
            tab.navigate_to(&url)
                .map_err(|e| browser_error(&format!("Navigation to {} failed", url), e))?;

            // Slow pages are still polled; the scrape runner decides readiness.
            if let Err(e) = tab.wait_until_navigated() {
                warn!("Page load did not settle for {}: {}", url, e);
            }
            Ok(tab)
        })
        .await
        .map_err(|e| AppError::Internal(format!("Tab task failed: {}", e)))??;

        Ok(Arc::new(ChromePage { tab }))
    }
}

struct ChromePage {
    tab: Arc<Tab>,
}

#[async_trait]
impl PageContext for ChromePage {
    async fn current_url(&self) -> Result<String> {
        Ok(self.tab.get_url())
    }

    async fn content(&self) -> Result<String> {
        let tab = Arc::clone(&self.tab);
        tokio::task::spawn_blocking(move || tab.get_content())
            .await
            .map_err(|e| AppError::Internal(format!("Content task failed: {}", e)))?
            .map_err(|e| browser_error("Failed to get page content", e))
    }

    async fn close(&self) -> Result<()> {
        let tab = Arc::clone(&self.tab);
        tokio::task::spawn_blocking(move || tab.close(true))
            .await
            .map_err(|e| AppError::Internal(format!("Close task failed: {}", e)))?
            .map_err(|e| browser_error("Failed to close tab", e))?;
        Ok(())
    }
}

/// Fetches pages over plain HTTP. Works for server-rendered storefronts
/// and for tests against a local server.
#[derive(Clone)]
pub struct HttpBrowser {
    client: reqwest::Client,
}

impl HttpBrowser {
    pub fn new(config: &BrowserConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Browser for HttpBrowser {
    async fn open(&self, url: &str) -> Result<Arc<dyn PageContext>> {
        let parsed = Url::parse(url).map_err(|e| browser_error(&format!("Invalid URL {}", url), e))?;
        Ok(Arc::new(HttpPage {
            client: self.client.clone(),
            requested: parsed.clone(),
            current: Mutex::new(parsed),
            closed: AtomicBool::new(false),
        }))
    }
}

struct HttpPage {
    client: reqwest::Client,
    requested: Url,
    /// Where the last fetch ended up after redirects.
    current: Mutex<Url>,
    closed: AtomicBool,
}

impl HttpPage {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AppError::Browser(format!("Page {} is closed", self.requested)));
        }
        Ok(())
    }
}

#[async_trait]
impl PageContext for HttpPage {
    async fn current_url(&self) -> Result<String> {
        self.ensure_open()?;
        Ok(self.current.lock().await.to_string())
    }

    async fn content(&self) -> Result<String> {
        self.ensure_open()?;
        let response = self
            .client
            .get(self.requested.clone())
            .send()
            .await?
            .error_for_status()?;

        *self.current.lock().await = response.url().clone();
        debug!("Fetched {} -> {}", self.requested, response.url());
        Ok(response.text().await?)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
