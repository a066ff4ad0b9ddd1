//! Consumers of the merged results: they wait for `searchResults` to be
//! published and present it.

use rust_decimal::Decimal;
use std::fmt::Write as _;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::models::StoreResult;
use crate::storage::SharedState;

/// Opened by the coordinator once per search.
#[cfg_attr(test, mockall::automock)]
pub trait ResultsView: Send + Sync {
    fn open(&self, term: &str);
}

/// Re-reads the shared results every `interval` until they are published.
pub async fn poll_for_results(state: &SharedState, interval: Duration) -> Vec<StoreResult> {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        match state.current_results().await {
            Ok(Some(results)) => return results,
            Ok(None) => debug!("Results not published yet"),
            Err(e) => warn!("Failed to read results: {}", e),
        }
    }
}

/// First number in a display price, e.g. `"$0.59 /lb"` gives `0.59`.
pub fn parse_price(display: &str) -> Option<Decimal> {
    let start = display.find(|c: char| c.is_ascii_digit())?;
    let number: String = display[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .filter(|c| *c != ',')
        .collect();
    Decimal::from_str(number.trim_end_matches('.')).ok()
}

/// Cheapest listing per store, skipping prices that do not parse.
pub fn lowest_prices(results: &[StoreResult]) -> Vec<(String, String, Decimal)> {
    results
        .iter()
        .filter_map(|result| {
            result
                .products
                .iter()
                .filter_map(|p| parse_price(&p.price).map(|price| (p, price)))
                .min_by(|(_, a), (_, b)| a.cmp(b))
                .map(|(product, price)| (result.display_name.clone(), product.name.clone(), price))
        })
        .collect()
}

pub fn render_table(term: &str, results: &[StoreResult]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Results for \"{}\"", term);

    if results.is_empty() {
        let _ = writeln!(out, "\nNo store responded in time.");
        return out;
    }

    for result in results {
        let count = if result.is_empty() { 0 } else { result.products.len() };
        let _ = writeln!(out, "\n== {} ({} products) ==", result.display_name, count);
        let _ = writeln!(out, "   {}", result.source_url);

        for product in &result.products {
            let mut flags = Vec::new();
            if product.discount {
                flags.push("discount".to_string());
            }
            if product.on_sale {
                if product.sale_description.is_empty() {
                    flags.push("sale".to_string());
                } else {
                    flags.push(product.sale_description.clone());
                }
            }
            let flags = if flags.is_empty() {
                String::new()
            } else {
                format!("  [{}]", flags.join(", "))
            };
            let _ = writeln!(out, "   {:<60} {:>12}{}", product.name, product.price, flags);
        }
    }

    let lowest = lowest_prices(results);
    if !lowest.is_empty() {
        let _ = writeln!(out, "\nLowest price per store:");
        for (store, product, price) in lowest {
            let _ = writeln!(out, "   {:<10} ${:<10} {}", store, price, product);
        }
    }
    out
}

/// Prints the results table to stdout once the search finalizes.
pub struct TerminalResultsView {
    state: SharedState,
    interval: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TerminalResultsView {
    pub fn new(state: SharedState, interval: Duration) -> Self {
        Self {
            state,
            interval,
            task: Mutex::new(None),
        }
    }

    /// Waits until the most recently opened view has printed.
    pub async fn wait(&self) {
        let task = match self.task.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("Results view task failed: {}", e);
            }
        }
    }
}

impl ResultsView for TerminalResultsView {
    fn open(&self, term: &str) {
        let state = self.state.clone();
        let interval = self.interval;
        let term = term.to_string();

        let task = tokio::spawn(async move {
            let results = poll_for_results(&state, interval).await;
            println!("{}", render_table(&term, &results));
        });

        if let Ok(mut guard) = self.task.lock() {
            // A newer search replaces the view of the previous one.
            if let Some(previous) = guard.replace(task) {
                previous.abort();
            }
        }
    }
}

/// Used by the server: results are read through the API instead.
pub struct LogResultsView {
    results_url: String,
}

impl LogResultsView {
    pub fn new(base_url: &str) -> Self {
        Self {
            results_url: format!("{}/api/results", base_url.trim_end_matches('/')),
        }
    }
}

impl ResultsView for LogResultsView {
    fn open(&self, term: &str) {
        info!("Results for '{}' will be published at {}", term, self.results_url);
    }
}
