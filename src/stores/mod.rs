//! The fixed set of storefronts and everything needed to search each one.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::extractor::SiteExtractor;
use crate::models::StoreId;
use crate::utils::error::Result;

pub mod aldi;
pub mod costco;
pub mod kroger;
pub mod meijer;
pub mod walmart;

/// Characters `encodeURIComponent` leaves untouched, so store URLs match
/// what the storefronts' own search boxes produce.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

pub fn encode_component(input: &str) -> String {
    utf8_percent_encode(input, URI_COMPONENT).to_string()
}

/// How long a scrape runner keeps looking for product cards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PollingPolicy {
    pub max_attempts: u32,
    #[serde(rename = "interval_ms", serialize_with = "as_millis")]
    pub interval: Duration,
}

impl PollingPolicy {
    pub const fn new(max_attempts: u32, interval_ms: u64) -> Self {
        Self {
            max_attempts,
            interval: Duration::from_millis(interval_ms),
        }
    }
}

fn as_millis<S: serde::Serializer>(interval: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u64(interval.as_millis() as u64)
}

pub struct StoreDescriptor {
    pub id: StoreId,
    pub display_name: &'static str,
    /// Hostname suffix identifying the store's pages.
    pub host: &'static str,
    pub polling: PollingPolicy,
    /// A page URL containing this marker is a dedicated "no results" page.
    pub no_results_marker: Option<&'static str>,
    pub extractor: SiteExtractor,
    url_builder: fn(&str) -> String,
}

impl StoreDescriptor {
    pub fn search_url(&self, term: &str) -> String {
        (self.url_builder)(term)
    }

    pub fn is_no_results_page(&self, url: &str) -> bool {
        self.no_results_marker
            .map(|marker| url.contains(marker))
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for StoreDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreDescriptor")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .field("host", &self.host)
            .field("polling", &self.polling)
            .field("no_results_marker", &self.no_results_marker)
            .finish_non_exhaustive()
    }
}

/// Public summary of a store, as listed by the API and CLI.
#[derive(Debug, Clone, Serialize)]
pub struct StoreSummary {
    pub id: StoreId,
    pub name: &'static str,
    pub host: &'static str,
    pub polling: PollingPolicy,
}

/// Immutable lookup of every supported store, built once at start-up.
#[derive(Debug, Clone)]
pub struct StoreRegistry {
    stores: BTreeMap<StoreId, Arc<StoreDescriptor>>,
}

impl StoreRegistry {
    pub fn new() -> Result<Self> {
        let descriptors = [
            kroger::descriptor()?,
            meijer::descriptor()?,
            aldi::descriptor()?,
            walmart::descriptor()?,
            costco::descriptor()?,
        ];

        let stores = descriptors
            .into_iter()
            .map(|descriptor| (descriptor.id, Arc::new(descriptor)))
            .collect();

        Ok(Self { stores })
    }

    pub fn describe(&self, id: StoreId) -> Arc<StoreDescriptor> {
        // Every StoreId variant is registered in `new`.
        Arc::clone(&self.stores[&id])
    }

    pub fn all_store_ids(&self) -> Vec<StoreId> {
        self.stores.keys().copied().collect()
    }

    pub fn build_search_url(&self, id: StoreId, term: &str) -> String {
        self.stores[&id].search_url(term)
    }

    /// Which store a page belongs to, judged by its hostname.
    pub fn detect(&self, hostname: &str) -> Option<StoreId> {
        self.stores
            .values()
            .find(|store| hostname.contains(store.host))
            .map(|store| store.id)
    }

    pub fn summaries(&self) -> Vec<StoreSummary> {
        self.stores
            .values()
            .map(|store| StoreSummary {
                id: store.id,
                name: store.display_name,
                host: store.host,
                polling: store.polling,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use url::Url;

    fn registry() -> StoreRegistry {
        StoreRegistry::new().expect("store selectors compile")
    }

    #[test]
    fn test_registry_has_five_stores() {
        assert_eq!(registry().all_store_ids(), StoreId::ALL.to_vec());
    }

    #[test]
    fn test_encode_component_matches_uri_component_rules() {
        assert_eq!(encode_component("2% milk & eggs"), "2%25%20milk%20%26%20eggs");
        assert_eq!(encode_component("ben & jerry's (pint)"), "ben%20%26%20jerry's%20(pint)");
        assert_eq!(encode_component("a+b/c?d=e"), "a%2Bb%2Fc%3Fd%3De");
        assert_eq!(encode_component("crème fraîche"), "cr%C3%A8me%20fra%C3%AEche");
    }

    #[rstest]
    #[case(StoreId::Kroger, "query")]
    #[case(StoreId::Meijer, "text")]
    #[case(StoreId::Aldi, "q")]
    #[case(StoreId::Walmart, "q")]
    #[case(StoreId::Costco, "keyword")]
    fn test_search_url_round_trips_term(#[case] store: StoreId, #[case] param: &str) {
        let term = "ben & jerry's 2% ice-cream + cones/cups?";
        let url = Url::parse(&registry().build_search_url(store, term)).unwrap();
        let decoded = url
            .query_pairs()
            .find(|(key, _)| key == param)
            .map(|(_, value)| value.into_owned());
        assert_eq!(decoded.as_deref(), Some(term));
    }

    #[test]
    fn test_store_specific_filters() {
        let registry = registry();
        assert_eq!(
            registry.build_search_url(StoreId::Walmart, "milk"),
            "https://www.walmart.com/search?q=milk&exclude_oos%3AShow%2Bavailable%2Bitems%2Bonly%7C%7Cfulfillment_method_in_store%3AIn-store"
        );
        assert_eq!(
            registry.build_search_url(StoreId::Costco, "milk"),
            "https://www.costco.com/s?keyword=milk&refine%3Ditem_program_eligibility-InWarehouse"
        );
        assert_eq!(
            registry.build_search_url(StoreId::Kroger, "whole milk"),
            "https://www.kroger.com/search?query=whole%20milk"
        );
    }

    #[rstest]
    #[case("www.kroger.com", Some(StoreId::Kroger))]
    #[case("www.meijer.com", Some(StoreId::Meijer))]
    #[case("www.aldi.us", Some(StoreId::Aldi))]
    #[case("www.walmart.com", Some(StoreId::Walmart))]
    #[case("www.costco.com", Some(StoreId::Costco))]
    #[case("www.target.com", None)]
    fn test_detect_store_by_host(#[case] host: &str, #[case] expected: Option<StoreId>) {
        assert_eq!(registry().detect(host), expected);
    }

    #[test]
    fn test_polling_budgets() {
        let registry = registry();
        assert_eq!(registry.describe(StoreId::Kroger).polling, PollingPolicy::new(20, 1000));
        assert_eq!(registry.describe(StoreId::Walmart).polling, PollingPolicy::new(10, 500));
        assert_eq!(registry.describe(StoreId::Costco).polling, PollingPolicy::new(10, 1000));
    }

    #[test]
    fn test_no_results_marker_only_for_costco() {
        let registry = registry();
        let url = "https://www.costco.com/no-search-results-grocery.html?keyword=zzz";
        assert!(registry.describe(StoreId::Costco).is_no_results_page(url));
        assert!(!registry.describe(StoreId::Kroger).is_no_results_page(url));
    }
}
