use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::StoreId;

/// Per-store switches chosen by the user for one search.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoreToggle {
    pub enabled: bool,
    /// Close the store's browsing context once it has reported.
    pub close_tab: bool,
}

impl Default for StoreToggle {
    fn default() -> Self {
        Self {
            enabled: true,
            close_tab: true,
        }
    }
}

/// Store settings for a search request, keyed by store.
///
/// An empty mapping means "every store, closing each context when done".
/// Otherwise only stores whose entry is enabled take part. Keys naming
/// stores this build does not know are dropped on deserialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, StoreToggle>", into = "BTreeMap<String, StoreToggle>")]
pub struct SearchSettings {
    stores: BTreeMap<StoreId, StoreToggle>,
}

impl SearchSettings {
    /// Every store enabled, every context closed on completion.
    pub fn all_enabled() -> Self {
        Self {
            stores: StoreId::ALL
                .into_iter()
                .map(|id| (id, StoreToggle::default()))
                .collect(),
        }
    }

    /// Only the given stores, each with default closing behaviour.
    pub fn only(stores: impl IntoIterator<Item = StoreId>, close_tab: bool) -> Self {
        let mut settings = Self::default();
        for id in stores {
            settings.set(id, StoreToggle { enabled: true, close_tab });
        }
        settings
    }

    pub fn set(&mut self, store: StoreId, toggle: StoreToggle) {
        self.stores.insert(store, toggle);
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    /// Replaces an empty mapping with [`SearchSettings::all_enabled`].
    pub fn resolved(self) -> Self {
        if self.is_empty() { Self::all_enabled() } else { self }
    }

    pub fn toggle(&self, store: StoreId) -> StoreToggle {
        if self.is_empty() {
            return StoreToggle::default();
        }
        self.stores.get(&store).copied().unwrap_or(StoreToggle {
            enabled: false,
            close_tab: true,
        })
    }

    pub fn is_enabled(&self, store: StoreId) -> bool {
        self.toggle(store).enabled
    }

    /// Enabled stores in display order.
    pub fn enabled_stores(&self) -> Vec<StoreId> {
        StoreId::ALL
            .into_iter()
            .filter(|id| self.is_enabled(*id))
            .collect()
    }
}

impl From<BTreeMap<String, StoreToggle>> for SearchSettings {
    fn from(raw: BTreeMap<String, StoreToggle>) -> Self {
        let mut settings = SearchSettings::default();
        for (key, toggle) in raw {
            match key.parse::<StoreId>() {
                Ok(id) => settings.set(id, toggle),
                Err(_) => tracing::debug!("Ignoring settings for unknown store: {}", key),
            }
        }
        settings
    }
}

impl From<SearchSettings> for BTreeMap<String, StoreToggle> {
    fn from(settings: SearchSettings) -> Self {
        settings
            .stores
            .into_iter()
            .map(|(id, toggle)| (id.as_str().to_string(), toggle))
            .collect()
    }
}
