use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::models::StoreId;

/// Name of the placeholder product substituted for an empty result set.
pub const NO_RESULTS_NAME: &str = "No results found";

/// One product listing scraped from a store's search page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Product {
    pub name: String,
    /// Display string as shown by the store; never parsed to a number here.
    pub price: String,
    #[serde(rename = "image", default, deserialize_with = "empty_string_as_none")]
    pub image_url: Option<String>,
    #[serde(default)]
    pub discount: bool,
    #[serde(rename = "sale", default)]
    pub on_sale: bool,
    #[serde(rename = "salesDesc", default)]
    pub sale_description: String,
}

impl Product {
    pub fn new(name: impl Into<String>, price: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            price: price.into(),
            image_url: None,
            discount: false,
            on_sale: false,
            sale_description: String::new(),
        }
    }

    /// The "No results found" sentinel.
    pub fn no_results() -> Self {
        Self::new(NO_RESULTS_NAME, "")
    }

    pub fn is_sentinel(&self) -> bool {
        self.name == NO_RESULTS_NAME && self.price.is_empty()
    }
}

/// Everything one store contributed to a search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoreResult {
    pub store: StoreId,
    #[serde(rename = "name")]
    pub display_name: String,
    /// Never empty: a lone sentinel stands in for "nothing found".
    pub products: Vec<Product>,
    #[serde(rename = "searchUrl")]
    pub source_url: String,
    pub reported_at: DateTime<Utc>,
}

impl StoreResult {
    pub fn new(
        store: StoreId,
        display_name: impl Into<String>,
        products: Vec<Product>,
        source_url: impl Into<String>,
    ) -> Self {
        let products = if products.is_empty() {
            vec![Product::no_results()]
        } else {
            products
        };

        Self {
            store,
            display_name: display_name.into(),
            products,
            source_url: source_url.into(),
            reported_at: Utc::now(),
        }
    }

    /// True when the store reported nothing but the sentinel.
    pub fn is_empty(&self) -> bool {
        self.products.len() == 1 && self.products[0].is_sentinel()
    }
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}
