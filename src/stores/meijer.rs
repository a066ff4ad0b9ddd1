use scraper::{ElementRef, Selector};

use crate::extractor::{
    Condition, ExtractorStrategy, FieldRules, PriceParser, PriceRule, SiteExtractor, css, first, text_at,
};
use crate::models::StoreId;
use crate::stores::{PollingPolicy, StoreDescriptor, encode_component};
use crate::utils::error::Result;

pub const DISPLAY_NAME: &str = "Meijer";

const SALE_PRICE: &str = ".product-tile__sale-price span:not(.sr-only)";

fn search_url(term: &str) -> String {
    format!("https://www.meijer.com/shopping/search.html?text={}", encode_component(term))
}

/// Sale price when shown, otherwise the regular price with its unit suffix.
struct MeijerPrice {
    sale: Selector,
    regular_container: Selector,
    regular_text: Selector,
    units: Selector,
}

impl MeijerPrice {
    fn new() -> Result<Self> {
        Ok(Self {
            sale: css(SALE_PRICE)?,
            regular_container: css(".product-tile__regular-price")?,
            regular_text: css(".product-tile__regular-price-text")?,
            units: css(".product-tile__units")?,
        })
    }
}

impl PriceParser for MeijerPrice {
    fn parse(&self, card: ElementRef<'_>) -> String {
        let sale = text_at(card, &self.sale);
        if !sale.is_empty() {
            return sale;
        }

        match first(card, &self.regular_container) {
            Some(container) => {
                let price = text_at(container, &self.regular_text);
                let units = text_at(container, &self.units);
                if units.is_empty() {
                    price
                } else {
                    format!("{} {}", price, units)
                }
            }
            None => text_at(card, &self.regular_text),
        }
    }
}

pub fn descriptor() -> Result<StoreDescriptor> {
    let rules = FieldRules {
        name: css(".ads-type-heading-07")?,
        price: PriceRule::Custom(Box::new(MeijerPrice::new()?)),
        image: Some(css(".product-tile__image")?),
        discount: Condition::NonEmptyText(css(SALE_PRICE)?),
        sale: Condition::Present(css(".product-tile__savings-price")?),
        sale_description: Some(css(".product-tile__savings-price")?),
    };

    Ok(StoreDescriptor {
        id: StoreId::Meijer,
        display_name: DISPLAY_NAME,
        host: "meijer.com",
        polling: PollingPolicy::new(10, 1000),
        no_results_marker: None,
        extractor: SiteExtractor::new(DISPLAY_NAME, ".product-tile", ExtractorStrategy::Fields(rules))?,
        url_builder: search_url,
    })
}
