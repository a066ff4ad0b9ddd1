use crate::extractor::{Condition, ExtractorStrategy, FieldRules, PriceRule, SiteExtractor, css};
use crate::models::StoreId;
use crate::stores::{PollingPolicy, StoreDescriptor, encode_component};
use crate::utils::error::Result;

pub const DISPLAY_NAME: &str = "Aldi";

fn search_url(term: &str) -> String {
    format!("https://www.aldi.us/results?q={}", encode_component(term))
}

pub fn descriptor() -> Result<StoreDescriptor> {
    let rules = FieldRules {
        name: css(".product-tile__name p")?,
        price: PriceRule::Text(css(".product-tile__price")?),
        image: Some(css(".base-image")?),
        discount: Condition::Never,
        sale: Condition::Never,
        sale_description: None,
    };

    Ok(StoreDescriptor {
        id: StoreId::Aldi,
        display_name: DISPLAY_NAME,
        host: "aldi.us",
        polling: PollingPolicy::new(10, 1000),
        no_results_marker: None,
        extractor: SiteExtractor::new(DISPLAY_NAME, ".product-tile", ExtractorStrategy::Fields(rules))?,
        url_builder: search_url,
    })
}
