use crate::extractor::{Condition, ExtractorStrategy, FieldRules, PriceRule, SiteExtractor, css};
use crate::models::StoreId;
use crate::stores::{PollingPolicy, StoreDescriptor, encode_component};
use crate::utils::error::Result;

pub const DISPLAY_NAME: &str = "Kroger";

fn search_url(term: &str) -> String {
    format!("https://www.kroger.com/search?query={}", encode_component(term))
}

pub fn descriptor() -> Result<StoreDescriptor> {
    let rules = FieldRules {
        name: css(r#".kds-Text--l[data-testid="cart-page-item-description"]"#)?,
        // The visible price is split across spans; the data element carries the plain amount.
        price: PriceRule::Attribute {
            selector: css(r#"data[data-qa="cart-page-item-price"]"#)?,
            attribute: "value",
            prefix: "$",
        },
        image: Some(css(r#"img[data-testid="product-image-loaded"]"#)?),
        discount: Condition::ClassSet {
            selector: css(".kds-Price-promotional")?,
            required: &["kds-Price-promotional--decorated"],
            forbidden: &["kds-Price-promotional--plain"],
        },
        sale: Condition::Present(css(r#"[data-testid="savings-zone-text"]"#)?),
        sale_description: Some(css(r#"[data-testid="savings-zone-text"]"#)?),
    };

    Ok(StoreDescriptor {
        id: StoreId::Kroger,
        display_name: DISPLAY_NAME,
        host: "kroger.com",
        polling: PollingPolicy::new(20, 1000),
        no_results_marker: None,
        extractor: SiteExtractor::new(DISPLAY_NAME, ".ProductCard", ExtractorStrategy::Fields(rules))?,
        url_builder: search_url,
    })
}
