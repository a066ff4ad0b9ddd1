use scraper::ElementRef;
use url::Url;

use crate::extractor::{CardFields, CardParser, ExtractorStrategy, SiteExtractor, image_url, text_of};
use crate::models::StoreId;
use crate::stores::{PollingPolicy, StoreDescriptor, encode_component};
use crate::utils::error::Result;

pub const DISPLAY_NAME: &str = "Costco";

const TILE_PREFIX: &str = "ProductTile_";

fn search_url(term: &str) -> String {
    format!(
        "https://www.costco.com/s?keyword={}&{}",
        encode_component(term),
        encode_component("refine=item_program_eligibility-InWarehouse")
    )
}

/// Costco addresses every field of a tile through the tile's product id,
/// e.g. `ProductTile_123` holds `Text_Price_123`.
struct CostcoCard;

fn by_test_id<'a>(scope: ElementRef<'a>, test_id: &str) -> Option<ElementRef<'a>> {
    scope
        .descendants()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().attr("data-testid") == Some(test_id))
}

impl CardParser for CostcoCard {
    fn parse(&self, card: ElementRef<'_>, base: Option<&Url>) -> CardFields {
        let product_id = card
            .value()
            .attr("data-testid")
            .and_then(|id| id.strip_prefix(TILE_PREFIX))
            .unwrap_or_default();
        if product_id.is_empty() {
            return CardFields::default();
        }

        let text = |test_id: String| by_test_id(card, &test_id).map(text_of).unwrap_or_default();

        let image = by_test_id(card, &format!("ProductImage_{}", product_id))
            .and_then(|container| {
                container
                    .descendants()
                    .filter_map(ElementRef::wrap)
                    .find(|el| el.value().name() == "img")
            })
            .and_then(|img| image_url(img, base));

        CardFields {
            name: text(format!("Text_ProductTile_{}_title", product_id)),
            price: text(format!("Text_Price_{}", product_id)),
            image_url: image,
            ..CardFields::default()
        }
    }
}

pub fn descriptor() -> Result<StoreDescriptor> {
    Ok(StoreDescriptor {
        id: StoreId::Costco,
        display_name: DISPLAY_NAME,
        host: "costco.com",
        polling: PollingPolicy::new(10, 1000),
        no_results_marker: Some("no-search-results-grocery.html"),
        extractor: SiteExtractor::new(
            DISPLAY_NAME,
            r#"[data-testid^="ProductTile_"]"#,
            ExtractorStrategy::Custom(Box::new(CostcoCard)),
        )?,
        url_builder: search_url,
    })
}
