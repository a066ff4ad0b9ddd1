use regex::Regex;
use scraper::{ElementRef, Selector};

use crate::extractor::{
    Condition, ExtractorStrategy, FieldRules, PriceParser, PriceRule, SiteExtractor, css, first, text_of,
};
use crate::models::StoreId;
use crate::stores::{PollingPolicy, StoreDescriptor, encode_component};
use crate::utils::error::Result;

pub const DISPLAY_NAME: &str = "Walmart";

const BADGE: &str = r#"[data-testid="badgeTagComponent"]"#;

fn search_url(term: &str) -> String {
    format!(
        "https://www.walmart.com/search?q={}&{}",
        encode_component(term),
        encode_component("exclude_oos:Show+available+items+only||fulfillment_method_in_store:In-store")
    )
}

/// Formats a run of digits as dollars with the last two digits as cents.
fn cents_to_price(digits: &str) -> Option<String> {
    match digits.len() {
        0 => None,
        1 => Some(format!("$0.0{}", digits)),
        2 => Some(format!("$0.{}", digits)),
        n => Some(format!("${}.{}", &digits[..n - 2], &digits[n - 2..])),
    }
}

/// Walmart renders prices as split superscript spans, so the readable
/// amount has to be reconstructed from whichever form is present.
struct WalmartPrice {
    container: Selector,
    screen_reader: Selector,
    visual: Selector,
    current_price: Regex,
    leading_digits: Regex,
}

impl WalmartPrice {
    fn new() -> Result<Self> {
        Ok(Self {
            container: css(r#"[data-automation-id="product-price"]"#)?,
            screen_reader: css("span.w_iUH7")?,
            visual: css(r#"div[aria-hidden="true"]"#)?,
            current_price: Regex::new(r"current price (\$[\d,.]+)")?,
            leading_digits: Regex::new(r"\$?(\d+)")?,
        })
    }

    fn from_container(&self, container: ElementRef<'_>) -> String {
        if let Some(span) = first(container, &self.screen_reader) {
            let text = text_of(span);
            if let Some(captures) = self.current_price.captures(&text) {
                return captures[1].to_string();
            }
        }

        if let Some(visual) = first(container, &self.visual) {
            let digits: String = text_of(visual).chars().filter(char::is_ascii_digit).collect();
            if let Some(price) = cents_to_price(&digits) {
                return price;
            }
        }

        let full = text_of(container);
        if let Some(price) = self
            .leading_digits
            .captures(&full)
            .and_then(|captures| cents_to_price(&captures[1]))
        {
            return price;
        }

        full.lines().next().unwrap_or_default().to_string()
    }
}

impl PriceParser for WalmartPrice {
    fn parse(&self, card: ElementRef<'_>) -> String {
        first(card, &self.container)
            .map(|container| self.from_container(container))
            .unwrap_or_default()
    }
}

pub fn descriptor() -> Result<StoreDescriptor> {
    let rules = FieldRules {
        name: css(r#"[data-automation-id="product-title"]"#)?,
        price: PriceRule::Custom(Box::new(WalmartPrice::new()?)),
        image: Some(css(r#"[data-testid="productTileImage"]"#)?),
        discount: Condition::TextContains {
            selector: css(BADGE)?,
            needle: "rollback",
        },
        sale: Condition::Present(css(".product-tile__savings-price")?),
        sale_description: Some(css(BADGE)?),
    };

    Ok(StoreDescriptor {
        id: StoreId::Walmart,
        display_name: DISPLAY_NAME,
        host: "walmart.com",
        polling: PollingPolicy::new(10, 500),
        no_results_marker: None,
        extractor: SiteExtractor::new(DISPLAY_NAME, "div[data-item-id]", ExtractorStrategy::Fields(rules))?,
        url_builder: search_url,
    })
}
