//! Turning a rendered search page into [`Product`] records.
//!
//! Each store gets a [`SiteExtractor`]: a card selector plus an
//! [`ExtractorStrategy`] that pulls the fields out of one card. Most stores
//! are described declaratively with [`FieldRules`]; stores whose markup needs
//! real logic plug in a [`CardParser`] or a [`PriceParser`].

use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::models::Product;
use crate::utils::error::{AppError, Result};

/// Compiles a CSS selector, keeping the source text in the error.
pub fn css(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| AppError::Selector {
        selector: selector.to_string(),
        message: format!("{:?}", e),
    })
}

/// Trimmed text content of an element and all its descendants.
pub fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// First descendant of `scope` matching `selector`.
pub fn first<'a>(scope: ElementRef<'a>, selector: &Selector) -> Option<ElementRef<'a>> {
    scope.select(selector).next()
}

/// Trimmed text of the first match, or an empty string when nothing matches.
pub fn text_at(scope: ElementRef<'_>, selector: &Selector) -> String {
    first(scope, selector).map(text_of).unwrap_or_default()
}

/// Image URL of an `<img>`-like element: `src`, else the first `srcset` entry.
/// Relative URLs are resolved against `base` when one is known.
pub fn image_url(element: ElementRef<'_>, base: Option<&Url>) -> Option<String> {
    let attrs = element.value();
    let raw = attrs
        .attr("src")
        .map(str::trim)
        .filter(|src| !src.is_empty())
        .or_else(|| {
            attrs
                .attr("srcset")
                .and_then(|set| set.split_whitespace().next())
                .map(|candidate| candidate.trim_end_matches(','))
        })?;

    match base {
        Some(base) => base.join(raw).ok().map(String::from),
        None => Some(raw.to_string()),
    }
}

/// Fields pulled out of one product card before the name/price check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardFields {
    pub name: String,
    pub price: String,
    pub image_url: Option<String>,
    pub discount: bool,
    pub on_sale: bool,
    pub sale_description: String,
}

impl CardFields {
    /// A card only becomes a product when both name and price are present.
    pub fn into_product(self) -> Option<Product> {
        if self.name.is_empty() || self.price.is_empty() {
            return None;
        }
        Some(Product {
            name: self.name,
            price: self.price,
            image_url: self.image_url,
            discount: self.discount,
            on_sale: self.on_sale,
            sale_description: self.sale_description,
        })
    }
}

/// Store-specific price logic, given the whole card.
pub trait PriceParser: Send + Sync {
    fn parse(&self, card: ElementRef<'_>) -> String;
}

/// Store-specific logic for cards that selectors alone cannot describe.
pub trait CardParser: Send + Sync {
    fn parse(&self, card: ElementRef<'_>, base: Option<&Url>) -> CardFields;
}

pub enum PriceRule {
    /// Text content of the first match.
    Text(Selector),
    /// An attribute of the first match behind a fixed prefix such as `$`.
    /// The prefix is kept even when the element or attribute is missing.
    Attribute {
        selector: Selector,
        attribute: &'static str,
        prefix: &'static str,
    },
    Custom(Box<dyn PriceParser>),
}

impl PriceRule {
    fn price(&self, card: ElementRef<'_>) -> String {
        match self {
            PriceRule::Text(selector) => text_at(card, selector),
            PriceRule::Attribute { selector, attribute, prefix } => {
                let value = first(card, selector)
                    .and_then(|el| el.value().attr(attribute))
                    .map(str::trim)
                    .unwrap_or_default();
                format!("{}{}", prefix, value)
            }
            PriceRule::Custom(parser) => parser.parse(card),
        }
    }
}

/// Boolean predicate over an optional element inside a card. A missing
/// target element always evaluates to `false`.
pub enum Condition {
    Never,
    Present(Selector),
    NonEmptyText(Selector),
    ClassSet {
        selector: Selector,
        required: &'static [&'static str],
        forbidden: &'static [&'static str],
    },
    TextContains {
        selector: Selector,
        /// Lowercase needle; the element text is lowercased before matching.
        needle: &'static str,
    },
}

impl Condition {
    pub fn holds(&self, card: ElementRef<'_>) -> bool {
        match self {
            Condition::Never => false,
            Condition::Present(selector) => first(card, selector).is_some(),
            Condition::NonEmptyText(selector) => !text_at(card, selector).is_empty(),
            Condition::ClassSet { selector, required, forbidden } => first(card, selector)
                .map(|el| {
                    let classes: Vec<&str> = el.value().classes().collect();
                    required.iter().all(|c| classes.contains(c))
                        && !forbidden.iter().any(|c| classes.contains(c))
                })
                .unwrap_or(false),
            Condition::TextContains { selector, needle } => first(card, selector)
                .map(|el| text_of(el).to_lowercase().contains(needle))
                .unwrap_or(false),
        }
    }
}

/// Declarative extraction: one rule per product field.
pub struct FieldRules {
    pub name: Selector,
    pub price: PriceRule,
    pub image: Option<Selector>,
    pub discount: Condition,
    pub sale: Condition,
    pub sale_description: Option<Selector>,
}

impl FieldRules {
    fn fields(&self, card: ElementRef<'_>, base: Option<&Url>) -> CardFields {
        let on_sale = self.sale.holds(card);
        let sale_description = match (&self.sale_description, on_sale) {
            (Some(selector), true) => text_at(card, selector),
            _ => String::new(),
        };

        CardFields {
            name: text_at(card, &self.name),
            price: self.price.price(card),
            image_url: self
                .image
                .as_ref()
                .and_then(|selector| first(card, selector))
                .and_then(|el| image_url(el, base)),
            discount: self.discount.holds(card),
            on_sale,
            sale_description,
        }
    }
}

pub enum ExtractorStrategy {
    Fields(FieldRules),
    Custom(Box<dyn CardParser>),
}

/// Result of scanning one snapshot of a page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageScan {
    pub cards: usize,
    pub products: Vec<Product>,
}

pub struct SiteExtractor {
    label: &'static str,
    card: Selector,
    strategy: ExtractorStrategy,
}

impl SiteExtractor {
    pub fn new(label: &'static str, card_selector: &str, strategy: ExtractorStrategy) -> Result<Self> {
        Ok(Self {
            label,
            card: css(card_selector)?,
            strategy,
        })
    }

    pub fn count_cards(&self, document: &Html) -> usize {
        document.select(&self.card).count()
    }

    /// Products from every well-formed card, in document order.
    pub fn extract_products(&self, document: &Html, base: Option<&Url>) -> Vec<Product> {
        let mut products = Vec::new();

        for (index, card) in document.select(&self.card).enumerate() {
            let fields = match &self.strategy {
                ExtractorStrategy::Fields(rules) => rules.fields(card, base),
                ExtractorStrategy::Custom(parser) => parser.parse(card, base),
            };

            let (name, price) = (fields.name.clone(), fields.price.clone());
            match fields.into_product() {
                Some(product) => products.push(product),
                None => tracing::debug!(
                    "[{}] Skipping card {} - missing name or price (name={:?}, price={:?})",
                    self.label, index, name, price
                ),
            }
        }

        tracing::debug!("[{}] Extracted {} products", self.label, products.len());
        products
    }

    /// Parses `html` and reports both the card count and the extracted products.
    pub fn scan(&self, html: &str, page_url: &str) -> PageScan {
        let document = Html::parse_document(html);
        let base = Url::parse(page_url).ok();
        let cards = self.count_cards(&document);
        let products = if cards > 0 {
            self.extract_products(&document, base.as_ref())
        } else {
            Vec::new()
        };
        PageScan { cards, products }
    }
}
