use serde::{Deserialize, Serialize};
use tracing::debug;
use validator::Validate;

use crate::models::{Product, SearchSettings, SessionId, StoreId};
use crate::utils::error::{AppError, Result};

pub const SEARCH_ACTION: &str = "search";

/// A request to start a new search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct SearchRequest {
    #[validate(length(min = 1, max = 200, message = "search term must be 1-200 characters"))]
    pub term: String,
    #[serde(default)]
    pub settings: SearchSettings,
}

impl SearchRequest {
    /// Builds a validated request; the term is trimmed first.
    pub fn new(term: impl AsRef<str>, settings: SearchSettings) -> Result<Self> {
        let request = Self {
            term: term.as_ref().trim().to_string(),
            settings,
        };
        request.validate()?;
        Ok(request)
    }
}

/// Messages arriving on the runtime channel, in the shape browser-side
/// scripts send them: `{"action": "search", ...}` or
/// `{"action": "<store>Results", ...}`.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeMessage {
    Search(SearchRequest),
    StoreResults {
        store: StoreId,
        products: Vec<Product>,
        search_url: String,
        /// Absent for senders that predate session tagging; treated as the live session.
        session: Option<SessionId>,
    },
    /// An action this build does not handle, including reports for unknown stores.
    Unrecognized(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    action: String,
    term: Option<String>,
    #[serde(default)]
    settings: SearchSettings,
    #[serde(default)]
    results: Vec<Product>,
    #[serde(default)]
    search_url: String,
    session: Option<SessionId>,
}

impl RuntimeMessage {
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawMessage = serde_json::from_str(json)?;
        Self::from_raw(raw)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let raw: RawMessage = serde_json::from_value(value)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawMessage) -> Result<Self> {
        if raw.action == SEARCH_ACTION {
            let term = raw
                .term
                .ok_or_else(|| AppError::Validation("search message is missing a term".to_string()))?;
            return Ok(RuntimeMessage::Search(SearchRequest::new(term, raw.settings)?));
        }

        match StoreId::from_action(&raw.action) {
            Some(store) => {
                let received = raw.results.len();
                // Same rule the extractor applies to cards.
                let products: Vec<Product> = raw
                    .results
                    .into_iter()
                    .filter(|p| !p.name.trim().is_empty())
                    .collect();
                if products.len() < received {
                    debug!("[{}] Dropped {} reported products without a name", store, received - products.len());
                }
                Ok(RuntimeMessage::StoreResults {
                    store,
                    products,
                    search_url: raw.search_url,
                    session: raw.session,
                })
            }
            None => Ok(RuntimeMessage::Unrecognized(raw.action)),
        }
    }
}
