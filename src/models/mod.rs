use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub mod message;
pub mod product;
pub mod settings;

// Re-exports for convenience
pub use message::*;
pub use product::*;
pub use settings::*;

/// Suffix appended to a store id to form its report action name.
pub const RESULTS_ACTION_SUFFIX: &str = "Results";

/// The storefronts a search fans out to. Declaration order is display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreId {
    Kroger,
    Meijer,
    Aldi,
    Walmart,
    Costco,
}

impl StoreId {
    pub const ALL: [StoreId; 5] = [
        StoreId::Kroger,
        StoreId::Meijer,
        StoreId::Aldi,
        StoreId::Walmart,
        StoreId::Costco,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StoreId::Kroger => "kroger",
            StoreId::Meijer => "meijer",
            StoreId::Aldi => "aldi",
            StoreId::Walmart => "walmart",
            StoreId::Costco => "costco",
        }
    }

    /// Action name a scrape runner uses when reporting, e.g. `krogerResults`.
    pub fn results_action(&self) -> String {
        format!("{}{}", self.as_str(), RESULTS_ACTION_SUFFIX)
    }

    /// Inverse of [`StoreId::results_action`]. Unknown stores yield `None`.
    pub fn from_action(action: &str) -> Option<StoreId> {
        action
            .strip_suffix(RESULTS_ACTION_SUFFIX)
            .and_then(|id| id.parse().ok())
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StoreId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| format!("unknown store '{}'", s))
    }
}

/// Identifies one search session. Reports carry it so stragglers from a
/// superseded search can be told apart from the live one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}
