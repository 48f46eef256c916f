use serde::{Deserialize, Serialize};

use crate::FilterRecord;

/// Stable identifier of a portal adapter, used in enable-lists and logs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceKey(String);

impl SourceKey {
    /// Build a key from an adapter's static name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into().to_lowercase())
    }

    /// The lowercase adapter name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Inputs every adapter fetch takes: the canonical city slug plus the
/// room/price window. Adapters encode these server-side where the portal
/// supports it and re-check client-side regardless.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Canonical city slug (e.g. "baranovichi").
    pub city_slug: String,
    /// Minimum room count.
    pub min_rooms: u32,
    /// Maximum room count (99 = unbounded).
    pub max_rooms: u32,
    /// Minimum price in USD.
    pub min_price: i64,
    /// Maximum price in USD.
    pub max_price: i64,
}

impl SearchQuery {
    /// Derive the adapter-facing query from a subscriber filter.
    #[must_use]
    pub fn from_filter(filter: &FilterRecord) -> Self {
        Self {
            city_slug: filter.city_slug.clone(),
            min_rooms: filter.min_rooms,
            max_rooms: filter.max_rooms,
            min_price: filter.min_price,
            max_price: filter.max_price,
        }
    }
}
