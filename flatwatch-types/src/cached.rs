use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Listing;

/// Lifecycle state of a cached listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    /// Still observed on its portal.
    #[default]
    Active,
    /// No longer observed; retained until the sweep window elapses.
    Deleted,
}

impl ListingStatus {
    /// Storage label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Deleted => "deleted",
        }
    }

    /// Parse a storage label; unknown labels count as `Deleted`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "active" => Self::Active,
            _ => Self::Deleted,
        }
    }
}

/// A listing as held by the remote cache: the canonical record plus the
/// cache's own lifecycle bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedListing {
    /// The canonical listing.
    pub listing: Listing,
    /// Derived city slug used by the `(city, rooms, price)` index.
    pub city: String,
    /// Cross-source content hash.
    pub content_hash: String,
    /// Lifecycle state.
    pub status: ListingStatus,
    /// First time any run observed this id.
    pub first_seen_at: DateTime<Utc>,
    /// Last time a run observed this id on its portal.
    pub last_seen_at: DateTime<Utc>,
    /// Last time the row was written.
    pub updated_at: DateTime<Utc>,
}

/// A row of the global delivered set: which listing first carried a given
/// content hash to any subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveredRecord {
    /// Listing id that was delivered.
    pub listing_id: String,
    /// Cross-source content hash at delivery time.
    pub content_hash: String,
    /// Adapter tag of the delivered listing.
    pub source: String,
    /// Listing URL at delivery time.
    pub url: String,
    /// When the hash first reached a subscriber.
    pub first_seen_at: DateTime<Utc>,
}
