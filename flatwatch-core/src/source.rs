//! The portal adapter contract.

use async_trait::async_trait;

use flatwatch_types::{FlatwatchError, Listing, SearchQuery, SourceKey};

/// Main trait implemented by portal adapter crates.
///
/// Contract:
/// - pure over portal state + inputs; adapters never persist anything;
/// - the adapter owns its slug → portal-city-code lookup and returns an
///   empty batch (logged) for a city it cannot map;
/// - filters are encoded server-side where the portal supports it and
///   re-checked client-side regardless;
/// - every produced listing carries `id = "<source>_<native_id>"` and has
///   passed the minimal DTO validation.
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// A stable identifier for enable-lists and logs (e.g. "kufar").
    fn name(&self) -> &'static str;

    /// Canonical source key constructed from the static name.
    fn key(&self) -> SourceKey {
        SourceKey::new(self.name())
    }

    /// Fetch the current batch of listings for a city/rooms/price window.
    ///
    /// # Errors
    /// Returns a `Source`-tagged error on permanent portal failure; the
    /// aggregator treats any error as an empty contribution for this run.
    async fn fetch_listings(&self, query: &SearchQuery) -> Result<Vec<Listing>, FlatwatchError>;
}

/// Focused probe adapters use for the pagination early-stop: "has this
/// listing id ever been delivered to anyone?".
///
/// Errors are swallowed into `false` so a degraded store can only make an
/// adapter fetch more pages, never skip fresh listings.
#[async_trait]
pub trait DeliveredProbe: Send + Sync {
    /// Whether the id is in the global delivered set.
    async fn is_delivered(&self, listing_id: &str) -> bool;
}
