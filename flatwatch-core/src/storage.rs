//! Storage seams between the dispatcher/bot layer and the remote SQL store.
//!
//! Each trait owns one table family. The Postgres implementations live in
//! `flatwatch-store`; `flatwatch-mock` ships in-memory implementations so
//! dispatcher and delivery logic is testable without a database.

use async_trait::async_trait;

use flatwatch_types::{
    CachedListing, DeliveredRecord, FilterRecord, FlatwatchError, Listing, SearchQuery,
};

use crate::source::DeliveredProbe;

/// Read-through/write-through cache of canonical listings.
#[async_trait]
pub trait ListingCacheStore: Send + Sync {
    /// Upsert a fetched batch. Preserves `first_seen_at`, bumps
    /// `last_seen_at`/`updated_at`, resets status to active. Returns how
    /// many rows were written; failures are partial, not fatal.
    async fn cache_batch(
        &self,
        listings: &[Listing],
        default_city: &str,
    ) -> Result<usize, FlatwatchError>;

    /// Query active rows matching `(city, rooms, price)` ordered by
    /// `updated_at` descending, up to `limit`.
    async fn read_cache(
        &self,
        query: &SearchQuery,
        limit: u32,
    ) -> Result<Vec<CachedListing>, FlatwatchError>;

    /// Flip one row to `deleted`.
    async fn mark_deleted(&self, listing_id: &str) -> Result<(), FlatwatchError>;

    /// Daily maintenance: touch stale active rows, hard-delete rows that
    /// have been `deleted` for longer than the retention window. Returns
    /// the number of rows touched.
    async fn daily_sweep(&self) -> Result<u64, FlatwatchError>;
}

/// Per-subscriber "already delivered" bookkeeping.
#[async_trait]
pub trait SeenStore: Send + Sync {
    /// Whether this subscriber already received the listing.
    async fn is_seen(&self, chat_id: i64, listing_id: &str) -> Result<bool, FlatwatchError>;

    /// Record an acked delivery.
    async fn mark_seen(&self, chat_id: i64, listing_id: &str) -> Result<(), FlatwatchError>;

    /// Admin wipe; returns the number of rows removed.
    async fn clear_seen(&self, chat_id: i64) -> Result<u64, FlatwatchError>;

    /// How many listings this subscriber has received.
    async fn seen_count(&self, chat_id: i64) -> Result<u64, FlatwatchError>;
}

/// Aggregate view over the global delivered set, used by `/stats`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DuplicateStats {
    /// Total delivered records.
    pub total_delivered: u64,
    /// Distinct content hashes among them.
    pub unique_hashes: u64,
    /// Hashes that appear more than once (cross-source duplicates caught).
    pub duplicate_groups: u64,
    /// Delivered counts per source, descending.
    pub by_source: Vec<(String, u64)>,
}

/// Global "ever delivered to anyone" set keyed by content hash.
#[async_trait]
pub trait DeliveredStore: Send + Sync {
    /// Whether a listing id has ever been delivered.
    async fn is_delivered(&self, listing_id: &str) -> Result<bool, FlatwatchError>;

    /// Look up the first delivery that carried this content hash.
    async fn find_by_hash(
        &self,
        content_hash: &str,
    ) -> Result<Option<DeliveredRecord>, FlatwatchError>;

    /// Record a delivery (id, hash, source, url).
    async fn mark_delivered(&self, listing: &Listing) -> Result<(), FlatwatchError>;

    /// Drop records older than `days`; returns the number removed.
    async fn purge_older_than(&self, days: i64) -> Result<u64, FlatwatchError>;

    /// Aggregate duplicate statistics.
    async fn duplicate_stats(&self) -> Result<DuplicateStats, FlatwatchError>;
}

/// Adapter exposing a [`DeliveredStore`] as the pagination early-stop
/// probe. Store errors collapse to `false` so a degraded store can only
/// make an adapter fetch more pages, never skip fresh listings.
pub struct ProbeOver<S>(pub std::sync::Arc<S>);

#[async_trait]
impl<S: DeliveredStore> DeliveredProbe for ProbeOver<S> {
    async fn is_delivered(&self, listing_id: &str) -> bool {
        DeliveredStore::is_delivered(self.0.as_ref(), listing_id)
            .await
            .unwrap_or(false)
    }
}

/// Subscriber identities and their filter records.
#[async_trait]
pub trait SubscriberStore: Send + Sync {
    /// Create the subscriber row if missing; never resets an existing
    /// filter.
    async fn upsert_subscriber(&self, chat_id: i64) -> Result<(), FlatwatchError>;

    /// Current filter, `None` until setup completes.
    async fn get_filter(&self, chat_id: i64) -> Result<Option<FilterRecord>, FlatwatchError>;

    /// Store a validated, normalized filter.
    async fn set_filter(&self, chat_id: i64, filter: &FilterRecord) -> Result<(), FlatwatchError>;

    /// Toggle the active flag (pause/resume/deactivate-on-chat-closed).
    async fn set_active(&self, chat_id: i64, active: bool) -> Result<(), FlatwatchError>;

    /// Chat ids of every subscriber with `active = true` and a filter.
    async fn active_subscribers(&self) -> Result<Vec<i64>, FlatwatchError>;
}

/// Server-side storage for callback payloads over the platform's 64-byte
/// inline-button cap.
#[async_trait]
pub trait ShortLinkStore: Send + Sync {
    /// Persist `code → payload` (idempotent for the same pair).
    async fn save_link(&self, code: &str, payload: &str) -> Result<(), FlatwatchError>;

    /// Resolve a code; `None` when unknown or expired.
    async fn resolve_link(&self, code: &str) -> Result<Option<String>, FlatwatchError>;
}
