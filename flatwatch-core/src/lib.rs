//! flatwatch-core
//!
//! Traits and pure algorithms shared across the flatwatch ecosystem.
//!
//! - `source`: the `ListingSource` trait implemented by portal adapters.
//! - `storage`: seams between the dispatcher and the remote SQL store.
//! - `hash`: content hashes, near-duplicate signatures, short-link codes.
//! - `dedup`: batch-level duplicate removal.
//! - `matcher`: the per-subscriber filter evaluator.
//! - `score`: building groups and the brief-mode ranking.
//! - `normalize`: address normalisation and city extraction.
#![warn(missing_docs)]

pub mod dedup;
pub mod hash;
pub mod matcher;
pub mod normalize;
pub mod score;
pub mod source;
pub mod storage;

pub use flatwatch_types::{
    CachedListing, DeliveredRecord, DeliveryMode, FilterRecord, FlatwatchError, Listing,
    ListingStatus, SearchQuery, SellerFilter, SellerType, SourceKey,
};

pub use dedup::{dedupe_by_id, dedupe_by_signature, sort_by_price};
pub use hash::{content_hash, listing_content_hash, near_duplicate_signature, short_code};
pub use matcher::{matches, MatchLog};
pub use score::{build_groups, BuildingGroup, MAX_GROUPS_IN_SUMMARY};
pub use source::{DeliveredProbe, ListingSource};
pub use storage::{
    DeliveredStore, DuplicateStats, ListingCacheStore, ProbeOver, SeenStore, ShortLinkStore,
    SubscriberStore,
};
