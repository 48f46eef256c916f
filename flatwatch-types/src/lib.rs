//! Flatwatch-specific data transfer objects shared across the workspace.
#![warn(missing_docs)]

mod cached;
mod error;
mod filters;
mod listing;
mod query;

pub use cached::{CachedListing, DeliveredRecord, ListingStatus};
pub use error::FlatwatchError;
pub use filters::{DeliveryMode, FilterRecord, SellerFilter, MAX_PRICE_SPAN_USD};
pub use listing::{Listing, SellerType};
pub use query::{SearchQuery, SourceKey};
