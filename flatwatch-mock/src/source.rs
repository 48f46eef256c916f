use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use flatwatch_core::source::ListingSource;
use flatwatch_types::{FlatwatchError, Listing, SearchQuery};

enum Behavior {
    Listings(Vec<Listing>),
    Fail,
    Hang(Duration),
}

/// Mock portal adapter. Returns a fixed batch, a forced failure, or hangs
/// long enough to trip the aggregator's per-source timeout; records every
/// query it receives.
pub struct MockSource {
    name: &'static str,
    behavior: Behavior,
    queries: Mutex<Vec<SearchQuery>>,
}

impl MockSource {
    /// A source that returns the same batch on every fetch.
    #[must_use]
    pub fn with_listings(name: &'static str, listings: Vec<Listing>) -> Self {
        Self {
            name,
            behavior: Behavior::Listings(listings),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// A source that fails every fetch.
    #[must_use]
    pub fn failing(name: &'static str) -> Self {
        Self {
            name,
            behavior: Behavior::Fail,
            queries: Mutex::new(Vec::new()),
        }
    }

    /// A source that sleeps for `delay` before returning an empty batch.
    #[must_use]
    pub fn hanging(name: &'static str, delay: Duration) -> Self {
        Self {
            name,
            behavior: Behavior::Hang(delay),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Queries received so far, in order.
    #[must_use]
    pub fn received(&self) -> Vec<SearchQuery> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ListingSource for MockSource {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch_listings(&self, query: &SearchQuery) -> Result<Vec<Listing>, FlatwatchError> {
        if let Ok(mut queries) = self.queries.lock() {
            queries.push(query.clone());
        }
        match &self.behavior {
            Behavior::Listings(listings) => Ok(listings.clone()),
            Behavior::Fail => Err(FlatwatchError::source(self.name, "forced failure")),
            Behavior::Hang(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(Vec::new())
            }
        }
    }
}
