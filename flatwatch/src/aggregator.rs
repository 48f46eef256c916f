//! Fan-out over the portal adapters with cross-source dedup and stable
//! ordering.

use std::sync::Arc;
use std::time::Duration;

use flatwatch_core::source::ListingSource;
use flatwatch_core::{dedupe_by_id, dedupe_by_signature, sort_by_price};
use flatwatch_types::{FlatwatchError, Listing, SearchQuery};

/// Orchestrator running every enabled adapter concurrently.
///
/// One adapter's failure or timeout is that adapter's problem alone: its
/// contribution becomes an empty batch and the rest of the run proceeds.
pub struct Aggregator {
    sources: Vec<Arc<dyn ListingSource>>,
    per_source_timeout: Duration,
    near_duplicate_dedup: bool,
}

/// Builder for an [`Aggregator`].
pub struct AggregatorBuilder {
    sources: Vec<Arc<dyn ListingSource>>,
    per_source_timeout: Duration,
    near_duplicate_dedup: bool,
}

impl Default for AggregatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AggregatorBuilder {
    /// Start with no sources, a 30 s per-source timeout and the
    /// near-duplicate pass enabled.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            per_source_timeout: Duration::from_secs(30),
            near_duplicate_dedup: true,
        }
    }

    /// Register a portal adapter. Fan-out order is registration order.
    #[must_use]
    pub fn with_source(mut self, source: Arc<dyn ListingSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Register several adapters at once.
    #[must_use]
    pub fn with_sources(mut self, sources: Vec<Arc<dyn ListingSource>>) -> Self {
        self.sources.extend(sources);
        self
    }

    /// Override the per-source timeout.
    #[must_use]
    pub const fn per_source_timeout(mut self, timeout: Duration) -> Self {
        self.per_source_timeout = timeout;
        self
    }

    /// Toggle the second-pass near-duplicate dedup.
    #[must_use]
    pub const fn near_duplicate_dedup(mut self, yes: bool) -> Self {
        self.near_duplicate_dedup = yes;
        self
    }

    /// Build the aggregator.
    ///
    /// # Errors
    /// Returns `InvalidFilter` when no sources were registered.
    pub fn build(self) -> Result<Aggregator, FlatwatchError> {
        if self.sources.is_empty() {
            return Err(FlatwatchError::invalid_filter(
                "no sources registered; add at least one via with_source(...)",
            ));
        }
        Ok(Aggregator {
            sources: self.sources,
            per_source_timeout: self.per_source_timeout,
            near_duplicate_dedup: self.near_duplicate_dedup,
        })
    }
}

impl Aggregator {
    /// Start building an aggregator.
    #[must_use]
    pub fn builder() -> AggregatorBuilder {
        AggregatorBuilder::new()
    }

    /// Names of the registered sources, in fan-out order.
    #[must_use]
    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Fetch from every source concurrently and return one deduplicated,
    /// price-sorted batch. Infallible by design: adapter errors and
    /// timeouts degrade to empty contributions.
    pub async fn fetch_all(&self, query: &SearchQuery) -> Vec<Listing> {
        let tasks = self.sources.iter().map(|source| {
            let source = Arc::clone(source);
            let query = query.clone();
            let timeout = self.per_source_timeout;
            async move {
                let name = source.name();
                match tokio::time::timeout(timeout, source.fetch_listings(&query)).await {
                    Ok(Ok(listings)) => {
                        tracing::info!(source = name, count = listings.len(), "source done");
                        listings
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(source = name, error = %e, "source failed");
                        Vec::new()
                    }
                    Err(_) => {
                        tracing::warn!(source = name, timeout_s = timeout.as_secs(), "source timed out");
                        Vec::new()
                    }
                }
            }
        });

        let results = futures::future::join_all(tasks).await;
        let merged: Vec<Listing> = results.into_iter().flatten().collect();
        let before = merged.len();

        let mut unique = dedupe_by_id(merged);
        if self.near_duplicate_dedup {
            unique = dedupe_by_signature(unique);
        }
        sort_by_price(&mut unique);

        tracing::info!(
            city = %query.city_slug,
            total = before,
            unique = unique.len(),
            "aggregation done"
        );
        unique
    }
}
