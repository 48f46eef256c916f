//! Per-subscriber dispatch: candidates → filter → dedup → delivery →
//! seen-set bookkeeping.
//!
//! Subscribers are processed sequentially; no error crosses a subscriber
//! boundary, and the seen/delivered sets are only written after an acked
//! delivery so an unacked send is retried next tick.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use flatwatch_core::score::{build_groups, BuildingGroup, MAX_GROUPS_IN_SUMMARY};
use flatwatch_core::storage::{
    DeliveredStore, ListingCacheStore, SeenStore, ShortLinkStore, SubscriberStore,
};
use flatwatch_core::{listing_content_hash, matcher, MatchLog};
use flatwatch_types::{DeliveryMode, Listing, SearchQuery};

use crate::aggregator::Aggregator;
use crate::delivery::SendOutcome;

/// The storage handles the dispatcher works against.
#[derive(Clone)]
pub struct Stores {
    /// Listing cache (read-through / write-through).
    pub cache: Arc<dyn ListingCacheStore>,
    /// Per-subscriber seen set.
    pub seen: Arc<dyn SeenStore>,
    /// Global delivered set.
    pub delivered: Arc<dyn DeliveredStore>,
    /// Subscribers and their filters.
    pub subscribers: Arc<dyn SubscriberStore>,
    /// Short-link storage for callback payloads.
    pub links: Arc<dyn ShortLinkStore>,
}

/// Delivery seam the dispatcher hands survivors to. The production
/// implementation renders and sends through the rate-limited messenger;
/// tests record.
#[async_trait]
pub trait Courier: Send + Sync {
    /// Deliver one listing (full mode).
    async fn deliver_listing(&self, chat_id: i64, listing: &Listing) -> SendOutcome;

    /// Deliver one grouped summary (brief mode).
    async fn deliver_summary(&self, chat_id: i64, groups: &[BuildingGroup]) -> SendOutcome;
}

/// Dispatcher tunables.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// BYN per USD for the filter evaluator.
    pub fx_rate_byn_usd: f64,
    /// Rows requested from the cache per run.
    pub cache_read_limit: u32,
    /// Below this many cached rows the dispatcher goes live.
    pub cache_min_rows: usize,
    /// Pause between two full-mode deliveries to one subscriber.
    pub intra_batch_spacing: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            fx_rate_byn_usd: 2.95,
            cache_read_limit: 200,
            cache_min_rows: 10,
            intra_batch_spacing: Duration::from_secs(1),
        }
    }
}

/// What one subscriber run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchReport {
    /// Listings delivered and acked (distinct ids for brief mode).
    pub sent: usize,
    /// Whether the run flipped the subscriber inactive (chat closed).
    pub deactivated: bool,
}

/// Ties the aggregation pipeline to per-subscriber delivery.
pub struct Dispatcher {
    stores: Stores,
    aggregator: Arc<Aggregator>,
    courier: Arc<dyn Courier>,
    cfg: DispatchConfig,
}

impl Dispatcher {
    /// Build a dispatcher.
    #[must_use]
    pub fn new(
        stores: Stores,
        aggregator: Arc<Aggregator>,
        courier: Arc<dyn Courier>,
        cfg: DispatchConfig,
    ) -> Self {
        Self {
            stores,
            aggregator,
            courier,
            cfg,
        }
    }

    /// One scheduled tick: every active subscriber, sequentially. A broken
    /// subscriber never prevents the rest from being served.
    pub async fn run_all(&self) {
        let subscribers = match self.stores.subscribers.active_subscribers().await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(error = %e, "cannot list subscribers, skipping tick");
                return;
            }
        };
        tracing::info!(count = subscribers.len(), "tick over active subscribers");
        for chat_id in subscribers {
            let report = self.run_for_subscriber(chat_id).await;
            tracing::info!(chat_id, sent = report.sent, "subscriber served");
        }
    }

    /// One subscriber run. Infallible by design; failures degrade and log.
    pub async fn run_for_subscriber(&self, chat_id: i64) -> DispatchReport {
        let filter = match self.stores.subscribers.get_filter(chat_id).await {
            Ok(Some(filter)) => filter,
            Ok(None) => {
                tracing::debug!(chat_id, "no filter yet, skipping");
                return DispatchReport::default();
            }
            Err(e) => {
                tracing::warn!(chat_id, error = %e, "filter read failed, skipping");
                return DispatchReport::default();
            }
        };
        if !filter.active {
            return DispatchReport::default();
        }
        if let Err(reason) = filter.validate() {
            tracing::info!(chat_id, %reason, "invalid filter, skipping");
            return DispatchReport::default();
        }

        let query = SearchQuery::from_filter(&filter);
        let candidates = self.candidates(&query).await;

        let mut log = MatchLog::new();
        let mut matched = Vec::new();
        for listing in candidates {
            if matcher::matches(&listing, &filter, self.cfg.fx_rate_byn_usd) {
                log.accept(chat_id, &listing);
                matched.push(listing);
            } else {
                log.reject(chat_id, &listing);
            }
        }
        let (accepts, rejects) = log.totals();
        tracing::info!(chat_id, accepts, rejects, "filter evaluated");

        let survivors = self.drop_seen(chat_id, matched).await;
        if survivors.is_empty() {
            return DispatchReport::default();
        }

        match filter.mode {
            DeliveryMode::Brief => self.deliver_brief(chat_id, &survivors).await,
            DeliveryMode::Full => self.deliver_full(chat_id, &survivors).await,
        }
    }

    /// Cache read-through: the cache is authoritative when it returns
    /// enough rows; otherwise fall through to a live fan-out and
    /// write-through the result (best effort).
    async fn candidates(&self, query: &SearchQuery) -> Vec<Listing> {
        let cached = match self
            .stores
            .cache
            .read_cache(query, self.cfg.cache_read_limit)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(error = %e, "cache read failed, going live");
                Vec::new()
            }
        };
        if cached.len() >= self.cfg.cache_min_rows {
            return cached.into_iter().map(|row| row.listing).collect();
        }

        let live = self.aggregator.fetch_all(query).await;
        if !live.is_empty() {
            if let Err(e) = self
                .stores
                .cache
                .cache_batch(&live, &query.city_slug)
                .await
            {
                tracing::warn!(error = %e, "write-through failed, continuing");
            }
        }
        live
    }

    /// Dedup layer 1: the per-subscriber seen set. Store errors degrade
    /// towards delivering: the accepted trade-off is a rare duplicate,
    /// not a silent loss.
    async fn drop_seen(&self, chat_id: i64, listings: Vec<Listing>) -> Vec<Listing> {
        let mut survivors = Vec::with_capacity(listings.len());
        for listing in listings {
            match self.stores.seen.is_seen(chat_id, &listing.id).await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => tracing::warn!(chat_id, error = %e, "seen check failed"),
            }
            survivors.push(listing);
        }
        survivors
    }

    /// Dedup layer 2: the global content hash, consulted per listing at
    /// delivery time so the second clone inside one batch is caught once
    /// the first is acked. Brief mode bypasses this layer entirely.
    async fn is_content_duplicate(&self, listing: &Listing) -> bool {
        let hash = listing_content_hash(listing);
        match self.stores.delivered.find_by_hash(&hash).await {
            Ok(Some(prior)) if prior.listing_id != listing.id => {
                tracing::info!(
                    id = %listing.id,
                    duplicate_of = %prior.listing_id,
                    prior_source = %prior.source,
                    "content-hash duplicate skipped"
                );
                true
            }
            Ok(_) => false,
            Err(e) => {
                tracing::warn!(error = %e, "hash lookup failed");
                false
            }
        }
    }

    async fn deliver_brief(&self, chat_id: i64, survivors: &[Listing]) -> DispatchReport {
        let groups = build_groups(survivors);
        let shown: Vec<BuildingGroup> = groups
            .into_iter()
            .take(MAX_GROUPS_IN_SUMMARY)
            .collect();
        if shown.is_empty() {
            return DispatchReport::default();
        }

        match self.courier.deliver_summary(chat_id, &shown).await {
            SendOutcome::Ok => {
                let mut sent = 0usize;
                for group in &shown {
                    for listing in &group.listings {
                        self.ack(chat_id, listing).await;
                        sent += 1;
                    }
                }
                DispatchReport {
                    sent,
                    deactivated: false,
                }
            }
            SendOutcome::ChatClosed => self.deactivate(chat_id).await,
            SendOutcome::Failed => {
                tracing::warn!(chat_id, "summary delivery failed, will retry next tick");
                DispatchReport::default()
            }
        }
    }

    async fn deliver_full(&self, chat_id: i64, survivors: &[Listing]) -> DispatchReport {
        let mut sent = 0usize;
        for listing in survivors {
            if self.is_content_duplicate(listing).await {
                continue;
            }
            if sent > 0 && !self.cfg.intra_batch_spacing.is_zero() {
                tokio::time::sleep(self.cfg.intra_batch_spacing).await;
            }
            match self.courier.deliver_listing(chat_id, listing).await {
                SendOutcome::Ok => {
                    self.ack(chat_id, listing).await;
                    sent += 1;
                }
                SendOutcome::ChatClosed => {
                    let mut report = self.deactivate(chat_id).await;
                    report.sent = sent;
                    return report;
                }
                SendOutcome::Failed => {
                    tracing::warn!(chat_id, id = %listing.id, "delivery failed, not acking");
                }
            }
        }
        DispatchReport {
            sent,
            deactivated: false,
        }
    }

    /// Record an acked delivery in both sets before the next send goes
    /// out. Failures are logged; the next tick may then redeliver, which
    /// is the accepted trade-off.
    async fn ack(&self, chat_id: i64, listing: &Listing) {
        if let Err(e) = self.stores.seen.mark_seen(chat_id, &listing.id).await {
            tracing::warn!(chat_id, id = %listing.id, error = %e, "seen-set write failed");
        }
        if let Err(e) = self.stores.delivered.mark_delivered(listing).await {
            tracing::warn!(id = %listing.id, error = %e, "delivered-set write failed");
        }
    }

    async fn deactivate(&self, chat_id: i64) -> DispatchReport {
        if let Err(e) = self.stores.subscribers.set_active(chat_id, false).await {
            tracing::warn!(chat_id, error = %e, "deactivation write failed");
        } else {
            tracing::info!(chat_id, "subscriber deactivated (chat closed)");
        }
        DispatchReport {
            sent: 0,
            deactivated: true,
        }
    }
}
