use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use flatwatch_core::storage::{
    DeliveredStore, DuplicateStats, ListingCacheStore, SeenStore, ShortLinkStore, SubscriberStore,
};
use flatwatch_core::{listing_content_hash, normalize};
use flatwatch_types::{
    CachedListing, DeliveredRecord, FilterRecord, FlatwatchError, Listing, ListingStatus,
    SearchQuery,
};

/// In-memory implementation of every storage trait.
///
/// Single-process, lock-per-table; behaviour mirrors the Postgres store
/// closely enough for dispatcher tests, and `fail_all(true)` simulates the
/// remote store being down so degrade paths can be exercised.
#[derive(Default)]
pub struct MemoryStore {
    cache: Mutex<HashMap<String, CachedListing>>,
    seen: Mutex<HashSet<(i64, String)>>,
    delivered: Mutex<Vec<DeliveredRecord>>,
    subscribers: Mutex<HashMap<i64, Option<FilterRecord>>>,
    links: Mutex<HashMap<String, String>>,
    failing: AtomicBool,
    cache_failing: AtomicBool,
}

impl MemoryStore {
    /// Fresh empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with a `Store` error (and back).
    pub fn fail_all(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Fail only the listing-cache table, leaving the rest healthy; used
    /// to exercise the read-through degrade path.
    pub fn fail_cache(&self, failing: bool) {
        self.cache_failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), FlatwatchError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(FlatwatchError::store("memory store marked down"))
        } else {
            Ok(())
        }
    }

    fn check_cache(&self) -> Result<(), FlatwatchError> {
        self.check()?;
        if self.cache_failing.load(Ordering::SeqCst) {
            Err(FlatwatchError::store("cache table marked down"))
        } else {
            Ok(())
        }
    }

    /// Listing ids currently cached (test assertions).
    #[must_use]
    pub fn cached_ids(&self) -> Vec<String> {
        self.cache
            .lock()
            .map(|c| c.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ListingCacheStore for MemoryStore {
    async fn cache_batch(
        &self,
        listings: &[Listing],
        default_city: &str,
    ) -> Result<usize, FlatwatchError> {
        self.check_cache()?;
        let now = Utc::now();
        let mut cache = self.cache.lock().map_err(|_| poisoned())?;
        for listing in listings {
            let city = normalize::city_from_address(&listing.address, default_city).to_string();
            let entry = cache.entry(listing.id.clone());
            match entry {
                std::collections::hash_map::Entry::Occupied(mut slot) => {
                    let row = slot.get_mut();
                    row.listing = listing.clone();
                    row.city = city;
                    row.content_hash = listing_content_hash(listing);
                    row.status = ListingStatus::Active;
                    row.last_seen_at = now;
                    row.updated_at = now;
                }
                std::collections::hash_map::Entry::Vacant(slot) => {
                    slot.insert(CachedListing {
                        listing: listing.clone(),
                        city,
                        content_hash: listing_content_hash(listing),
                        status: ListingStatus::Active,
                        first_seen_at: now,
                        last_seen_at: now,
                        updated_at: now,
                    });
                }
            }
        }
        Ok(listings.len())
    }

    async fn read_cache(
        &self,
        query: &SearchQuery,
        limit: u32,
    ) -> Result<Vec<CachedListing>, FlatwatchError> {
        self.check_cache()?;
        let cache = self.cache.lock().map_err(|_| poisoned())?;
        let mut rows: Vec<CachedListing> = cache
            .values()
            .filter(|row| {
                row.status == ListingStatus::Active
                    && row.city == query.city_slug
                    && row.listing.rooms >= query.min_rooms
                    && row.listing.rooms <= query.max_rooms
                    && row.listing.price >= query.min_price
                    && row.listing.price <= query.max_price
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.listing.id.cmp(&b.listing.id)));
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn mark_deleted(&self, listing_id: &str) -> Result<(), FlatwatchError> {
        self.check_cache()?;
        let mut cache = self.cache.lock().map_err(|_| poisoned())?;
        if let Some(row) = cache.get_mut(listing_id) {
            row.status = ListingStatus::Deleted;
            row.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn daily_sweep(&self) -> Result<u64, FlatwatchError> {
        self.check_cache()?;
        let mut cache = self.cache.lock().map_err(|_| poisoned())?;
        let cutoff = Utc::now() - chrono::Duration::days(7);
        let before = cache.len();
        cache.retain(|_, row| !(row.status == ListingStatus::Deleted && row.updated_at < cutoff));
        Ok((before - cache.len()) as u64)
    }
}

#[async_trait]
impl SeenStore for MemoryStore {
    async fn is_seen(&self, chat_id: i64, listing_id: &str) -> Result<bool, FlatwatchError> {
        self.check()?;
        let seen = self.seen.lock().map_err(|_| poisoned())?;
        Ok(seen.contains(&(chat_id, listing_id.to_string())))
    }

    async fn mark_seen(&self, chat_id: i64, listing_id: &str) -> Result<(), FlatwatchError> {
        self.check()?;
        let mut seen = self.seen.lock().map_err(|_| poisoned())?;
        seen.insert((chat_id, listing_id.to_string()));
        Ok(())
    }

    async fn clear_seen(&self, chat_id: i64) -> Result<u64, FlatwatchError> {
        self.check()?;
        let mut seen = self.seen.lock().map_err(|_| poisoned())?;
        let before = seen.len();
        seen.retain(|(id, _)| *id != chat_id);
        Ok((before - seen.len()) as u64)
    }

    async fn seen_count(&self, chat_id: i64) -> Result<u64, FlatwatchError> {
        self.check()?;
        let seen = self.seen.lock().map_err(|_| poisoned())?;
        Ok(seen.iter().filter(|(id, _)| *id == chat_id).count() as u64)
    }
}

#[async_trait]
impl DeliveredStore for MemoryStore {
    async fn is_delivered(&self, listing_id: &str) -> Result<bool, FlatwatchError> {
        self.check()?;
        let delivered = self.delivered.lock().map_err(|_| poisoned())?;
        Ok(delivered.iter().any(|r| r.listing_id == listing_id))
    }

    async fn find_by_hash(
        &self,
        content_hash: &str,
    ) -> Result<Option<DeliveredRecord>, FlatwatchError> {
        self.check()?;
        let delivered = self.delivered.lock().map_err(|_| poisoned())?;
        Ok(delivered
            .iter()
            .find(|r| r.content_hash == content_hash)
            .cloned())
    }

    async fn mark_delivered(&self, listing: &Listing) -> Result<(), FlatwatchError> {
        self.check()?;
        let mut delivered = self.delivered.lock().map_err(|_| poisoned())?;
        if delivered.iter().any(|r| r.listing_id == listing.id) {
            return Ok(());
        }
        delivered.push(DeliveredRecord {
            listing_id: listing.id.clone(),
            content_hash: listing_content_hash(listing),
            source: listing.source.clone(),
            url: listing.url.clone(),
            first_seen_at: Utc::now(),
        });
        Ok(())
    }

    async fn purge_older_than(&self, days: i64) -> Result<u64, FlatwatchError> {
        self.check()?;
        let cutoff = Utc::now() - chrono::Duration::days(days);
        let mut delivered = self.delivered.lock().map_err(|_| poisoned())?;
        let before = delivered.len();
        delivered.retain(|r| r.first_seen_at >= cutoff);
        Ok((before - delivered.len()) as u64)
    }

    async fn duplicate_stats(&self) -> Result<DuplicateStats, FlatwatchError> {
        self.check()?;
        let delivered = self.delivered.lock().map_err(|_| poisoned())?;
        let mut hashes: HashMap<&str, u64> = HashMap::new();
        let mut by_source: HashMap<String, u64> = HashMap::new();
        for record in delivered.iter() {
            *hashes.entry(record.content_hash.as_str()).or_default() += 1;
            *by_source.entry(record.source.clone()).or_default() += 1;
        }
        let mut by_source: Vec<(String, u64)> = by_source.into_iter().collect();
        by_source.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        Ok(DuplicateStats {
            total_delivered: delivered.len() as u64,
            unique_hashes: hashes.len() as u64,
            duplicate_groups: hashes.values().filter(|n| **n > 1).count() as u64,
            by_source,
        })
    }
}

#[async_trait]
impl SubscriberStore for MemoryStore {
    async fn upsert_subscriber(&self, chat_id: i64) -> Result<(), FlatwatchError> {
        self.check()?;
        let mut subs = self.subscribers.lock().map_err(|_| poisoned())?;
        subs.entry(chat_id).or_insert(None);
        Ok(())
    }

    async fn get_filter(&self, chat_id: i64) -> Result<Option<FilterRecord>, FlatwatchError> {
        self.check()?;
        let subs = self.subscribers.lock().map_err(|_| poisoned())?;
        Ok(subs.get(&chat_id).cloned().flatten())
    }

    async fn set_filter(&self, chat_id: i64, filter: &FilterRecord) -> Result<(), FlatwatchError> {
        self.check()?;
        let mut subs = self.subscribers.lock().map_err(|_| poisoned())?;
        subs.insert(chat_id, Some(filter.clone()));
        Ok(())
    }

    async fn set_active(&self, chat_id: i64, active: bool) -> Result<(), FlatwatchError> {
        self.check()?;
        let mut subs = self.subscribers.lock().map_err(|_| poisoned())?;
        if let Some(Some(filter)) = subs.get_mut(&chat_id) {
            filter.active = active;
        }
        Ok(())
    }

    async fn active_subscribers(&self) -> Result<Vec<i64>, FlatwatchError> {
        self.check()?;
        let subs = self.subscribers.lock().map_err(|_| poisoned())?;
        let mut ids: Vec<i64> = subs
            .iter()
            .filter_map(|(id, filter)| match filter {
                Some(f) if f.active => Some(*id),
                _ => None,
            })
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }
}

#[async_trait]
impl ShortLinkStore for MemoryStore {
    async fn save_link(&self, code: &str, payload: &str) -> Result<(), FlatwatchError> {
        self.check()?;
        let mut links = self.links.lock().map_err(|_| poisoned())?;
        links.insert(code.to_string(), payload.to_string());
        Ok(())
    }

    async fn resolve_link(&self, code: &str) -> Result<Option<String>, FlatwatchError> {
        self.check()?;
        let links = self.links.lock().map_err(|_| poisoned())?;
        Ok(links.get(code).cloned())
    }
}

fn poisoned() -> FlatwatchError {
    FlatwatchError::store("memory store lock poisoned")
}
