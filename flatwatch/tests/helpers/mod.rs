#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use flatwatch::aggregator::Aggregator;
use flatwatch::delivery::SendOutcome;
use flatwatch::dispatcher::{Courier, DispatchConfig, Dispatcher, Stores};
use flatwatch_core::score::BuildingGroup;
use flatwatch_core::source::ListingSource;
use flatwatch_mock::MemoryStore;
use flatwatch_types::{DeliveryMode, FilterRecord, Listing, SellerFilter};

/// Courier that records deliveries and can be scripted to close chats or
/// fail the first N sends.
#[derive(Default)]
pub struct RecordingCourier {
    pub listings: Mutex<Vec<(i64, String)>>,
    pub summaries: Mutex<Vec<(i64, Vec<(String, usize)>)>>,
    closed_chats: HashSet<i64>,
    fail_remaining: AtomicUsize,
}

impl RecordingCourier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn closing(chats: &[i64]) -> Self {
        Self {
            closed_chats: chats.iter().copied().collect(),
            ..Self::default()
        }
    }

    pub fn failing_first(n: usize) -> Self {
        Self {
            fail_remaining: AtomicUsize::new(n),
            ..Self::default()
        }
    }

    pub fn listing_ids(&self, chat_id: i64) -> Vec<String> {
        self.listings
            .lock()
            .map(|l| {
                l.iter()
                    .filter(|(chat, _)| *chat == chat_id)
                    .map(|(_, id)| id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn summary_count(&self) -> usize {
        self.summaries.lock().map(|s| s.len()).unwrap_or(0)
    }

    fn take_failure(&self) -> bool {
        self.fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Courier for RecordingCourier {
    async fn deliver_listing(&self, chat_id: i64, listing: &Listing) -> SendOutcome {
        if self.closed_chats.contains(&chat_id) {
            return SendOutcome::ChatClosed;
        }
        if self.take_failure() {
            return SendOutcome::Failed;
        }
        if let Ok(mut listings) = self.listings.lock() {
            listings.push((chat_id, listing.id.clone()));
        }
        SendOutcome::Ok
    }

    async fn deliver_summary(&self, chat_id: i64, groups: &[BuildingGroup]) -> SendOutcome {
        if self.closed_chats.contains(&chat_id) {
            return SendOutcome::ChatClosed;
        }
        if self.take_failure() {
            return SendOutcome::Failed;
        }
        if let Ok(mut summaries) = self.summaries.lock() {
            summaries.push((
                chat_id,
                groups
                    .iter()
                    .map(|g| (g.key.clone(), g.listings.len()))
                    .collect(),
            ));
        }
        SendOutcome::Ok
    }
}

pub fn baranovichi_filter(mode: DeliveryMode) -> FilterRecord {
    FilterRecord {
        city_slug: "baranovichi".into(),
        min_rooms: 1,
        max_rooms: 4,
        min_price: 40_000,
        max_price: 60_000,
        seller: SellerFilter::All,
        mode,
        active: true,
    }
}

pub fn stores_over(store: &Arc<MemoryStore>) -> Stores {
    Stores {
        cache: store.clone(),
        seen: store.clone(),
        delivered: store.clone(),
        subscribers: store.clone(),
        links: store.clone(),
    }
}

pub fn dispatcher_over(
    store: &Arc<MemoryStore>,
    sources: Vec<Arc<dyn ListingSource>>,
    courier: Arc<dyn Courier>,
) -> Dispatcher {
    let aggregator = Arc::new(
        Aggregator::builder()
            .with_sources(sources)
            .per_source_timeout(Duration::from_millis(500))
            .build()
            .unwrap(),
    );
    Dispatcher::new(
        stores_over(store),
        aggregator,
        courier,
        DispatchConfig {
            intra_batch_spacing: Duration::ZERO,
            ..DispatchConfig::default()
        },
    )
}
