//! Batch-level duplicate removal used by the aggregator.
//!
//! The per-subscriber seen-set and the global content-hash check live in
//! the dispatcher; this module only collapses duplicates inside a single
//! fetched batch.

use std::collections::{HashMap, HashSet};

use flatwatch_types::Listing;

use crate::hash::near_duplicate_signature;

/// Drop listings whose `id` already appeared earlier in the batch,
/// preserving first occurrence and relative order.
#[must_use]
pub fn dedupe_by_id(listings: Vec<Listing>) -> Vec<Listing> {
    let mut seen: HashSet<String> = HashSet::with_capacity(listings.len());
    listings
        .into_iter()
        .filter(|l| seen.insert(l.id.clone()))
        .collect()
}

/// Collapse near-duplicates: listings that share the building, seller kind,
/// price bucket, floor, area and leading-photos hash. Keeps the first
/// occurrence; logs which earlier id a dropped listing matched.
#[must_use]
pub fn dedupe_by_signature(listings: Vec<Listing>) -> Vec<Listing> {
    let total = listings.len();
    let mut seen: HashMap<String, String> = HashMap::new();
    let mut result = Vec::with_capacity(total);
    for listing in listings {
        let sig = near_duplicate_signature(&listing);
        match seen.get(&sig) {
            Some(prior) => {
                tracing::debug!(id = %listing.id, same_as = %prior, "near-duplicate dropped");
            }
            None => {
                seen.insert(sig, listing.id.clone());
                result.push(listing);
            }
        }
    }
    if result.len() < total {
        tracing::info!(
            removed = total - result.len(),
            total,
            "near-duplicate dedup collapsed batch"
        );
    }
    result
}

/// Aggregator output ordering: ascending price with zero-price (negotiable
/// or unknown) listings at the end. Stable, so equal prices keep their
/// source order.
pub fn sort_by_price(listings: &mut [Listing]) {
    listings.sort_by_key(|l| if l.price > 0 { l.price } else { i64::MAX });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(id: &str, price: i64) -> Listing {
        Listing {
            id: id.into(),
            source: "kufar".into(),
            title: "t".into(),
            price,
            currency: "USD".into(),
            url: format!("https://x/{id}"),
            ..Listing::default()
        }
    }

    #[test]
    fn id_dedup_keeps_first_occurrence() {
        let out = dedupe_by_id(vec![listing("a", 1), listing("b", 2), listing("a", 3)]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].price, 1);
    }

    #[test]
    fn signature_dedup_collapses_clones_across_sources() {
        let mut a = listing("kufar_1", 50_000);
        a.address = "Ленина 1".into();
        a.price_usd = 50_000;
        a.area = 45.0;
        let mut b = a.clone();
        b.id = "etagi_9".into();
        b.source = "etagi".into();
        b.price_usd = 50_200; // same ±500 bucket
        let out = dedupe_by_signature(vec![a, b]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "kufar_1");
    }

    #[test]
    fn sort_places_zero_price_last() {
        let mut batch = vec![listing("a", 0), listing("b", 30_000), listing("c", 10_000)];
        sort_by_price(&mut batch);
        let ids: Vec<&str> = batch.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
    }
}
