//! Building groups and the deterministic brief-mode ranking.
//!
//! Grouping buckets a candidate batch by normalised address; each group
//! gets a score blending price-per-m² against the batch median, dispersion
//! inside the building and the number of variants on offer.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use flatwatch_types::Listing;

use crate::normalize::normalize_address;

/// Most building groups a brief summary may show.
pub const MAX_GROUPS_IN_SUMMARY: usize = 5;

/// Soft cap on how much the variant count can contribute to a score.
const GROUP_COUNT_SOFT_CAP: usize = 6;

/// A set of listings sharing a normalised address, ranked for brief mode.
/// Derived and transient; never stored.
#[derive(Debug, Clone)]
pub struct BuildingGroup {
    /// Normalised-address grouping key.
    pub key: String,
    /// Display address taken from the first listing in the group.
    pub address: String,
    /// Listings in the group, in batch order.
    pub listings: Vec<Listing>,
    /// Ranking score; 0.0 when the group has no usable prices.
    pub score: f64,
    /// Median USD/m² within the group, when computable.
    pub house_ppm: Option<f64>,
    /// Median USD price within the group, when computable.
    pub median_price: Option<i64>,
}

fn usd_price(listing: &Listing) -> Option<i64> {
    if listing.price_usd > 0 {
        Some(listing.price_usd)
    } else if listing.currency == "USD" && listing.price > 0 {
        Some(listing.price)
    } else {
        None
    }
}

fn usd_ppm(listing: &Listing) -> Option<f64> {
    let price = usd_price(listing)?;
    if listing.area > 0.0 {
        Some(price as f64 / listing.area)
    } else {
        None
    }
}

fn median(values: &mut Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        Some((values[mid - 1] + values[mid]) / 2.0)
    }
}

fn score_group(group: &[Listing], market_ppm: f64) -> (f64, Option<f64>) {
    let mut ppms: Vec<f64> = group.iter().filter_map(usd_ppm).collect();
    let Some(house_ppm) = median(&mut ppms) else {
        return (0.0, None);
    };
    if house_ppm <= 0.0 || market_ppm <= 0.0 {
        return (0.0, Some(house_ppm));
    }

    let price_score = market_ppm / house_ppm;
    let delta_market = (market_ppm - house_ppm) / market_ppm;
    let dispersion = {
        let max = ppms.iter().copied().fold(f64::MIN, f64::max);
        let min = ppms.iter().copied().fold(f64::MAX, f64::min);
        (max - min) / house_ppm
    };
    let disp_score = (1.0 - dispersion).max(0.0);
    let count_score = group.len().min(GROUP_COUNT_SOFT_CAP) as f64 / GROUP_COUNT_SOFT_CAP as f64;

    let score = 0.45 * price_score + 0.25 * delta_market + 0.15 * disp_score + 0.15 * count_score;
    ((score * 10_000.0).round() / 10_000.0, Some(house_ppm))
}

/// Bucket a batch into building groups and rank them.
///
/// Behavior:
/// - groups are keyed by normalised address; listings with missing price or
///   area still count toward the group size but not its statistics;
/// - with fewer than 3 usable prices in the whole batch there is no market
///   reference: groups are ordered by ascending house USD/m² instead;
/// - singleton groups are dropped only when the summary would otherwise
///   exceed [`MAX_GROUPS_IN_SUMMARY`];
/// - ties break on larger group, then lower house USD/m², then address.
///
/// The result is ordered best-first; callers render the leading
/// `min(MAX_GROUPS_IN_SUMMARY, n)` entries.
#[must_use]
pub fn build_groups(batch: &[Listing]) -> Vec<BuildingGroup> {
    // BTreeMap keeps key iteration deterministic before scoring.
    let mut buckets: BTreeMap<String, Vec<Listing>> = BTreeMap::new();
    for listing in batch {
        buckets
            .entry(normalize_address(&listing.address))
            .or_default()
            .push(listing.clone());
    }

    let mut all_ppms: Vec<f64> = batch.iter().filter_map(usd_ppm).collect();
    let usable = all_ppms.len();
    let market_ppm = median(&mut all_ppms).unwrap_or(1.0);

    let mut groups: Vec<BuildingGroup> = buckets
        .into_iter()
        .map(|(key, listings)| {
            let (score, house_ppm) = if usable < 3 {
                let mut ppms: Vec<f64> = listings.iter().filter_map(usd_ppm).collect();
                (0.0, median(&mut ppms))
            } else {
                score_group(&listings, market_ppm)
            };
            let mut prices: Vec<f64> =
                listings.iter().filter_map(|l| usd_price(l).map(|p| p as f64)).collect();
            #[allow(clippy::cast_possible_truncation)]
            let median_price = median(&mut prices).map(|p| p as i64);
            let address = listings[0].address.clone();
            BuildingGroup {
                key,
                address,
                listings,
                score,
                house_ppm,
                median_price,
            }
        })
        .collect();

    if groups.len() > MAX_GROUPS_IN_SUMMARY {
        let kept: Vec<BuildingGroup> = groups
            .iter()
            .filter(|g| g.listings.len() > 1)
            .cloned()
            .collect();
        if !kept.is_empty() {
            groups = kept;
        }
    }

    if usable < 3 {
        // No market reference: cheapest building first, unpriced last.
        groups.sort_by(|a, b| cmp_fallback(a, b));
    } else {
        groups.sort_by(|a, b| cmp_scored(a, b));
    }
    groups
}

fn cmp_scored(a: &BuildingGroup, b: &BuildingGroup) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.listings.len().cmp(&a.listings.len()))
        .then_with(|| cmp_ppm(a.house_ppm, b.house_ppm))
        .then_with(|| a.key.cmp(&b.key))
}

fn cmp_fallback(a: &BuildingGroup, b: &BuildingGroup) -> Ordering {
    cmp_ppm(a.house_ppm, b.house_ppm)
        .then_with(|| b.listings.len().cmp(&a.listings.len()))
        .then_with(|| a.key.cmp(&b.key))
}

fn cmp_ppm(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(id: &str, address: &str, price_usd: i64, area: f64) -> Listing {
        Listing {
            id: id.into(),
            source: "kufar".into(),
            title: "t".into(),
            price: price_usd,
            price_usd,
            currency: "USD".into(),
            area,
            address: address.into(),
            url: format!("https://x/{id}"),
            ..Listing::default()
        }
    }

    #[test]
    fn cheaper_building_ranks_first() {
        let batch = vec![
            listing("a1", "Ленина 1", 40_000, 50.0),
            listing("a2", "Ленина 1", 41_000, 50.0),
            listing("b1", "Советская 9", 60_000, 50.0),
            listing("b2", "Советская 9", 61_000, 50.0),
        ];
        let groups = build_groups(&batch);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].key, "ленина 1");
        assert!(groups[0].score > groups[1].score);
    }

    #[test]
    fn ranking_is_deterministic() {
        let batch = vec![
            listing("a1", "Ленина 1", 40_000, 50.0),
            listing("b1", "Советская 9", 60_000, 50.0),
            listing("c1", "Мицкевича 3", 55_000, 50.0),
        ];
        let first = build_groups(&batch);
        let second = build_groups(&batch);
        let keys =
            |gs: &[BuildingGroup]| gs.iter().map(|g| g.key.clone()).collect::<Vec<_>>();
        assert_eq!(keys(&first), keys(&second));
    }

    #[test]
    fn unpriced_listings_count_toward_size_not_stats() {
        let mut no_price = listing("a3", "Ленина 1", 0, 0.0);
        no_price.price = 0;
        no_price.price_usd = 0;
        let batch = vec![
            listing("a1", "Ленина 1", 40_000, 50.0),
            listing("a2", "Ленина 1", 42_000, 50.0),
            no_price,
            listing("b1", "Советская 9", 41_000, 50.0),
        ];
        let groups = build_groups(&batch);
        let lenina = groups.iter().find(|g| g.key == "ленина 1").unwrap();
        assert_eq!(lenina.listings.len(), 3);
        assert_eq!(lenina.median_price, Some(41_000));
    }

    #[test]
    fn fewer_than_three_prices_falls_back_to_ppm_order() {
        let batch = vec![
            listing("a1", "Ленина 1", 60_000, 50.0),
            listing("b1", "Советская 9", 40_000, 50.0),
        ];
        let groups = build_groups(&batch);
        assert_eq!(groups[0].key, "советская 9");
        assert!(groups.iter().all(|g| g.score == 0.0));
    }

    #[test]
    fn singletons_dropped_only_when_over_cap() {
        let mut batch: Vec<Listing> = (0..7)
            .map(|i| listing(&format!("s{i}"), &format!("Дом {i}"), 40_000 + i, 50.0))
            .collect();
        batch.push(listing("p1", "Пушкина 2", 45_000, 50.0));
        batch.push(listing("p2", "Пушкина 2", 46_000, 50.0));
        let groups = build_groups(&batch);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].key, "пушкина 2");

        // Under the cap, singletons survive.
        let small = vec![
            listing("a1", "Ленина 1", 40_000, 50.0),
            listing("b1", "Советская 9", 41_000, 50.0),
            listing("b2", "Советская 9", 42_000, 50.0),
        ];
        assert_eq!(build_groups(&small).len(), 2);
    }
}
