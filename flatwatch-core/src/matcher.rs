//! The per-subscriber filter evaluator.
//!
//! A pure predicate over `(listing, filter)`; the aggregator already
//! restricted the batch to the subscriber's city, so no city re-check
//! happens here.

use flatwatch_types::{FilterRecord, Listing, SellerFilter};

/// Decide whether a listing matches a subscriber filter.
///
/// Rules:
/// - rooms: unknown (`0`) passes; otherwise must sit in `[min, max]`;
/// - price: effective USD (see [`Listing::effective_usd`]) must sit in
///   `[min, max]` when known; `0` (negotiable) and unknown both pass;
/// - seller: `OwnerOnly` drops `Company`; `Unknown` passes.
///
/// Deterministic and order-independent for a given `(listing, filter)`.
#[must_use]
pub fn matches(listing: &Listing, filter: &FilterRecord, fx_byn_per_usd: f64) -> bool {
    if listing.rooms > 0
        && (listing.rooms < filter.min_rooms || listing.rooms > filter.max_rooms)
    {
        return false;
    }

    if let Some(usd) = listing.effective_usd(fx_byn_per_usd) {
        if usd > 0 && (usd < filter.min_price || usd > filter.max_price) {
            return false;
        }
    }

    if filter.seller == SellerFilter::OwnerOnly
        && listing.seller == flatwatch_types::SellerType::Company
    {
        return false;
    }

    true
}

/// Caps the evaluator's verbose output so one subscriber's run cannot
/// flood the log: the first 20 rejects and first 10 accepts are logged,
/// the rest only counted.
#[derive(Debug, Default)]
pub struct MatchLog {
    rejects: u32,
    accepts: u32,
}

impl MatchLog {
    const MAX_REJECT_LINES: u32 = 20;
    const MAX_ACCEPT_LINES: u32 = 10;

    /// Fresh per-run log budget.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a rejected listing.
    pub fn reject(&mut self, chat_id: i64, listing: &Listing) {
        self.rejects += 1;
        if self.rejects <= Self::MAX_REJECT_LINES {
            tracing::debug!(chat_id, id = %listing.id, price = listing.price, rooms = listing.rooms, "filter reject");
        }
    }

    /// Record an accepted listing.
    pub fn accept(&mut self, chat_id: i64, listing: &Listing) {
        self.accepts += 1;
        if self.accepts <= Self::MAX_ACCEPT_LINES {
            tracing::debug!(chat_id, id = %listing.id, price = listing.price, rooms = listing.rooms, "filter accept");
        }
    }

    /// Totals seen this run, `(accepts, rejects)`.
    #[must_use]
    pub const fn totals(&self) -> (u32, u32) {
        (self.accepts, self.rejects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flatwatch_types::{DeliveryMode, SellerType};

    const FX: f64 = 2.95;

    fn filter() -> FilterRecord {
        FilterRecord {
            city_slug: "baranovichi".into(),
            min_rooms: 2,
            max_rooms: 3,
            min_price: 50_000,
            max_price: 50_000,
            seller: SellerFilter::All,
            mode: DeliveryMode::Full,
            active: true,
        }
    }

    fn listing(rooms: u32, price_usd: i64) -> Listing {
        Listing {
            id: "kufar_1".into(),
            source: "kufar".into(),
            rooms,
            price: price_usd,
            price_usd,
            currency: "USD".into(),
            ..Listing::default()
        }
    }

    #[test]
    fn price_boundary_is_inclusive() {
        assert!(matches(&listing(2, 50_000), &filter(), FX));
        assert!(!matches(&listing(2, 49_999), &filter(), FX));
        assert!(!matches(&listing(2, 50_001), &filter(), FX));
    }

    #[test]
    fn zero_price_is_negotiable_and_passes() {
        assert!(matches(&listing(2, 0), &filter(), FX));
    }

    #[test]
    fn unknown_rooms_pass() {
        assert!(matches(&listing(0, 50_000), &filter(), FX));
        assert!(!matches(&listing(4, 50_000), &filter(), FX));
    }

    #[test]
    fn owner_only_drops_companies_keeps_unknown() {
        let f = FilterRecord {
            seller: SellerFilter::OwnerOnly,
            ..filter()
        };
        let mut l = listing(2, 50_000);
        l.seller = SellerType::Company;
        assert!(!matches(&l, &f, FX));
        l.seller = SellerType::Unknown;
        assert!(matches(&l, &f, FX));
        l.seller = SellerType::Owner;
        assert!(matches(&l, &f, FX));
    }

    #[test]
    fn byn_price_converts_before_comparison() {
        let mut l = listing(2, 0);
        l.price_usd = 0;
        l.currency = "BYN".into();
        l.price = 147_500;
        l.price_byn = 147_500; // 50 000 USD at 2.95
        assert!(matches(&l, &filter(), FX));
        l.price_byn = 200_000; // ~67 796 USD
        assert!(!matches(&l, &filter(), FX));
    }
}
