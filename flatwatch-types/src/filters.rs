use serde::{Deserialize, Serialize};

use crate::FlatwatchError;

/// Widest allowed `max_price - min_price` span, enforced at accept time.
pub const MAX_PRICE_SPAN_USD: i64 = 20_000;

/// Room-count value meaning "no upper bound".
pub const ROOMS_UNBOUNDED: u32 = 99;

/// How results are delivered to a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// One summary message grouped by building, with expand actions.
    Brief,
    /// One detailed message per listing.
    #[default]
    Full,
}

impl DeliveryMode {
    /// Canonical lowercase label used in storage and callback payloads.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Brief => "brief",
            Self::Full => "full",
        }
    }

    /// Parse a stored/callback label; unknown labels fall back to `Full`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "brief" => Self::Brief,
            _ => Self::Full,
        }
    }
}

/// Seller-type restriction on a subscriber filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SellerFilter {
    /// Accept every seller kind.
    #[default]
    All,
    /// Drop agency listings; unknown sellers still pass.
    OwnerOnly,
}

impl SellerFilter {
    /// Canonical lowercase label used in storage and callback payloads.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::OwnerOnly => "owner",
        }
    }

    /// Parse a stored/callback label; unknown labels fall back to `All`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "owner" => Self::OwnerOnly,
            _ => Self::All,
        }
    }
}

/// Per-subscriber search configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRecord {
    /// Canonical city slug, resolved by the city lookup before storage.
    pub city_slug: String,
    /// Minimum room count, 1..=99.
    pub min_rooms: u32,
    /// Maximum room count, 1..=99 (99 = unbounded).
    pub max_rooms: u32,
    /// Minimum price in USD.
    pub min_price: i64,
    /// Maximum price in USD; span above `min_price` is capped.
    pub max_price: i64,
    /// Seller restriction.
    pub seller: SellerFilter,
    /// Delivery mode.
    pub mode: DeliveryMode,
    /// Whether scheduled ticks include this subscriber.
    pub active: bool,
}

impl Default for FilterRecord {
    fn default() -> Self {
        Self {
            city_slug: String::new(),
            min_rooms: 1,
            max_rooms: ROOMS_UNBOUNDED,
            min_price: 0,
            max_price: MAX_PRICE_SPAN_USD,
            seller: SellerFilter::All,
            mode: DeliveryMode::Full,
            active: true,
        }
    }
}

impl FilterRecord {
    /// Validate accept-time invariants.
    ///
    /// # Errors
    /// Returns `InvalidFilter` when the city slug is empty, bounds are
    /// inverted, room counts leave 1..=99, or the price span exceeds
    /// [`MAX_PRICE_SPAN_USD`].
    pub fn validate(&self) -> Result<(), FlatwatchError> {
        if self.city_slug.is_empty() {
            return Err(FlatwatchError::invalid_filter("city is not set"));
        }
        if self.min_rooms < 1 || self.max_rooms > ROOMS_UNBOUNDED {
            return Err(FlatwatchError::invalid_filter(format!(
                "rooms must stay within 1..={ROOMS_UNBOUNDED}"
            )));
        }
        if self.min_rooms > self.max_rooms {
            return Err(FlatwatchError::invalid_filter(format!(
                "min_rooms {} exceeds max_rooms {}",
                self.min_rooms, self.max_rooms
            )));
        }
        if self.min_price < 0 || self.min_price > self.max_price {
            return Err(FlatwatchError::invalid_filter(format!(
                "price range {}..{} is inverted or negative",
                self.min_price, self.max_price
            )));
        }
        if self.max_price - self.min_price > MAX_PRICE_SPAN_USD {
            return Err(FlatwatchError::invalid_filter(format!(
                "price span wider than {MAX_PRICE_SPAN_USD} USD"
            )));
        }
        Ok(())
    }

    /// Normalize free-form fields in place: the slug is lower-cased and
    /// trimmed so the round-trip through storage is stable.
    pub fn normalize(&mut self) {
        self.city_slug = self.city_slug.trim().to_lowercase();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> FilterRecord {
        FilterRecord {
            city_slug: "baranovichi".into(),
            min_rooms: 2,
            max_rooms: 3,
            min_price: 40_000,
            max_price: 60_000,
            ..FilterRecord::default()
        }
    }

    #[test]
    fn accepts_in_bounds_filter() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn rejects_inverted_rooms() {
        let f = FilterRecord {
            min_rooms: 4,
            max_rooms: 2,
            ..valid()
        };
        assert!(matches!(
            f.validate(),
            Err(FlatwatchError::InvalidFilter(_))
        ));
    }

    #[test]
    fn rejects_wide_price_span() {
        let f = FilterRecord {
            min_price: 0,
            max_price: MAX_PRICE_SPAN_USD + 1,
            ..valid()
        };
        assert!(f.validate().is_err());
    }

    #[test]
    fn span_boundary_is_accepted() {
        let f = FilterRecord {
            min_price: 10_000,
            max_price: 10_000 + MAX_PRICE_SPAN_USD,
            ..valid()
        };
        assert!(f.validate().is_ok());
    }

    #[test]
    fn normalize_lowercases_slug() {
        let mut f = valid();
        f.city_slug = "  Baranovichi ".into();
        f.normalize();
        assert_eq!(f.city_slug, "baranovichi");
    }
}
