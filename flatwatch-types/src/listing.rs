use serde::{Deserialize, Serialize};

/// Who is selling the apartment, as far as the portal tells us.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SellerType {
    /// Listed by the owner directly.
    Owner,
    /// Listed by an agency or developer.
    Company,
    /// The portal does not say.
    #[default]
    Unknown,
}

impl SellerType {
    /// Canonical lowercase label used in storage and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Company => "company",
            Self::Unknown => "unknown",
        }
    }

    /// Parse a stored label back into the variant; anything unrecognised is
    /// `Unknown`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "owner" => Self::Owner,
            "company" => Self::Company,
            _ => Self::Unknown,
        }
    }
}

/// One apartment-for-sale ad from one portal, normalized to a single schema.
///
/// Identity is `id = "<source>_<native_id>"` and is stable across runs.
/// `rooms == 0` and `area == 0.0` mean "unknown"; `price == 0` means
/// "negotiable" on some portals and "unknown" on others — downstream code
/// treats both the same (passes price filters, sorts last).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Listing {
    /// Stable cross-run identity: `<source>_<source_native_id>`.
    pub id: String,
    /// Adapter tag, e.g. "kufar", "onliner".
    pub source: String,
    /// Portal-supplied title.
    pub title: String,
    /// Price in the portal's primary currency.
    pub price: i64,
    /// Primary currency code, "USD" or "BYN".
    pub currency: String,
    /// Price in USD when the portal supplies it (0 = unset).
    pub price_usd: i64,
    /// Price in BYN when the portal supplies it (0 = unset).
    pub price_byn: i64,
    /// Room count (0 = unknown).
    pub rooms: u32,
    /// Total area in m² (0.0 = unknown).
    pub area: f64,
    /// Free-text address as the portal renders it.
    pub address: String,
    /// Canonical listing URL on the portal.
    pub url: String,
    /// Photo URLs in portal order.
    pub photos: Vec<String>,
    /// Floor as `"n/N"` when known, empty otherwise.
    pub floor: String,
    /// Total floors in the building, empty when unknown.
    pub total_floors: String,
    /// Year the building was built, empty when unknown.
    pub year_built: String,
    /// Portal description text (may be empty).
    pub description: String,
    /// Balcony/loggia note, empty when unknown.
    pub balcony: String,
    /// Bathroom kind (separate/combined), empty when unknown.
    pub bathroom: String,
    /// House construction type (brick/panel/monolith), empty when unknown.
    pub house_type: String,
    /// Renovation state, empty when unknown.
    pub renovation_state: String,
    /// Kitchen area in m² (0.0 = unknown).
    pub kitchen_area: f64,
    /// Living area in m² (0.0 = unknown).
    pub living_area: f64,
    /// Seller kind as reported by the portal.
    pub seller: SellerType,
    /// Best-effort source-reported posting date (`YYYY-MM-DD` or empty).
    pub created_at: String,
}

impl Listing {
    /// Derived price per m² in the primary currency, or `None` when either
    /// price or area is unknown.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn price_per_sqm(&self) -> Option<i64> {
        if self.price > 0 && self.area > 0.0 {
            Some((self.price as f64 / self.area) as i64)
        } else {
            None
        }
    }

    /// Effective price in USD for filter evaluation.
    ///
    /// Prefers an explicit `price_usd`, then converts `price_byn` with the
    /// given rate, then falls back to `price` when the primary currency is
    /// already USD. Returns `None` when no USD figure can be derived; zero
    /// means "negotiable" and is returned as `Some(0)`.
    #[must_use]
    pub fn effective_usd(&self, fx_byn_per_usd: f64) -> Option<i64> {
        if self.price_usd > 0 {
            return Some(self.price_usd);
        }
        if self.price_byn > 0 && fx_byn_per_usd > 0.0 {
            #[allow(clippy::cast_possible_truncation)]
            return Some((self.price_byn as f64 / fx_byn_per_usd) as i64);
        }
        if self.currency == "USD" {
            return Some(self.price);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_per_sqm_requires_both_fields() {
        let mut l = Listing {
            price: 50_000,
            area: 50.0,
            ..Listing::default()
        };
        assert_eq!(l.price_per_sqm(), Some(1000));
        l.area = 0.0;
        assert_eq!(l.price_per_sqm(), None);
    }

    #[test]
    fn effective_usd_prefers_explicit_then_converts() {
        let mut l = Listing {
            price: 160_000,
            currency: "BYN".into(),
            price_byn: 160_000,
            ..Listing::default()
        };
        assert_eq!(l.effective_usd(2.95), Some(54_237));
        l.price_usd = 55_000;
        assert_eq!(l.effective_usd(2.95), Some(55_000));
    }

    #[test]
    fn effective_usd_falls_back_to_primary_usd() {
        let l = Listing {
            price: 42_000,
            currency: "USD".into(),
            ..Listing::default()
        };
        assert_eq!(l.effective_usd(2.95), Some(42_000));
    }

    #[test]
    fn effective_usd_zero_price_is_negotiable() {
        let l = Listing {
            currency: "USD".into(),
            ..Listing::default()
        };
        assert_eq!(l.effective_usd(2.95), Some(0));
    }
}
