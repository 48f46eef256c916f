//! Parsing helpers shared by the portal adapters.

use flatwatch_types::{Listing, SearchQuery};

/// Hard cap on pages fetched per source per run.
pub const MAX_PAGES_PER_RUN: u32 = 2;

/// Listings per page the portals are asked for.
pub const PAGE_SIZE: u32 = 30;

/// Consecutive already-delivered listings that stop pagination.
pub const STOP_ON_OLD_THRESHOLD: u32 = 5;

/// Pull the digits out of a price string ("45 000 $" → 45000).
#[must_use]
pub fn parse_price(text: &str) -> i64 {
    let digits: String = text.chars().filter(char::is_ascii_digit).collect();
    digits.parse().unwrap_or(0)
}

/// Parse an area like "45,6 м²" into square metres.
#[must_use]
pub fn parse_area(text: &str) -> f64 {
    let cleaned = text.replace(',', ".");
    let mut number = String::new();
    for c in cleaned.chars() {
        if c.is_ascii_digit() || (c == '.' && !number.contains('.')) {
            number.push(c);
        } else if !number.is_empty() {
            break;
        }
    }
    number.parse().unwrap_or(0.0)
}

/// Parse the first integer out of a rooms string ("3-комн." → 3).
#[must_use]
pub fn parse_rooms(text: &str) -> u32 {
    let mut number = String::new();
    for c in text.chars() {
        if c.is_ascii_digit() {
            number.push(c);
        } else if !number.is_empty() {
            break;
        }
    }
    number.parse().unwrap_or(0)
}

/// Client-side re-check of the rooms/price window. Portals sometimes
/// ignore out-of-range URL filters, so every adapter applies this to its
/// parsed output regardless of what the URL asked for.
#[must_use]
pub fn within_filters(listing: &Listing, query: &SearchQuery) -> bool {
    if listing.rooms > 0 && (listing.rooms < query.min_rooms || listing.rooms > query.max_rooms) {
        return false;
    }
    if listing.price > 0 && (listing.price < query.min_price || listing.price > query.max_price) {
        return false;
    }
    true
}

/// Make a relative portal link absolute against the portal base URL.
#[must_use]
pub fn absolutize(base: &str, link: &str) -> String {
    if link.starts_with("http") {
        link.to_string()
    } else if link.starts_with("//") {
        format!("https:{link}")
    } else {
        format!("{}{}", base.trim_end_matches('/'), link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_strips_separators() {
        assert_eq!(parse_price("45 000 $"), 45_000);
        assert_eq!(parse_price("от 52,300"), 52_300);
        assert_eq!(parse_price("договорная"), 0);
    }

    #[test]
    fn area_handles_comma_decimal() {
        assert!((parse_area("45,6 м²") - 45.6).abs() < f64::EPSILON);
        assert!((parse_area("60 м²") - 60.0).abs() < f64::EPSILON);
        assert!(parse_area("—").abs() < f64::EPSILON);
    }

    #[test]
    fn rooms_takes_first_integer() {
        assert_eq!(parse_rooms("3-комн. квартира"), 3);
        assert_eq!(parse_rooms("студия"), 0);
    }

    #[test]
    fn absolutize_variants() {
        assert_eq!(absolutize("https://a.by", "/item/1"), "https://a.by/item/1");
        assert_eq!(absolutize("https://a.by", "//cdn/x"), "https://cdn/x");
        assert_eq!(absolutize("https://a.by", "https://b.by/1"), "https://b.by/1");
    }
}
