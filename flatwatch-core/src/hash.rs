//! MD5-derived identities: the cross-source content hash, the
//! near-duplicate signature and short-link codes.

use md5::{Digest, Md5};

use flatwatch_types::Listing;

use crate::normalize::normalize_address;

fn md5_hex(input: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Cross-source identity of an apartment: a 16-hex digest over
/// `(rooms, round(area), normalized_address, price bucketed to 1000)`.
///
/// The same flat cross-posted to two portals hashes identically as long as
/// the portals agree on rooms, area and street address.
#[must_use]
pub fn content_hash(rooms: u32, area: f64, address: &str, price: i64) -> String {
    let norm_address = normalize_address(address);
    #[allow(clippy::cast_possible_truncation)]
    let norm_area = area as i64;
    let price_bucket = price / 1000 * 1000;
    let data = format!("{rooms}:{norm_area}:{norm_address}:{price_bucket}");
    md5_hex(&data)[..16].to_string()
}

/// [`content_hash`] over a listing's own fields.
#[must_use]
pub fn listing_content_hash(listing: &Listing) -> String {
    content_hash(listing.rooms, listing.area, &listing.address, listing.price)
}

/// Signature of the first three photo URLs, or `None` without photos.
/// Thumbnail vs full-size equivalence is not attempted.
#[must_use]
pub fn photos_signature(photos: &[String]) -> Option<String> {
    if photos.is_empty() {
        return None;
    }
    let sample = photos
        .iter()
        .take(3)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("|");
    Some(md5_hex(&sample))
}

/// Near-duplicate signature used by the aggregator's second dedup pass:
/// same building, same seller kind, same ±500 USD price bucket, same floor,
/// same total area, same leading-photos hash collapse to one signature.
#[must_use]
pub fn near_duplicate_signature(listing: &Listing) -> String {
    let addr = normalize_address(&listing.address);
    let price = if listing.price_usd > 0 {
        ((listing.price_usd as f64 / 500.0).round() as i64 * 500).to_string()
    } else {
        "V?".to_string()
    };
    let floor = if listing.floor.is_empty() {
        "F?"
    } else {
        listing.floor.as_str()
    };
    #[allow(clippy::cast_possible_truncation)]
    let area = if listing.area > 0.0 {
        (listing.area as i64).to_string()
    } else {
        "A?".to_string()
    };
    let photos = photos_signature(&listing.photos).unwrap_or_else(|| "P?".to_string());
    let key = format!(
        "{addr}|{vendor}|{price}|{floor}|{area}|{photos}",
        vendor = listing.seller.as_str()
    );
    md5_hex(&key)
}

/// Deterministic 12-hex code for a callback payload stored in the
/// short-link table; the same payload always maps to the same code.
#[must_use]
pub fn short_code(payload: &str) -> String {
    md5_hex(payload)[..12].to_string()
}
