//! Adapter for r.onliner.by via its apartment-search API.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use flatwatch_core::source::ListingSource;
use flatwatch_types::{FlatwatchError, Listing, SearchQuery};

use crate::dto;
use crate::http::HttpClient;
use crate::util::within_filters;

const BASE_URL: &str = "https://r.onliner.by";
const API_URL: &str = "https://r.onliner.by/sdapi/ak.api/search/apartments";

/// Geographic bounding box the API searches within.
struct Bounds {
    lb_lat: f64,
    lb_long: f64,
    rt_lat: f64,
    rt_long: f64,
}

/// Onliner search adapter. The API filters by map bounds rather than city
/// codes, so the adapter keeps a small box per supported city.
pub struct OnlinerSource {
    http: Arc<HttpClient>,
    api_url: String,
}

impl OnlinerSource {
    /// Build the adapter over the shared HTTP client.
    #[must_use]
    pub fn new(http: Arc<HttpClient>) -> Self {
        Self {
            http,
            api_url: API_URL.to_string(),
        }
    }

    /// Point the adapter at a different endpoint (tests).
    #[must_use]
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    fn city_bounds(slug: &str) -> Option<Bounds> {
        let b = match slug {
            "baranovichi" => Bounds {
                lb_lat: 53.05,
                lb_long: 25.90,
                rt_lat: 53.20,
                rt_long: 26.15,
            },
            "minsk" => Bounds {
                lb_lat: 53.80,
                lb_long: 27.40,
                rt_lat: 54.00,
                rt_long: 27.75,
            },
            "brest" => Bounds {
                lb_lat: 52.05,
                lb_long: 23.60,
                rt_lat: 52.15,
                rt_long: 23.85,
            },
            "grodno" => Bounds {
                lb_lat: 53.60,
                lb_long: 23.75,
                rt_lat: 53.75,
                rt_long: 23.92,
            },
            _ => return None,
        };
        Some(b)
    }

    fn search_url(&self, query: &SearchQuery, bounds: &Bounds) -> String {
        let mut url = format!(
            "{api}?bounds[lb][lat]={lb_lat}&bounds[lb][long]={lb_long}\
             &bounds[rt][lat]={rt_lat}&bounds[rt][long]={rt_long}\
             &currency=usd&page=1&limit=30",
            api = self.api_url,
            lb_lat = bounds.lb_lat,
            lb_long = bounds.lb_long,
            rt_lat = bounds.rt_lat,
            rt_long = bounds.rt_long,
        );
        if query.min_price > 0 {
            url.push_str(&format!("&price[min]={}", query.min_price));
        }
        if query.max_price < 100_000 {
            url.push_str(&format!("&price[max]={}", query.max_price));
        }
        for rooms in query.min_rooms..=query.max_rooms.min(4) {
            url.push_str(&format!("&number_of_rooms[{rooms}]=true"));
        }
        url
    }

    fn parse_apartment(apt: &Value) -> Option<Listing> {
        let apt_id = match apt.get("id") {
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::String(s)) => s.clone(),
            _ => return None,
        };

        let price = apt
            .get("price")
            .and_then(|p| p.get("converted"))
            .and_then(|c| c.get("USD"))
            .and_then(|u| u.get("amount"))
            .and_then(parse_amount)
            .unwrap_or(0);

        let rooms = apt
            .get("number_of_rooms")
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32;

        let area = match apt.get("area") {
            Some(Value::Object(_)) => apt
                .get("area")
                .and_then(|a| a.get("total"))
                .and_then(Value::as_f64)
                .unwrap_or(0.0),
            Some(v) => v.as_f64().unwrap_or(0.0),
            None => 0.0,
        };

        let location = apt.get("location");
        let mut address_parts = Vec::new();
        for field in ["address", "user_address"] {
            if let Some(part) = location
                .and_then(|l| l.get(field))
                .and_then(Value::as_str)
            {
                if !part.is_empty() {
                    address_parts.push(part.to_string());
                }
            }
        }
        let address = address_parts.join(", ");

        let mut photos = Vec::new();
        match apt.get("photo") {
            Some(Value::String(s)) if !s.is_empty() => photos.push(s.clone()),
            Some(Value::Array(items)) => {
                for item in items.iter().take(3) {
                    match item {
                        Value::String(s) => photos.push(s.clone()),
                        Value::Object(_) => {
                            if let Some(u) = item.get("url").and_then(Value::as_str) {
                                photos.push(u.to_string());
                            }
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }

        let mut url = apt
            .get("url")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{BASE_URL}/sale/apartments/{apt_id}"));
        if !url.starts_with("http") {
            url = crate::util::absolutize(BASE_URL, &url);
        }

        let year_built = apt
            .get("year")
            .or_else(|| apt.get("build_year"))
            .and_then(Value::as_i64)
            .filter(|y| (1900..=2100).contains(y))
            .map(|y| y.to_string())
            .unwrap_or_default();

        let listing = Listing {
            id: format!("onliner_{apt_id}"),
            source: "onliner".into(),
            title: format!("{rooms}-комн. квартира, {area} м²"),
            price,
            currency: "USD".into(),
            price_usd: price,
            rooms,
            area,
            address,
            url,
            photos,
            year_built,
            ..Listing::default()
        };

        dto::accept(&listing).then_some(listing)
    }
}

#[async_trait]
impl ListingSource for OnlinerSource {
    fn name(&self) -> &'static str {
        "onliner"
    }

    async fn fetch_listings(&self, query: &SearchQuery) -> Result<Vec<Listing>, FlatwatchError> {
        let Some(bounds) = Self::city_bounds(&query.city_slug) else {
            tracing::warn!(city = %query.city_slug, "onliner has no bounds for city, skipping");
            return Ok(Vec::new());
        };

        let url = self.search_url(query, &bounds);
        let Some(body) = self.http.fetch_json(&url, self.name()).await else {
            return Err(FlatwatchError::source(self.name(), "search api unreachable"));
        };

        let apartments = body
            .get("apartments")
            .or_else(|| body.get("items"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let listings: Vec<Listing> = apartments
            .iter()
            .filter_map(Self::parse_apartment)
            .filter(|l| within_filters(l, query))
            .collect();

        tracing::info!(count = listings.len(), "onliner batch parsed");
        Ok(listings)
    }
}

fn parse_amount(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_f64().map(|f| f as i64),
        Value::String(s) => s.parse::<f64>().ok().map(|f| f as i64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_usd_amount() {
        let apt = serde_json::json!({
            "id": 42,
            "price": {"converted": {"USD": {"amount": "50000.00"}}},
            "number_of_rooms": 2,
            "area": {"total": 45.0},
            "location": {"address": "Ленина 1", "user_address": "Барановичи"},
            "url": "https://r.onliner.by/sale/apartments/42",
            "photo": "https://content.onliner.by/42.jpg"
        });
        let l = OnlinerSource::parse_apartment(&apt).unwrap();
        assert_eq!(l.id, "onliner_42");
        assert_eq!(l.price_usd, 50_000);
        assert_eq!(l.rooms, 2);
        assert_eq!(l.address, "Ленина 1, Барановичи");
        assert_eq!(l.photos.len(), 1);
    }

    #[test]
    fn missing_id_is_skipped() {
        assert!(OnlinerSource::parse_apartment(&serde_json::json!({"price": 1})).is_none());
    }

    #[test]
    fn unknown_city_yields_no_bounds() {
        assert!(OnlinerSource::city_bounds("atlantis").is_none());
        assert!(OnlinerSource::city_bounds("baranovichi").is_some());
    }
}
