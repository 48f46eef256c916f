//! Adapter for re.kufar.by, the largest portal, via its search API.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::DateTime;
use serde_json::Value;

use flatwatch_core::source::{DeliveredProbe, ListingSource};
use flatwatch_types::{FlatwatchError, Listing, SearchQuery, SellerType};

use crate::dto;
use crate::http::HttpClient;
use crate::util::{within_filters, MAX_PAGES_PER_RUN, PAGE_SIZE, STOP_ON_OLD_THRESHOLD};

const BASE_URL: &str = "https://re.kufar.by";
const API_URL: &str = "https://api.kufar.by/search-api/v2/search/rendered-paginated";

/// Kufar search adapter.
///
/// Filters are encoded server-side (`rms`, `prc`) and re-checked
/// client-side; pagination follows the API's `next` token and stops early
/// once [`STOP_ON_OLD_THRESHOLD`] consecutive already-delivered ids appear.
pub struct KufarSource {
    http: Arc<HttpClient>,
    delivered: Option<Arc<dyn DeliveredProbe>>,
    api_url: String,
}

impl KufarSource {
    /// Build the adapter over the shared HTTP client.
    #[must_use]
    pub fn new(http: Arc<HttpClient>) -> Self {
        Self {
            http,
            delivered: None,
            api_url: API_URL.to_string(),
        }
    }

    /// Attach the delivered-set probe enabling the old-streak early stop.
    #[must_use]
    pub fn with_delivered_probe(mut self, probe: Arc<dyn DeliveredProbe>) -> Self {
        self.delivered = Some(probe);
        self
    }

    /// Point the adapter at a different endpoint (tests).
    #[must_use]
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    fn city_gtsy(slug: &str) -> Option<&'static str> {
        let gtsy = match slug {
            "baranovichi" => "country-belarus~province-brestskaja_oblast~locality-baranovichi",
            "brest" => "country-belarus~province-brestskaja_oblast~locality-brest",
            "pinsk" => "country-belarus~province-brestskaja_oblast~locality-pinsk",
            "minsk" => "country-belarus~province-minsk~locality-minsk",
            "gomel" => "country-belarus~province-gomelskaja_oblast~locality-gomel",
            "grodno" => "country-belarus~province-grodnenskaja_oblast~locality-grodno",
            "vitebsk" => "country-belarus~province-vitebskaja_oblast~locality-vitebsk",
            "mogilev" => "country-belarus~province-mogilevskaja_oblast~locality-mogilev",
            "orsha" => "country-belarus~province-vitebskaja_oblast~locality-orsha",
            _ => return None,
        };
        Some(gtsy)
    }

    fn search_url(&self, query: &SearchQuery, gtsy: &str, cursor: Option<&str>) -> String {
        let mut url = format!(
            "{api}?cat=1010&cur=USD&gtsy={gtsy}&lang=ru&typ=sell&sort=lst.d&size={PAGE_SIZE}",
            api = self.api_url
        );
        if query.min_rooms > 0 && query.max_rooms > 0 {
            let rooms: Vec<String> = (query.min_rooms..=query.max_rooms.min(5))
                .map(|r| r.to_string())
                .collect();
            if !rooms.is_empty() {
                url.push_str(&format!("&rms=v.or:{}", rooms.join(",")));
            }
        }
        if query.min_price > 0 || query.max_price < 1_000_000 {
            let lo = query.min_price.max(0);
            let hi = query.max_price.min(1_000_000);
            if hi > lo {
                url.push_str(&format!("&prc=r:{lo},{hi}"));
            }
        }
        if let Some(token) = cursor {
            url.push_str(&format!("&cursor={token}"));
        }
        url
    }

    async fn is_old(&self, listing_id: &str) -> bool {
        match &self.delivered {
            Some(probe) => probe.is_delivered(listing_id).await,
            None => false,
        }
    }

    fn parse_ad(ad: &Value, city_slug: &str) -> Option<Listing> {
        let ad_id = ad.get("ad_id").map(value_to_string)?;
        if ad_id.is_empty() {
            return None;
        }
        let id = format!("kufar_{ad_id}");

        let mut url = ad
            .get("ad_link")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if !url.is_empty() && !url.starts_with("http") {
            url = format!("{BASE_URL}{url}");
        }

        let params = AdParams::collect(ad);

        let rooms = params.int("rooms").unwrap_or(0).max(0) as u32;
        let area = params.float("size").unwrap_or(0.0);
        let kitchen_area = params.float("size_kitchen").unwrap_or(0.0);
        let living_area = params.float("size_living_space").unwrap_or(0.0);

        let total_floors = params.text("re_number_floors");
        let floor_val = params.text("floor");
        let floor = match (floor_val.is_empty(), total_floors.is_empty()) {
            (false, false) => format!("{floor_val}/{total_floors}"),
            (false, true) => floor_val.clone(),
            _ => String::new(),
        };

        let balcony = match params.raw("balcony") {
            Some("1") => "Есть".to_string(),
            Some("2") => "Нет".to_string(),
            _ => params.text("balcony"),
        };
        let bathroom = params.text("bathroom");
        let house_type = params.text("house_type");
        let renovation_state = {
            let repair = params.text("flat_repair");
            if repair.is_empty() {
                params.text("condition")
            } else {
                repair
            }
        };

        let year_built = params
            .int("year")
            .or_else(|| params.int("re_year"))
            .or_else(|| params.int("re_build_year"))
            .filter(|y| (1900..=2100).contains(y))
            .map(|y| y.to_string())
            .unwrap_or_default();

        // API prices come in cents/kopecks.
        let price_usd = ad
            .get("price_usd")
            .map(value_to_string)
            .and_then(|s| s.parse::<i64>().ok())
            .map(|c| c / 100)
            .unwrap_or(0);
        let price_byn = ad
            .get("price_byn")
            .map(value_to_string)
            .and_then(|s| s.parse::<i64>().ok())
            .map(|c| c / 100)
            .unwrap_or(0);
        let (price, currency) = if price_usd > 0 {
            (price_usd, "USD")
        } else {
            (price_byn, "BYN")
        };

        let mut address = String::new();
        if let Some(acc) = ad.get("account_parameters").and_then(Value::as_array) {
            for p in acc {
                if p.get("p").and_then(Value::as_str) == Some("address") {
                    address = p.get("v").map(value_to_string).unwrap_or_default();
                    break;
                }
            }
        }
        if address.is_empty() {
            let street = params.text("street_text");
            let house = params.text("house");
            if !street.is_empty() {
                address = street;
                if !house.is_empty() {
                    address.push_str(&format!(", {house}"));
                }
            }
        }
        if address.is_empty() {
            address = city_slug.to_string();
        }

        let created_at = ad
            .get("list_time")
            .and_then(parse_list_time)
            .unwrap_or_default();

        let description = ad
            .get("body_short")
            .or_else(|| ad.get("body"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string();

        let seller = match ad.get("company_ad").and_then(Value::as_bool) {
            Some(true) => SellerType::Company,
            Some(false) => SellerType::Owner,
            None => SellerType::Unknown,
        };

        let title = if rooms > 0 && area > 0.0 {
            format!("{rooms}-комн., {area} м²")
        } else {
            "Квартира".to_string()
        };

        let listing = Listing {
            id,
            source: "kufar".into(),
            title,
            price,
            currency: currency.into(),
            price_usd,
            price_byn,
            rooms,
            area,
            address,
            url,
            photos: Vec::new(),
            floor,
            total_floors,
            year_built,
            description,
            balcony,
            bathroom,
            house_type,
            renovation_state,
            kitchen_area,
            living_area,
            seller,
            created_at,
        };

        dto::accept(&listing).then_some(listing)
    }
}

#[async_trait]
impl ListingSource for KufarSource {
    fn name(&self) -> &'static str {
        "kufar"
    }

    async fn fetch_listings(&self, query: &SearchQuery) -> Result<Vec<Listing>, FlatwatchError> {
        let Some(gtsy) = Self::city_gtsy(&query.city_slug) else {
            tracing::warn!(city = %query.city_slug, "kufar has no city code, skipping");
            return Ok(Vec::new());
        };

        let mut listings = Vec::new();
        let mut cursor: Option<String> = None;
        let mut old_streak = 0u32;

        for page in 1..=MAX_PAGES_PER_RUN {
            let url = self.search_url(query, gtsy, cursor.as_deref());
            let Some(body) = self.http.fetch_json(&url, self.name()).await else {
                if page == 1 {
                    return Err(FlatwatchError::source(self.name(), "search api unreachable"));
                }
                break;
            };

            let ads = body
                .get("ads")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();

            let mut stop = false;
            for ad in &ads {
                let ad_id = ad.get("ad_id").map(value_to_string).unwrap_or_default();
                if ad_id.is_empty() {
                    continue;
                }
                if self.is_old(&format!("kufar_{ad_id}")).await {
                    old_streak += 1;
                    if old_streak >= STOP_ON_OLD_THRESHOLD {
                        tracing::info!(page, "old-ad streak reached, stopping pagination");
                        stop = true;
                        break;
                    }
                    continue;
                }
                old_streak = 0;

                if let Some(listing) = Self::parse_ad(ad, &query.city_slug) {
                    if within_filters(&listing, query) {
                        listings.push(listing);
                    }
                }
            }
            if stop {
                break;
            }

            cursor = next_page_token(&body);
            if cursor.is_none() {
                break;
            }
        }

        tracing::info!(count = listings.len(), "kufar batch parsed");
        Ok(listings)
    }
}

/// Flattened view over the API's `ad_parameters` array of `{p, v, vl}`.
struct AdParams {
    entries: Vec<(String, String, String)>,
}

impl AdParams {
    fn collect(ad: &Value) -> Self {
        let mut entries = Vec::new();
        if let Some(list) = ad.get("ad_parameters").and_then(Value::as_array) {
            for p in list {
                let name = p.get("p").map(value_to_string).unwrap_or_default();
                let value = p.get("v").map(value_to_string).unwrap_or_default();
                let label = p.get("vl").map(value_to_string).unwrap_or_default();
                entries.push((name, value, label));
            }
        }
        Self { entries }
    }

    fn raw(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _, _)| n == name)
            .map(|(_, v, _)| v.as_str())
    }

    /// Display label (`vl`) when present, raw value otherwise.
    fn text(&self, name: &str) -> String {
        self.entries
            .iter()
            .find(|(n, _, _)| n == name)
            .map(|(_, v, vl)| if vl.is_empty() { v.clone() } else { vl.clone() })
            .unwrap_or_default()
    }

    fn int(&self, name: &str) -> Option<i64> {
        self.raw(name)?.parse().ok()
    }

    fn float(&self, name: &str) -> Option<f64> {
        self.raw(name)?.replace(',', ".").parse().ok()
    }
}

/// Stringify the loose typing the API uses: numbers, strings and one-element
/// arrays all appear where scalars are documented.
fn value_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items.first().map(value_to_string).unwrap_or_default(),
        _ => String::new(),
    }
}

fn parse_list_time(v: &Value) -> Option<String> {
    let raw = value_to_string(v);
    if let Ok(ts) = raw.parse::<i64>() {
        let secs = if raw.len() > 10 { ts / 1000 } else { ts };
        return DateTime::from_timestamp(secs, 0).map(|dt| dt.format("%Y-%m-%d").to_string());
    }
    (!raw.is_empty()).then_some(raw)
}

fn next_page_token(body: &Value) -> Option<String> {
    let pages = body.get("pagination")?.get("pages")?.as_array()?;
    for page in pages {
        if page.get("label").and_then(Value::as_str) == Some("next") {
            return page.get("token").and_then(Value::as_str).map(str::to_string);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ad_params_prefer_label_over_raw() {
        let ad = serde_json::json!({
            "ad_parameters": [
                {"p": "bathroom", "v": "1", "vl": "Раздельный"},
                {"p": "rooms", "v": "2", "vl": ""},
                {"p": "floor", "v": [3], "vl": ""},
            ]
        });
        let params = AdParams::collect(&ad);
        assert_eq!(params.text("bathroom"), "Раздельный");
        assert_eq!(params.int("rooms"), Some(2));
        assert_eq!(params.text("floor"), "3");
    }

    #[test]
    fn prices_convert_from_cents() {
        let ad = serde_json::json!({
            "ad_id": 111,
            "ad_link": "/item/111",
            "price_usd": "5000000",
            "price_byn": "14750000",
            "company_ad": false,
            "account_parameters": [{"p": "address", "v": "Ленина 1"}],
            "ad_parameters": [
                {"p": "rooms", "v": "2", "vl": ""},
                {"p": "size", "v": "45", "vl": ""}
            ]
        });
        let listing = KufarSource::parse_ad(&ad, "baranovichi").unwrap();
        assert_eq!(listing.id, "kufar_111");
        assert_eq!(listing.price, 50_000);
        assert_eq!(listing.price_usd, 50_000);
        assert_eq!(listing.price_byn, 147_500);
        assert_eq!(listing.currency, "USD");
        assert_eq!(listing.seller, SellerType::Owner);
        assert_eq!(listing.url, "https://re.kufar.by/item/111");
    }

    #[test]
    fn ad_without_id_is_skipped() {
        let ad = serde_json::json!({"ad_link": "/item/x"});
        assert!(KufarSource::parse_ad(&ad, "minsk").is_none());
    }

    #[test]
    fn next_token_found_among_pages() {
        let body = serde_json::json!({
            "pagination": {"pages": [
                {"label": "prev", "token": "a"},
                {"label": "next", "token": "b"}
            ]}
        });
        assert_eq!(next_page_token(&body), Some("b".into()));
        assert_eq!(next_page_token(&serde_json::json!({})), None);
    }
}
