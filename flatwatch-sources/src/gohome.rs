//! Adapter for gohome.by (HTML listing cards).

use std::sync::Arc;

use async_trait::async_trait;
use scraper::{Html, Selector};

use flatwatch_core::source::ListingSource;
use flatwatch_types::{FlatwatchError, Listing, SearchQuery};

use crate::dto;
use crate::http::HttpClient;
use crate::util::{absolutize, parse_area, parse_rooms, within_filters};

const BASE_URL: &str = "https://gohome.by";

/// GoHome adapter. The smallest portal; one HTML fetch, card anchors under
/// `/object/<id>`.
pub struct GohomeSource {
    http: Arc<HttpClient>,
    base_url: String,
}

impl GohomeSource {
    /// Build the adapter over the shared HTTP client.
    #[must_use]
    pub fn new(http: Arc<HttpClient>) -> Self {
        Self {
            http,
            base_url: BASE_URL.to_string(),
        }
    }

    /// Point the adapter at a different host (tests).
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    fn parse_page(&self, html: &str, query: &SearchQuery) -> Vec<Listing> {
        let doc = Html::parse_document(html);
        let Ok(anchors) = Selector::parse("a[href*='/object/']") else {
            return Vec::new();
        };

        let mut listings = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for a in doc.select(&anchors) {
            let href = a.value().attr("href").unwrap_or_default();
            let digits: String = href
                .split("/object/")
                .nth(1)
                .unwrap_or_default()
                .chars()
                .take_while(char::is_ascii_digit)
                .collect();
            if digits.is_empty() {
                continue;
            }
            let id = format!("gohome_{digits}");
            if !seen.insert(id.clone()) {
                continue;
            }

            let text = a.text().collect::<Vec<_>>().join(" ");
            let rooms = text
                .split_whitespace()
                .find(|w| w.contains("комн"))
                .map(|w| parse_rooms(w))
                .unwrap_or(0);
            let area = text
                .split_whitespace()
                .zip(text.split_whitespace().skip(1))
                .find(|(_, next)| next.starts_with("м²") || next.starts_with("кв.м"))
                .map(|(num, _)| parse_area(num))
                .unwrap_or(0.0);
            let price = usd_price(&text);

            let listing = Listing {
                id,
                source: "gohome".into(),
                title: if rooms > 0 {
                    format!("{rooms}-комн. квартира")
                } else {
                    "Квартира".to_string()
                },
                price,
                currency: "USD".into(),
                price_usd: price,
                rooms,
                area,
                address: query.city_slug.clone(),
                url: absolutize(&self.base_url, href),
                ..Listing::default()
            };

            if dto::accept(&listing) && within_filters(&listing, query) {
                listings.push(listing);
            }
        }
        listings
    }
}

#[async_trait]
impl ListingSource for GohomeSource {
    fn name(&self) -> &'static str {
        "gohome"
    }

    async fn fetch_listings(&self, query: &SearchQuery) -> Result<Vec<Listing>, FlatwatchError> {
        let url = format!("{}/sale/flats/{}", self.base_url, query.city_slug);
        let Some(html) = self.http.fetch_html(&url, self.name()).await else {
            return Err(FlatwatchError::source(self.name(), "search page unreachable"));
        };
        let listings = self.parse_page(&html, query);
        tracing::info!(count = listings.len(), "gohome batch parsed");
        Ok(listings)
    }
}

fn usd_price(text: &str) -> i64 {
    let Some(pos) = text.find('$') else {
        return 0;
    };
    let mut digits = String::new();
    for word in text[..pos].split_whitespace().rev() {
        if !word.is_empty() && word.chars().all(|c| c.is_ascii_digit()) {
            digits = format!("{word}{digits}");
        } else {
            break;
        }
    }
    digits.parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_card() {
        let html = r#"<a href="/object/777/">3-комн. 62 м² 48 000 $</a>"#;
        let source = GohomeSource::new(Arc::new(HttpClient::new()));
        let query = SearchQuery {
            city_slug: "baranovichi".into(),
            min_rooms: 1,
            max_rooms: 4,
            min_price: 0,
            max_price: 100_000,
        };
        let out = source.parse_page(html, &query);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "gohome_777");
        assert_eq!(out[0].rooms, 3);
        assert_eq!(out[0].price, 48_000);
    }
}
