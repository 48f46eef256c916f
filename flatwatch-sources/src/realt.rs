//! Adapter for realt.by (HTML listing cards).

use std::sync::Arc;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};

use flatwatch_core::source::ListingSource;
use flatwatch_types::{FlatwatchError, Listing, SearchQuery, SellerType};

use crate::dto;
use crate::http::HttpClient;
use crate::util::{absolutize, parse_area, parse_rooms, within_filters};

const BASE_URL: &str = "https://realt.by";

/// Realt.by adapter. The portal renders full listing cards inside the
/// search page; one fetch per run, no pagination (newest listings are on
/// page one and the old-streak logic in richer adapters bounds the rest).
pub struct RealtSource {
    http: Arc<HttpClient>,
    base_url: String,
}

impl RealtSource {
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

    fn search_url(&self, query: &SearchQuery) -> String {
        let mut url = format!("{}/sale/flats/{}/", self.base_url, query.city_slug);
        let mut sep = '?';
        if query.min_price > 0 {
            url.push(sep);
            url.push_str(&format!("price_min={}", query.min_price));
            sep = '&';
        }
        if query.max_price < 100_000 {
            url.push(sep);
            url.push_str(&format!("price_max={}", query.max_price));
        }
        url
    }

    fn parse_page(&self, html: &str, query: &SearchQuery) -> Vec<Listing> {
        let doc = Html::parse_document(html);
        let Ok(anchors) = Selector::parse("a[href*='/object/']") else {
            return Vec::new();
        };
        let img_sel = Selector::parse("img[src]").ok();

        let mut listings = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for a in doc.select(&anchors) {
            let href = a.value().attr("href").unwrap_or_default();
            let Some(native_id) = object_id(href) else {
                continue;
            };
            let id = format!("realt_{native_id}");
            if !seen.insert(id.clone()) {
                continue;
            }

            let text = a.text().collect::<Vec<_>>().join(" ");
            let rooms = rooms_from_text(&text);
            let area = area_from_text(&text);
            let price = price_from_text(&text);

            let seller = if text.contains("Агентство") || text.contains("агентство") {
                SellerType::Company
            } else if text.contains("Собственник") || text.contains("собственник") {
                SellerType::Owner
            } else {
                SellerType::Unknown
            };

            let photos = img_sel
                .as_ref()
                .and_then(|sel| a.select(sel).next())
                .and_then(photo_url)
                .into_iter()
                .collect();

            let listing = Listing {
                id,
                source: "realt".into(),
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
                address: address_from_text(&text, &query.city_slug),
                url: absolutize(&self.base_url, href),
                photos,
                seller,
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
impl ListingSource for RealtSource {
    fn name(&self) -> &'static str {
        "realt"
    }

    async fn fetch_listings(&self, query: &SearchQuery) -> Result<Vec<Listing>, FlatwatchError> {
        let url = self.search_url(query);
        let Some(html) = self.http.fetch_html(&url, self.name()).await else {
            return Err(FlatwatchError::source(self.name(), "search page unreachable"));
        };
        let listings = self.parse_page(&html, query);
        tracing::info!(count = listings.len(), "realt batch parsed");
        Ok(listings)
    }
}

fn object_id(href: &str) -> Option<String> {
    let tail = href.split("/object/").nth(1)?;
    let digits: String = tail.chars().take_while(char::is_ascii_digit).collect();
    (!digits.is_empty()).then_some(digits)
}

fn rooms_from_text(text: &str) -> u32 {
    text.split_whitespace()
        .find(|w| w.contains("комн"))
        .map(|w| parse_rooms(w))
        .unwrap_or(0)
}

fn area_from_text(text: &str) -> f64 {
    for (i, word) in text.split_whitespace().enumerate() {
        if word.starts_with("м²") {
            let words: Vec<&str> = text.split_whitespace().collect();
            if i > 0 {
                return parse_area(words[i - 1]);
            }
        }
    }
    0.0
}

fn price_from_text(text: &str) -> i64 {
    // Card prices render as "45 000 $"; take the digit groups directly
    // preceding the sign so room counts earlier in the card don't bleed in.
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

fn address_from_text(text: &str, city_slug: &str) -> String {
    let addr = text
        .split_whitespace()
        .skip_while(|w| !w.starts_with("ул") && !w.starts_with("пр") && !w.starts_with("пер"))
        .take(3)
        .collect::<Vec<_>>()
        .join(" ");
    if addr.is_empty() {
        city_slug.to_string()
    } else {
        addr
    }
}

fn photo_url(img: ElementRef<'_>) -> Option<String> {
    let src = img.value().attr("src").or_else(|| img.value().attr("data-src"))?;
    src.starts_with("http").then(|| src.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_object_id() {
        assert_eq!(object_id("/sale/flats/object/123456/"), Some("123456".into()));
        assert_eq!(object_id("/sale/flats/"), None);
    }

    #[test]
    fn parses_card_fields_from_text() {
        let text = "2-комн. квартира 45,3 м² 50 000 $ ул. Ленина 1 Агентство";
        assert_eq!(rooms_from_text(text), 2);
        assert!((area_from_text(text) - 45.3).abs() < 1e-9);
        assert_eq!(price_from_text(text), 50_000);
    }

    #[test]
    fn full_page_parse_respects_filters() {
        let html = r#"
        <html><body>
          <a href="/sale/flats/object/111/">2-комн. квартира 45 м² 50 000 $ ул. Ленина 1</a>
          <a href="/sale/flats/object/222/">4-комн. квартира 90 м² 95 000 $ ул. Мира 7</a>
          <a href="/sale/flats/object/111/">duplicate card</a>
        </body></html>"#;
        let source = RealtSource::new(Arc::new(HttpClient::new()));
        let query = SearchQuery {
            city_slug: "baranovichi".into(),
            min_rooms: 1,
            max_rooms: 3,
            min_price: 0,
            max_price: 60_000,
        };
        let out = source.parse_page(html, &query);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "realt_111");
        assert_eq!(out[0].price, 50_000);
    }
}
