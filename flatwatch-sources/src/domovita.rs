//! Adapter for domovita.by (HTML listing cards).

use std::sync::Arc;

use async_trait::async_trait;
use scraper::{Html, Selector};

use flatwatch_core::source::ListingSource;
use flatwatch_types::{FlatwatchError, Listing, SearchQuery};

use crate::dto;
use crate::http::HttpClient;
use crate::util::{absolutize, parse_area, parse_rooms, within_filters};

const BASE_URL: &str = "https://domovita.by";

/// Domovita adapter. Cards carry both a BYN and a USD price; the USD one
/// becomes the primary.
pub struct DomovitaSource {
    http: Arc<HttpClient>,
    base_url: String,
}

impl DomovitaSource {
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
        format!("{}/{}/flats/sale", self.base_url, query.city_slug)
    }

    fn parse_page(&self, html: &str, query: &SearchQuery) -> Vec<Listing> {
        let doc = Html::parse_document(html);
        let Ok(anchors) = Selector::parse("a[href*='/flats/sale/']") else {
            return Vec::new();
        };

        let mut listings = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for a in doc.select(&anchors) {
            let href = a.value().attr("href").unwrap_or_default();
            let Some(native_id) = trailing_id(href) else {
                continue;
            };
            let id = format!("domovita_{native_id}");
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
                .find(|(_, next)| next.starts_with("м²"))
                .map(|(num, _)| parse_area(num))
                .unwrap_or(0.0);
            let (price_usd, price_byn) = card_prices(&text);

            let listing = Listing {
                id,
                source: "domovita".into(),
                title: if rooms > 0 && area > 0.0 {
                    format!("{rooms}-комн., {area} м²")
                } else {
                    "Квартира".to_string()
                },
                price: price_usd,
                currency: "USD".into(),
                price_usd,
                price_byn,
                rooms,
                area,
                address: street_from_text(&text).unwrap_or_else(|| query.city_slug.clone()),
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
impl ListingSource for DomovitaSource {
    fn name(&self) -> &'static str {
        "domovita"
    }

    async fn fetch_listings(&self, query: &SearchQuery) -> Result<Vec<Listing>, FlatwatchError> {
        let url = self.search_url(query);
        let Some(html) = self.http.fetch_html(&url, self.name()).await else {
            return Err(FlatwatchError::source(self.name(), "search page unreachable"));
        };
        let listings = self.parse_page(&html, query);
        tracing::info!(count = listings.len(), "domovita batch parsed");
        Ok(listings)
    }
}

/// Item links end with a numeric id segment ("...-12345" or ".../12345").
fn trailing_id(href: &str) -> Option<String> {
    let tail = href.trim_end_matches('/');
    let last = tail.rsplit(['/', '-']).next()?;
    let digits: String = last.chars().filter(char::is_ascii_digit).collect();
    (digits.len() >= 4).then_some(digits)
}

/// Cards print "123 456 р." and "45 000 $"; pick both out.
fn card_prices(text: &str) -> (i64, i64) {
    let mut usd = 0i64;
    let mut byn = 0i64;
    let words: Vec<&str> = text.split_whitespace().collect();
    for (i, word) in words.iter().enumerate() {
        let target = if *word == "$" {
            &mut usd
        } else if word.starts_with("р.") || *word == "руб." {
            &mut byn
        } else {
            continue;
        };
        let mut digits = String::new();
        for w in words[..i].iter().rev() {
            if !w.is_empty() && w.chars().all(|c| c.is_ascii_digit()) {
                digits = format!("{w}{digits}");
            } else {
                break;
            }
        }
        *target = digits.parse().unwrap_or(0);
    }
    (usd, byn)
}

fn street_from_text(text: &str) -> Option<String> {
    let addr: Vec<&str> = text
        .split_whitespace()
        .skip_while(|w| !w.starts_with("ул") && !w.starts_with("пр") && !w.starts_with("пер"))
        .take(3)
        .collect();
    (!addr.is_empty()).then(|| addr.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_id_variants() {
        assert_eq!(trailing_id("/baranovichi/flats/sale/dom-12345"), Some("12345".into()));
        assert_eq!(trailing_id("/baranovichi/flats/sale/98765/"), Some("98765".into()));
        assert_eq!(trailing_id("/baranovichi/flats/sale"), None);
    }

    #[test]
    fn both_prices_extracted() {
        let (usd, byn) = card_prices("2-комн. 147 500 р. 50 000 $ ул. Ленина");
        assert_eq!(usd, 50_000);
        assert_eq!(byn, 147_500);
    }

    #[test]
    fn page_parse_end_to_end() {
        let html = r#"<html><body>
          <a href="/baranovichi/flats/sale/kv-55501">
            <span>2-комн.</span> <span>45 м²</span> <span>50 000</span> <span>$</span>
            <span>ул. Ленина 1</span>
          </a>
        </body></html>"#;
        let source = DomovitaSource::new(Arc::new(HttpClient::new()));
        let query = SearchQuery {
            city_slug: "baranovichi".into(),
            min_rooms: 1,
            max_rooms: 3,
            min_price: 0,
            max_price: 60_000,
        };
        let out = source.parse_page(html, &query);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "domovita_55501");
        assert_eq!(out[0].price_usd, 50_000);
        assert_eq!(out[0].rooms, 2);
    }
}
