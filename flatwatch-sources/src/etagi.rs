//! Adapter for the city subdomains of etagi.com (HTML listing cards).

use std::sync::Arc;

use async_trait::async_trait;
use scraper::{Html, Selector};

use flatwatch_core::source::ListingSource;
use flatwatch_types::{FlatwatchError, Listing, SearchQuery, SellerType};

use crate::dto;
use crate::http::HttpClient;
use crate::util::{parse_area, parse_rooms, within_filters};

/// Etagi adapter. The portal serves one subdomain per city
/// (`baranovichi.etagi.com`), so the city slug becomes the host; everything
/// on the portal is agency-listed.
pub struct EtagiSource {
    http: Arc<HttpClient>,
    base_override: Option<String>,
}

impl EtagiSource {
    /// Build the adapter over the shared HTTP client.
    #[must_use]
    pub fn new(http: Arc<HttpClient>) -> Self {
        Self {
            http,
            base_override: None,
        }
    }

    /// Point the adapter at a fixed host instead of the per-city subdomain
    /// (tests).
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_override = Some(url.into());
        self
    }

    fn base_url(&self, city_slug: &str) -> String {
        self.base_override
            .clone()
            .unwrap_or_else(|| format!("https://{city_slug}.etagi.com"))
    }

    fn parse_page(&self, html: &str, base: &str, query: &SearchQuery) -> Vec<Listing> {
        let doc = Html::parse_document(html);
        let Ok(anchors) = Selector::parse("a[href*='/realty/']") else {
            return Vec::new();
        };

        let mut listings = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for a in doc.select(&anchors) {
            let href = a.value().attr("href").unwrap_or_default();
            let digits: String = href
                .split("/realty/")
                .nth(1)
                .unwrap_or_default()
                .chars()
                .take_while(char::is_ascii_digit)
                .collect();
            if digits.is_empty() {
                continue;
            }
            let id = format!("etagi_{digits}");
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
            let price = price_byn_or_usd(&text);

            let listing = Listing {
                id,
                source: "etagi".into(),
                title: if rooms > 0 && area > 0.0 {
                    format!("{rooms}-комн., {area} м²")
                } else {
                    "Квартира".to_string()
                },
                price: price.0,
                currency: price.1.into(),
                price_usd: if price.1 == "USD" { price.0 } else { 0 },
                price_byn: if price.1 == "BYN" { price.0 } else { 0 },
                rooms,
                area,
                address: query.city_slug.clone(),
                url: crate::util::absolutize(base, href),
                seller: SellerType::Company,
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
impl ListingSource for EtagiSource {
    fn name(&self) -> &'static str {
        "etagi"
    }

    async fn fetch_listings(&self, query: &SearchQuery) -> Result<Vec<Listing>, FlatwatchError> {
        let base = self.base_url(&query.city_slug);
        let url = format!("{base}/realty/");
        let Some(html) = self.http.fetch_html(&url, self.name()).await else {
            return Err(FlatwatchError::source(self.name(), "search page unreachable"));
        };
        let listings = self.parse_page(&html, &base, query);
        tracing::info!(count = listings.len(), "etagi batch parsed");
        Ok(listings)
    }
}

/// Etagi prints prices in BYN by default with an optional USD toggle; look
/// for either sign.
fn price_byn_or_usd(text: &str) -> (i64, &'static str) {
    let words: Vec<&str> = text.split_whitespace().collect();
    for (i, word) in words.iter().enumerate() {
        let currency = if *word == "$" {
            "USD"
        } else if word.starts_with("р.") || word.starts_with("руб") || word.starts_with("BYN") {
            "BYN"
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
        if let Ok(price) = digits.parse() {
            return (price, currency);
        }
    }
    (0, "USD")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byn_price_detected() {
        let (p, cur) = price_byn_or_usd("2-комн. 45 м² 147 500 р. в Барановичах");
        assert_eq!(p, 147_500);
        assert_eq!(cur, "BYN");
    }

    #[test]
    fn page_parse_marks_agency_seller() {
        let html = r#"<a href="/realty/31337/">2-комн. 45 м² 50 000 $</a>"#;
        let source = EtagiSource::new(Arc::new(HttpClient::new()));
        let query = SearchQuery {
            city_slug: "baranovichi".into(),
            min_rooms: 1,
            max_rooms: 3,
            min_price: 0,
            max_price: 60_000,
        };
        let out = source.parse_page(html, "https://baranovichi.etagi.com", &query);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].seller, SellerType::Company);
        assert_eq!(out[0].url, "https://baranovichi.etagi.com/realty/31337/");
    }
}
