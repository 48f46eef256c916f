use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use httpmock::prelude::*;
use serde_json::json;

use flatwatch_core::source::{DeliveredProbe, ListingSource};
use flatwatch_sources::{HttpClient, HttpClientConfig, KufarSource};
use flatwatch_types::SearchQuery;

fn client() -> Arc<HttpClient> {
    Arc::new(HttpClient::with_config(HttpClientConfig {
        backoff_base: Duration::from_millis(10),
        per_host_spacing: Duration::from_millis(1),
        ..HttpClientConfig::default()
    }))
}

fn query() -> SearchQuery {
    SearchQuery {
        city_slug: "baranovichi".into(),
        min_rooms: 1,
        max_rooms: 4,
        min_price: 0,
        max_price: 100_000,
    }
}

fn ad(id: u64, rooms: u32, price_usd_cents: u64) -> serde_json::Value {
    json!({
        "ad_id": id,
        "ad_link": format!("/item/{id}"),
        "price_usd": price_usd_cents.to_string(),
        "company_ad": false,
        "account_parameters": [{"p": "address", "v": "Ленина 1"}],
        "ad_parameters": [
            {"p": "rooms", "v": rooms.to_string(), "vl": ""},
            {"p": "size", "v": "45", "vl": ""}
        ]
    })
}

struct FixedProbe(HashSet<String>);

#[async_trait]
impl DeliveredProbe for FixedProbe {
    async fn is_delivered(&self, listing_id: &str) -> bool {
        self.0.contains(listing_id)
    }
}

#[tokio::test]
async fn single_page_is_parsed_and_filtered() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/search");
            then.status(200).json_body(json!({
                "ads": [ad(1, 2, 5_000_000), ad(2, 5, 7_000_000)],
                "total": 2,
                "pagination": {"pages": []}
            }));
        })
        .await;

    let source = KufarSource::new(client()).with_api_url(server.url("/search"));
    let listings = source.fetch_listings(&query()).await.unwrap();

    // The 5-room ad is outside the 1..=4 window.
    assert_eq!(listings.len(), 1);
    assert_eq!(listings[0].id, "kufar_1");
    assert_eq!(listings[0].price_usd, 50_000);
}

#[tokio::test]
async fn pagination_follows_next_token_up_to_cap() {
    let server = MockServer::start_async().await;
    let page2 = server
        .mock_async(|when, then| {
            when.method(GET).path("/search").query_param("cursor", "t2");
            then.status(200).json_body(json!({
                "ads": [ad(20, 2, 4_000_000)],
                "pagination": {"pages": [{"label": "next", "token": "t3"}]}
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/search").query_param_missing("cursor");
            then.status(200).json_body(json!({
                "ads": [ad(10, 2, 5_000_000)],
                "pagination": {"pages": [{"label": "next", "token": "t2"}]}
            }));
        })
        .await;

    let source = KufarSource::new(client()).with_api_url(server.url("/search"));
    let listings = source.fetch_listings(&query()).await.unwrap();

    // Two pages (the hard cap), even though page two advertises a third.
    assert_eq!(listings.len(), 2);
    assert_eq!(page2.hits_async().await, 1);
}

#[tokio::test]
async fn old_streak_stops_pagination() {
    let server = MockServer::start_async().await;
    let delivered: HashSet<String> =
        (1..=5).map(|i| format!("kufar_{i}")).collect();

    let page2 = server
        .mock_async(|when, then| {
            when.method(GET).path("/search").query_param("cursor", "t2");
            then.status(200).json_body(json!({"ads": [], "pagination": {"pages": []}}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/search").query_param_missing("cursor");
            then.status(200).json_body(json!({
                "ads": [ad(1, 2, 1), ad(2, 2, 1), ad(3, 2, 1), ad(4, 2, 1), ad(5, 2, 1), ad(6, 2, 5_000_000)],
                "pagination": {"pages": [{"label": "next", "token": "t2"}]}
            }));
        })
        .await;

    let source = KufarSource::new(client())
        .with_api_url(server.url("/search"))
        .with_delivered_probe(Arc::new(FixedProbe(delivered)));
    let listings = source.fetch_listings(&query()).await.unwrap();

    // Five consecutive known ids stop the walk before ad 6 is reached.
    assert!(listings.is_empty());
    assert_eq!(page2.hits_async().await, 0);
}

#[tokio::test]
async fn fresh_id_resets_the_streak() {
    let server = MockServer::start_async().await;
    let delivered: HashSet<String> =
        [1, 2, 3, 4, 6].iter().map(|i| format!("kufar_{i}")).collect();

    server
        .mock_async(|when, then| {
            when.method(GET).path("/search");
            then.status(200).json_body(json!({
                "ads": [ad(1, 2, 1), ad(2, 2, 1), ad(3, 2, 1), ad(4, 2, 1), ad(5, 2, 5_000_000), ad(6, 2, 1), ad(7, 2, 4_000_000)],
                "pagination": {"pages": []}
            }));
        })
        .await;

    let source = KufarSource::new(client())
        .with_api_url(server.url("/search"))
        .with_delivered_probe(Arc::new(FixedProbe(delivered)));
    let listings = source.fetch_listings(&query()).await.unwrap();

    let ids: Vec<&str> = listings.iter().map(|l| l.id.as_str()).collect();
    assert_eq!(ids, vec!["kufar_5", "kufar_7"]);
}

#[tokio::test]
async fn unknown_city_returns_empty_without_network() {
    let source = KufarSource::new(client()).with_api_url("http://127.0.0.1:1/search");
    let q = SearchQuery {
        city_slug: "atlantis".into(),
        ..query()
    };
    assert!(source.fetch_listings(&q).await.unwrap().is_empty());
}
