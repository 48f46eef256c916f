use std::sync::Arc;
use std::time::{Duration, Instant};

use flatwatch::Aggregator;
use flatwatch_mock::{listing, MockSource};
use flatwatch_types::SearchQuery;

fn query() -> SearchQuery {
    SearchQuery {
        city_slug: "baranovichi".into(),
        min_rooms: 1,
        max_rooms: 4,
        min_price: 0,
        max_price: 100_000,
    }
}

#[tokio::test]
async fn merges_sources_and_sorts_by_price_with_zero_last() {
    let a = Arc::new(MockSource::with_listings(
        "kufar",
        vec![
            listing("kufar_1", "Ленина 1", 55_000, 2, 45.0),
            listing("kufar_2", "Мира 3", 0, 2, 45.0),
        ],
    ));
    let b = Arc::new(MockSource::with_listings(
        "onliner",
        vec![listing("onliner_1", "Советская 9", 42_000, 3, 60.0)],
    ));
    let aggregator = Aggregator::builder()
        .with_source(a)
        .with_source(b)
        .build()
        .unwrap();

    let out = aggregator.fetch_all(&query()).await;
    let ids: Vec<&str> = out.iter().map(|l| l.id.as_str()).collect();
    assert_eq!(ids, vec!["onliner_1", "kufar_1", "kufar_2"]);
}

#[tokio::test]
async fn failing_source_does_not_poison_the_batch() {
    let good = Arc::new(MockSource::with_listings(
        "kufar",
        vec![listing("kufar_1", "Ленина 1", 50_000, 2, 45.0)],
    ));
    let bad = Arc::new(MockSource::failing("realt"));
    let aggregator = Aggregator::builder()
        .with_source(bad)
        .with_source(good)
        .build()
        .unwrap();

    let out = aggregator.fetch_all(&query()).await;
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].id, "kufar_1");
}

#[tokio::test]
async fn hanging_source_is_abandoned_at_the_timeout() {
    let fast_a = Arc::new(MockSource::with_listings(
        "kufar",
        (0..30)
            .map(|i| listing(&format!("kufar_{i}"), &format!("Ленина {i}"), 40_000 + i, 2, 45.0))
            .collect(),
    ));
    let fast_b = Arc::new(MockSource::with_listings(
        "onliner",
        (0..30)
            .map(|i| listing(&format!("onliner_{i}"), &format!("Мира {i}"), 50_000 + i, 2, 45.0))
            .collect(),
    ));
    let stuck = Arc::new(MockSource::hanging("gohome", Duration::from_secs(30)));

    let aggregator = Aggregator::builder()
        .with_source(fast_a)
        .with_source(fast_b)
        .with_source(stuck)
        .per_source_timeout(Duration::from_millis(200))
        .build()
        .unwrap();

    let started = Instant::now();
    let out = aggregator.fetch_all(&query()).await;

    assert_eq!(out.len(), 60);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn same_id_from_two_sources_keeps_first_occurrence() {
    let a = Arc::new(MockSource::with_listings(
        "kufar",
        vec![listing("kufar_1", "Ленина 1", 50_000, 2, 45.0)],
    ));
    let b = Arc::new(MockSource::with_listings(
        "mirror",
        vec![listing("kufar_1", "Ленина 1", 51_000, 2, 45.0)],
    ));
    let aggregator = Aggregator::builder()
        .with_source(a)
        .with_source(b)
        .build()
        .unwrap();

    let out = aggregator.fetch_all(&query()).await;
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].price, 50_000);
}

#[tokio::test]
async fn near_duplicates_collapse_across_portals() {
    // Same building, seller, floor, area, photos and price bucket.
    let mut first = listing("kufar_1", "Ленина 1", 50_000, 2, 45.0);
    first.photos = vec!["https://cdn/1.jpg".into()];
    let mut clone = listing("etagi_9", "Ленина 1", 50_100, 2, 45.0);
    clone.photos = vec!["https://cdn/1.jpg".into()];

    let a = Arc::new(MockSource::with_listings("kufar", vec![first]));
    let b = Arc::new(MockSource::with_listings("etagi", vec![clone]));
    let aggregator = Aggregator::builder()
        .with_source(a)
        .with_source(b)
        .build()
        .unwrap();

    let out = aggregator.fetch_all(&query()).await;
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].id, "kufar_1");

    // With the pass disabled both survive.
    let a = Arc::new(MockSource::with_listings(
        "kufar",
        vec![{
            let mut l = listing("kufar_1", "Ленина 1", 50_000, 2, 45.0);
            l.photos = vec!["https://cdn/1.jpg".into()];
            l
        }],
    ));
    let b = Arc::new(MockSource::with_listings(
        "etagi",
        vec![{
            let mut l = listing("etagi_9", "Ленина 1", 50_100, 2, 45.0);
            l.photos = vec!["https://cdn/1.jpg".into()];
            l
        }],
    ));
    let aggregator = Aggregator::builder()
        .with_source(a)
        .with_source(b)
        .near_duplicate_dedup(false)
        .build()
        .unwrap();
    assert_eq!(aggregator.fetch_all(&query()).await.len(), 2);
}

#[tokio::test]
async fn builder_rejects_empty_source_list() {
    assert!(Aggregator::builder().build().is_err());
}
