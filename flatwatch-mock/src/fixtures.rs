use flatwatch_types::Listing;

/// Build a plausible USD listing for tests: `listing("kufar_1", "Ленина 1",
/// 50_000, 2, 45.0)`.
#[must_use]
pub fn listing(id: &str, address: &str, price_usd: i64, rooms: u32, area: f64) -> Listing {
    let source = id.split('_').next().unwrap_or("mock").to_string();
    Listing {
        id: id.to_string(),
        source,
        title: format!("{rooms}-комн., {area} м²"),
        price: price_usd,
        currency: "USD".into(),
        price_usd,
        rooms,
        area,
        address: address.to_string(),
        url: format!("https://example.com/item/{id}"),
        ..Listing::default()
    }
}
