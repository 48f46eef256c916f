//! Listing-cache table: write-through upserts, the read-through query and
//! the daily sweep.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::Row;

use flatwatch_core::storage::ListingCacheStore;
use flatwatch_core::{listing_content_hash, normalize};
use flatwatch_types::{
    CachedListing, FlatwatchError, Listing, ListingStatus, SearchQuery, SellerType,
};

use crate::{db_err, Store};

/// Days a `deleted` row survives before the sweep hard-deletes it.
const DELETED_RETENTION_DAYS: i32 = 7;

/// Rows the sweep touches per run when refreshing stale `last_seen_at`.
const SWEEP_TOUCH_LIMIT: i64 = 100;

#[async_trait]
impl ListingCacheStore for Store {
    async fn cache_batch(
        &self,
        listings: &[Listing],
        default_city: &str,
    ) -> Result<usize, FlatwatchError> {
        let mut written = 0usize;
        for listing in listings {
            let city = normalize::city_from_address(&listing.address, default_city);
            let photos =
                serde_json::to_string(&listing.photos).unwrap_or_else(|_| "[]".to_string());
            let result = sqlx::query(
                "INSERT INTO cached_listings
                   (id, source, title, price, currency, price_usd, price_byn, rooms, area,
                    address, url, city, floor, total_floors, year_built, description, photos,
                    seller_type, content_hash, status, first_seen_at, last_seen_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                         $16, $17, $18, $19, 'active', now(), now(), now())
                 ON CONFLICT (id) DO UPDATE SET
                   title = EXCLUDED.title,
                   price = EXCLUDED.price,
                   currency = EXCLUDED.currency,
                   price_usd = EXCLUDED.price_usd,
                   price_byn = EXCLUDED.price_byn,
                   rooms = EXCLUDED.rooms,
                   area = EXCLUDED.area,
                   address = EXCLUDED.address,
                   url = EXCLUDED.url,
                   city = EXCLUDED.city,
                   floor = EXCLUDED.floor,
                   total_floors = EXCLUDED.total_floors,
                   year_built = EXCLUDED.year_built,
                   description = EXCLUDED.description,
                   photos = EXCLUDED.photos,
                   seller_type = EXCLUDED.seller_type,
                   content_hash = EXCLUDED.content_hash,
                   status = 'active',
                   last_seen_at = now(),
                   updated_at = now()",
            )
            .bind(&listing.id)
            .bind(&listing.source)
            .bind(&listing.title)
            .bind(listing.price)
            .bind(&listing.currency)
            .bind(listing.price_usd)
            .bind(listing.price_byn)
            .bind(listing.rooms as i32)
            .bind(listing.area)
            .bind(&listing.address)
            .bind(&listing.url)
            .bind(city)
            .bind(&listing.floor)
            .bind(&listing.total_floors)
            .bind(&listing.year_built)
            .bind(&listing.description)
            .bind(photos)
            .bind(listing.seller.as_str())
            .bind(listing_content_hash(listing))
            .execute(self.pool())
            .await;

            match result {
                Ok(_) => written += 1,
                Err(e) => {
                    // Writes are best-effort; a failed row never fails a run.
                    tracing::warn!(id = %listing.id, error = %e, "cache upsert failed");
                }
            }
        }
        Ok(written)
    }

    async fn read_cache(
        &self,
        query: &SearchQuery,
        limit: u32,
    ) -> Result<Vec<CachedListing>, FlatwatchError> {
        let rows = sqlx::query(
            "SELECT * FROM cached_listings
             WHERE city = $1
               AND rooms >= $2 AND rooms <= $3
               AND price >= $4 AND price <= $5
               AND status = 'active'
             ORDER BY updated_at DESC
             LIMIT $6",
        )
        .bind(&query.city_slug)
        .bind(query.min_rooms as i32)
        .bind(query.max_rooms as i32)
        .bind(query.min_price)
        .bind(query.max_price)
        .bind(i64::from(limit))
        .fetch_all(self.pool())
        .await
        .map_err(db_err)?;

        let mut listings = Vec::with_capacity(rows.len());
        for row in rows {
            listings.push(row_to_cached(&row)?);
        }
        tracing::info!(count = listings.len(), city = %query.city_slug, "cache read");
        Ok(listings)
    }

    async fn mark_deleted(&self, listing_id: &str) -> Result<(), FlatwatchError> {
        sqlx::query(
            "UPDATE cached_listings SET status = 'deleted', updated_at = now() WHERE id = $1",
        )
        .bind(listing_id)
        .execute(self.pool())
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn daily_sweep(&self) -> Result<u64, FlatwatchError> {
        let touched = sqlx::query(
            "UPDATE cached_listings SET last_seen_at = now()
             WHERE id IN (
                SELECT id FROM cached_listings
                WHERE status = 'active' AND last_seen_at < now() - interval '1 day'
                LIMIT $1
             )",
        )
        .bind(SWEEP_TOUCH_LIMIT)
        .execute(self.pool())
        .await
        .map_err(db_err)?
        .rows_affected();

        let purged = sqlx::query(
            "DELETE FROM cached_listings
             WHERE status = 'deleted' AND updated_at < now() - make_interval(days => $1)",
        )
        .bind(DELETED_RETENTION_DAYS)
        .execute(self.pool())
        .await
        .map_err(db_err)?
        .rows_affected();

        tracing::info!(touched, purged, "cache sweep done");
        Ok(touched)
    }
}

fn row_to_cached(row: &PgRow) -> Result<CachedListing, FlatwatchError> {
    let photos: Vec<String> = row
        .try_get::<String, _>("photos")
        .ok()
        .and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or_default();

    let listing = Listing {
        id: row.try_get("id").map_err(db_err)?,
        source: row.try_get("source").map_err(db_err)?,
        title: row.try_get("title").map_err(db_err)?,
        price: row.try_get("price").map_err(db_err)?,
        currency: row.try_get("currency").map_err(db_err)?,
        price_usd: row.try_get("price_usd").map_err(db_err)?,
        price_byn: row.try_get("price_byn").map_err(db_err)?,
        rooms: row.try_get::<i32, _>("rooms").map_err(db_err)?.max(0) as u32,
        area: row.try_get("area").map_err(db_err)?,
        address: row.try_get("address").map_err(db_err)?,
        url: row.try_get("url").map_err(db_err)?,
        photos,
        floor: row.try_get("floor").map_err(db_err)?,
        total_floors: row.try_get("total_floors").map_err(db_err)?,
        year_built: row.try_get("year_built").map_err(db_err)?,
        description: row.try_get("description").map_err(db_err)?,
        seller: SellerType::parse(&row.try_get::<String, _>("seller_type").map_err(db_err)?),
        ..Listing::default()
    };

    Ok(CachedListing {
        listing,
        city: row.try_get("city").map_err(db_err)?,
        content_hash: row.try_get("content_hash").map_err(db_err)?,
        status: ListingStatus::parse(&row.try_get::<String, _>("status").map_err(db_err)?),
        first_seen_at: row.try_get::<DateTime<Utc>, _>("first_seen_at").map_err(db_err)?,
        last_seen_at: row.try_get::<DateTime<Utc>, _>("last_seen_at").map_err(db_err)?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at").map_err(db_err)?,
    })
}
