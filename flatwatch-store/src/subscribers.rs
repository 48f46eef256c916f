//! Subscriber rows (filters + active flag) and the per-subscriber seen set.

use async_trait::async_trait;
use sqlx::Row;

use flatwatch_core::storage::{SeenStore, SubscriberStore};
use flatwatch_types::{DeliveryMode, FilterRecord, FlatwatchError, SellerFilter};

use crate::{db_err, Store};

#[async_trait]
impl SubscriberStore for Store {
    async fn upsert_subscriber(&self, chat_id: i64) -> Result<(), FlatwatchError> {
        sqlx::query(
            "INSERT INTO subscribers (telegram_id) VALUES ($1)
             ON CONFLICT (telegram_id) DO NOTHING",
        )
        .bind(chat_id)
        .execute(self.pool())
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_filter(&self, chat_id: i64) -> Result<Option<FilterRecord>, FlatwatchError> {
        let row = sqlx::query("SELECT * FROM subscribers WHERE telegram_id = $1")
            .bind(chat_id)
            .fetch_optional(self.pool())
            .await
            .map_err(db_err)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let city: String = row.try_get("city").map_err(db_err)?;
        if city.is_empty() {
            // Subscriber exists but setup never finished.
            return Ok(None);
        }
        Ok(Some(FilterRecord {
            city_slug: city,
            min_rooms: row.try_get::<i32, _>("min_rooms").map_err(db_err)?.max(1) as u32,
            max_rooms: row.try_get::<i32, _>("max_rooms").map_err(db_err)?.max(1) as u32,
            min_price: row.try_get("min_price").map_err(db_err)?,
            max_price: row.try_get("max_price").map_err(db_err)?,
            seller: SellerFilter::parse(&row.try_get::<String, _>("seller_type").map_err(db_err)?),
            mode: DeliveryMode::parse(
                &row.try_get::<String, _>("delivery_mode").map_err(db_err)?,
            ),
            active: row.try_get("active").map_err(db_err)?,
        }))
    }

    async fn set_filter(&self, chat_id: i64, filter: &FilterRecord) -> Result<(), FlatwatchError> {
        sqlx::query(
            "INSERT INTO subscribers
               (telegram_id, city, min_rooms, max_rooms, min_price, max_price,
                seller_type, delivery_mode, active, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now())
             ON CONFLICT (telegram_id) DO UPDATE SET
               city = EXCLUDED.city,
               min_rooms = EXCLUDED.min_rooms,
               max_rooms = EXCLUDED.max_rooms,
               min_price = EXCLUDED.min_price,
               max_price = EXCLUDED.max_price,
               seller_type = EXCLUDED.seller_type,
               delivery_mode = EXCLUDED.delivery_mode,
               active = EXCLUDED.active,
               updated_at = now()",
        )
        .bind(chat_id)
        .bind(&filter.city_slug)
        .bind(filter.min_rooms as i32)
        .bind(filter.max_rooms as i32)
        .bind(filter.min_price)
        .bind(filter.max_price)
        .bind(filter.seller.as_str())
        .bind(filter.mode.as_str())
        .bind(filter.active)
        .execute(self.pool())
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn set_active(&self, chat_id: i64, active: bool) -> Result<(), FlatwatchError> {
        sqlx::query(
            "UPDATE subscribers SET active = $2, updated_at = now() WHERE telegram_id = $1",
        )
        .bind(chat_id)
        .bind(active)
        .execute(self.pool())
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn active_subscribers(&self) -> Result<Vec<i64>, FlatwatchError> {
        let rows = sqlx::query(
            "SELECT telegram_id FROM subscribers
             WHERE active = TRUE AND city <> ''
             ORDER BY telegram_id",
        )
        .fetch_all(self.pool())
        .await
        .map_err(db_err)?;

        rows.iter()
            .map(|r| r.try_get::<i64, _>("telegram_id").map_err(db_err))
            .collect()
    }
}

#[async_trait]
impl SeenStore for Store {
    async fn is_seen(&self, chat_id: i64, listing_id: &str) -> Result<bool, FlatwatchError> {
        let row = sqlx::query(
            "SELECT 1 AS one FROM seen_listings WHERE telegram_id = $1 AND listing_id = $2",
        )
        .bind(chat_id)
        .bind(listing_id)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;
        Ok(row.is_some())
    }

    async fn mark_seen(&self, chat_id: i64, listing_id: &str) -> Result<(), FlatwatchError> {
        sqlx::query(
            "INSERT INTO seen_listings (telegram_id, listing_id) VALUES ($1, $2)
             ON CONFLICT (telegram_id, listing_id) DO NOTHING",
        )
        .bind(chat_id)
        .bind(listing_id)
        .execute(self.pool())
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn clear_seen(&self, chat_id: i64) -> Result<u64, FlatwatchError> {
        let result = sqlx::query("DELETE FROM seen_listings WHERE telegram_id = $1")
            .bind(chat_id)
            .execute(self.pool())
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn seen_count(&self, chat_id: i64) -> Result<u64, FlatwatchError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM seen_listings WHERE telegram_id = $1")
            .bind(chat_id)
            .fetch_one(self.pool())
            .await
            .map_err(db_err)?;
        Ok(row.try_get::<i64, _>("n").map_err(db_err)?.max(0) as u64)
    }
}
