//! The global delivered set: cross-source duplicate blocking and the
//! statistics behind `/stats`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;

use flatwatch_core::listing_content_hash;
use flatwatch_core::storage::{DeliveredStore, DuplicateStats};
use flatwatch_types::{DeliveredRecord, FlatwatchError, Listing};

use crate::{db_err, Store};

#[async_trait]
impl DeliveredStore for Store {
    async fn is_delivered(&self, listing_id: &str) -> Result<bool, FlatwatchError> {
        let row = sqlx::query("SELECT 1 AS one FROM delivered_listings WHERE listing_id = $1")
            .bind(listing_id)
            .fetch_optional(self.pool())
            .await
            .map_err(db_err)?;
        Ok(row.is_some())
    }

    async fn find_by_hash(
        &self,
        content_hash: &str,
    ) -> Result<Option<DeliveredRecord>, FlatwatchError> {
        let row = sqlx::query(
            "SELECT listing_id, content_hash, source, url, first_seen_at
             FROM delivered_listings
             WHERE content_hash = $1
             ORDER BY first_seen_at ASC
             LIMIT 1",
        )
        .bind(content_hash)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;

        row.map(|r| {
            Ok(DeliveredRecord {
                listing_id: r.try_get("listing_id").map_err(db_err)?,
                content_hash: r.try_get("content_hash").map_err(db_err)?,
                source: r.try_get("source").map_err(db_err)?,
                url: r.try_get("url").map_err(db_err)?,
                first_seen_at: r
                    .try_get::<DateTime<Utc>, _>("first_seen_at")
                    .map_err(db_err)?,
            })
        })
        .transpose()
    }

    async fn mark_delivered(&self, listing: &Listing) -> Result<(), FlatwatchError> {
        sqlx::query(
            "INSERT INTO delivered_listings (listing_id, content_hash, source, url)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (listing_id) DO NOTHING",
        )
        .bind(&listing.id)
        .bind(listing_content_hash(listing))
        .bind(&listing.source)
        .bind(&listing.url)
        .execute(self.pool())
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn purge_older_than(&self, days: i64) -> Result<u64, FlatwatchError> {
        let result = sqlx::query(
            "DELETE FROM delivered_listings
             WHERE first_seen_at < now() - make_interval(days => $1)",
        )
        .bind(days as i32)
        .execute(self.pool())
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn duplicate_stats(&self) -> Result<DuplicateStats, FlatwatchError> {
        let totals = sqlx::query(
            "SELECT COUNT(*) AS total, COUNT(DISTINCT content_hash) AS unique_hashes
             FROM delivered_listings",
        )
        .fetch_one(self.pool())
        .await
        .map_err(db_err)?;

        let groups = sqlx::query(
            "SELECT COUNT(*) AS n FROM (
                SELECT content_hash FROM delivered_listings
                GROUP BY content_hash HAVING COUNT(*) > 1
             ) AS dupes",
        )
        .fetch_one(self.pool())
        .await
        .map_err(db_err)?;

        let by_source_rows = sqlx::query(
            "SELECT source, COUNT(*) AS n FROM delivered_listings
             GROUP BY source ORDER BY n DESC",
        )
        .fetch_all(self.pool())
        .await
        .map_err(db_err)?;

        let mut by_source = Vec::with_capacity(by_source_rows.len());
        for row in by_source_rows {
            by_source.push((
                row.try_get::<String, _>("source").map_err(db_err)?,
                row.try_get::<i64, _>("n").map_err(db_err)?.max(0) as u64,
            ));
        }

        Ok(DuplicateStats {
            total_delivered: totals.try_get::<i64, _>("total").map_err(db_err)?.max(0) as u64,
            unique_hashes: totals
                .try_get::<i64, _>("unique_hashes")
                .map_err(db_err)?
                .max(0) as u64,
            duplicate_groups: groups.try_get::<i64, _>("n").map_err(db_err)?.max(0) as u64,
            by_source,
        })
    }
}
