//! flatwatch-store
//!
//! Postgres-backed implementations of the storage traits in
//! `flatwatch-core`. The store bootstraps its own schema; queries are
//! runtime-bound so no live database is needed at build time. Callers are
//! expected to degrade when a method fails — a broken store must never
//! take a dispatch down with it.
#![warn(missing_docs)]

mod delivered;
mod links;
mod listings;
mod subscribers;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use flatwatch_types::FlatwatchError;

/// Handle over the remote SQL store. Cheap to clone; wraps a `PgPool`.
#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

pub(crate) fn db_err(e: sqlx::Error) -> FlatwatchError {
    FlatwatchError::store(e.to_string())
}

impl Store {
    /// Connect to the store.
    ///
    /// # Errors
    /// Returns `Store` when the database is unreachable or the URL is
    /// malformed.
    pub async fn connect(database_url: &str) -> Result<Self, FlatwatchError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(db_err)?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool (tests, shared pools).
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create every table and index the workspace relies on, idempotently.
    ///
    /// # Errors
    /// Returns `Store` when DDL fails; the caller should treat this as
    /// fatal at startup.
    pub async fn ensure_schema(&self) -> Result<(), FlatwatchError> {
        for ddl in SCHEMA {
            sqlx::query(ddl).execute(&self.pool).await.map_err(db_err)?;
        }
        tracing::info!("store schema ensured");
        Ok(())
    }

    /// Populate the city-code table from a static `(slug, portal, code)`
    /// map. Existing rows are replaced.
    ///
    /// # Errors
    /// Returns `Store` on write failure.
    pub async fn load_city_map(
        &self,
        entries: &[(&str, &str, &str)],
    ) -> Result<(), FlatwatchError> {
        for (slug, portal, code) in entries {
            sqlx::query(
                "INSERT INTO city_codes (slug, portal, code) VALUES ($1, $2, $3)
                 ON CONFLICT (slug, portal) DO UPDATE SET code = EXCLUDED.code",
            )
            .bind(slug)
            .bind(portal)
            .bind(code)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        }
        Ok(())
    }

    /// Portal-specific code for a canonical slug, when known.
    ///
    /// # Errors
    /// Returns `Store` on query failure.
    pub async fn city_code(
        &self,
        slug: &str,
        portal: &str,
    ) -> Result<Option<String>, FlatwatchError> {
        use sqlx::Row;
        let row = sqlx::query("SELECT code FROM city_codes WHERE slug = $1 AND portal = $2")
            .bind(slug)
            .bind(portal)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|r| r.try_get::<String, _>("code").map_err(db_err))
            .transpose()
    }
}

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS cached_listings (
        id TEXT PRIMARY KEY,
        source TEXT NOT NULL,
        title TEXT NOT NULL DEFAULT '',
        price BIGINT NOT NULL DEFAULT 0,
        currency TEXT NOT NULL DEFAULT 'USD',
        price_usd BIGINT NOT NULL DEFAULT 0,
        price_byn BIGINT NOT NULL DEFAULT 0,
        rooms INTEGER NOT NULL DEFAULT 0,
        area DOUBLE PRECISION NOT NULL DEFAULT 0,
        address TEXT NOT NULL DEFAULT '',
        url TEXT NOT NULL,
        city TEXT NOT NULL DEFAULT '',
        floor TEXT NOT NULL DEFAULT '',
        total_floors TEXT NOT NULL DEFAULT '',
        year_built TEXT NOT NULL DEFAULT '',
        description TEXT NOT NULL DEFAULT '',
        photos TEXT NOT NULL DEFAULT '[]',
        seller_type TEXT NOT NULL DEFAULT 'unknown',
        content_hash TEXT NOT NULL DEFAULT '',
        status TEXT NOT NULL DEFAULT 'active',
        first_seen_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        last_seen_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        UNIQUE (source, url)
    )",
    "CREATE INDEX IF NOT EXISTS idx_cached_city_rooms_price
        ON cached_listings (city, rooms, price)",
    "CREATE INDEX IF NOT EXISTS idx_cached_content_hash
        ON cached_listings (content_hash)",
    "CREATE INDEX IF NOT EXISTS idx_cached_status_last_seen
        ON cached_listings (status, last_seen_at)",
    "CREATE TABLE IF NOT EXISTS subscribers (
        telegram_id BIGINT PRIMARY KEY,
        city TEXT NOT NULL DEFAULT '',
        min_rooms INTEGER NOT NULL DEFAULT 1,
        max_rooms INTEGER NOT NULL DEFAULT 99,
        min_price BIGINT NOT NULL DEFAULT 0,
        max_price BIGINT NOT NULL DEFAULT 20000,
        seller_type TEXT NOT NULL DEFAULT 'all',
        delivery_mode TEXT NOT NULL DEFAULT 'full',
        active BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE TABLE IF NOT EXISTS seen_listings (
        telegram_id BIGINT NOT NULL,
        listing_id TEXT NOT NULL,
        sent_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        PRIMARY KEY (telegram_id, listing_id)
    )",
    "CREATE TABLE IF NOT EXISTS delivered_listings (
        listing_id TEXT PRIMARY KEY,
        content_hash TEXT NOT NULL,
        source TEXT NOT NULL DEFAULT '',
        url TEXT NOT NULL DEFAULT '',
        first_seen_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE INDEX IF NOT EXISTS idx_delivered_content_hash
        ON delivered_listings (content_hash)",
    "CREATE TABLE IF NOT EXISTS short_links (
        code TEXT PRIMARY KEY,
        payload TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE TABLE IF NOT EXISTS city_codes (
        slug TEXT NOT NULL,
        portal TEXT NOT NULL,
        code TEXT NOT NULL,
        PRIMARY KEY (slug, portal)
    )",
];
