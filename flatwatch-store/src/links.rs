//! Short-link table backing callback payloads over the 64-byte cap.

use async_trait::async_trait;
use sqlx::Row;

use flatwatch_core::storage::ShortLinkStore;
use flatwatch_types::FlatwatchError;

use crate::{db_err, Store};

#[async_trait]
impl ShortLinkStore for Store {
    async fn save_link(&self, code: &str, payload: &str) -> Result<(), FlatwatchError> {
        sqlx::query(
            "INSERT INTO short_links (code, payload) VALUES ($1, $2)
             ON CONFLICT (code) DO UPDATE SET payload = EXCLUDED.payload",
        )
        .bind(code)
        .bind(payload)
        .execute(self.pool())
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn resolve_link(&self, code: &str) -> Result<Option<String>, FlatwatchError> {
        let row = sqlx::query("SELECT payload FROM short_links WHERE code = $1")
            .bind(code)
            .fetch_optional(self.pool())
            .await
            .map_err(db_err)?;
        row.map(|r| r.try_get::<String, _>("payload").map_err(db_err))
            .transpose()
    }
}
