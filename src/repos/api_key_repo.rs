use chrono::DateTime;
use chrono::Utc;
use rand::RngCore;
use sqlx::SqlitePool;

use crate::error::OutboxError;

const KEY_PREFIX: &str = "ob_";
const KEY_RANDOM_BYTES: usize = 32;

/// A row of the `api_key` table (spec §4.4, §6.1). Only `key_hash` is
/// persisted; the raw key is returned once, at creation, and never again.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ApiKey {
    pub id: i64,
    pub description: String,
    pub key_hash: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

/// CRUD and verification over the `api_key` entity.
///
/// Grounded on `original_source/src/outbox/models/api_key.py`.
#[derive(Clone)]
pub struct ApiKeyRepo {
    pool: SqlitePool,
}

impl ApiKeyRepo {
    pub fn new(pool: SqlitePool) -> Self { Self { pool } }

    /// Mint a new key; returns the row alongside the one-time raw key value.
    #[tracing::instrument(skip(self))]
    pub async fn generate(&self, description: &str) -> Result<(ApiKey, String), OutboxError> {
        let mut random = [0u8; KEY_RANDOM_BYTES];
        rand::thread_rng().fill_bytes(&mut random);
        let raw_key = format!("{KEY_PREFIX}{}", base64_url(&random));
        let key_hash = hash_key(&raw_key);

        let now = Utc::now();
        let id = sqlx::query(
            "INSERT INTO api_key (description, key_hash, enabled, created_at) VALUES (?, ?, 1, ?)",
        )
        .bind(description)
        .bind(&key_hash)
        .bind(now)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        let row = self.get(id).await?.ok_or_else(|| {
            OutboxError::Internal(anyhow::anyhow!("api key vanished immediately after insert"))
        })?;
        Ok((row, raw_key))
    }

    /// Look up an enabled key by its raw value, touching `last_used_at`.
    /// Returns `None` for a disabled or unknown key (spec §6.1).
    pub async fn verify(&self, raw_key: &str) -> Result<Option<ApiKey>, OutboxError> {
        let key_hash = hash_key(raw_key);
        let row = sqlx::query_as::<_, ApiKey>(
            "SELECT * FROM api_key WHERE key_hash = ? AND enabled = 1",
        )
        .bind(&key_hash)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };

        let now = Utc::now();
        sqlx::query("UPDATE api_key SET last_used_at = ? WHERE id = ?")
            .bind(now)
            .bind(row.id)
            .execute(&self.pool)
            .await?;

        Ok(Some(ApiKey { last_used_at: Some(now), ..row }))
    }

    pub async fn get(&self, id: i64) -> Result<Option<ApiKey>, OutboxError> {
        let row = sqlx::query_as::<_, ApiKey>("SELECT * FROM api_key WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn get_all(&self) -> Result<Vec<ApiKey>, OutboxError> {
        let rows = sqlx::query_as::<_, ApiKey>("SELECT * FROM api_key ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn enable(&self, id: i64) -> Result<(), OutboxError> {
        sqlx::query("UPDATE api_key SET enabled = 1 WHERE id = ?").bind(id).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn disable(&self, id: i64) -> Result<(), OutboxError> {
        sqlx::query("UPDATE api_key SET enabled = 0 WHERE id = ?").bind(id).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn delete(&self, id: i64) -> Result<(), OutboxError> {
        sqlx::query("DELETE FROM api_key WHERE id = ?").bind(id).execute(&self.pool).await?;
        Ok(())
    }
}

fn hash_key(raw_key: &str) -> String {
    use sha2::Digest;
    hex::encode(sha2::Sha256::digest(raw_key.as_bytes()))
}

fn base64_url(bytes: &[u8]) -> String {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn generated_key_verifies_until_disabled() {
        let pool = crate::store::connect(":memory:").await.unwrap();
        crate::store::run_migrations(&pool).await.unwrap();
        let repo = ApiKeyRepo::new(pool);

        let (row, raw_key) = repo.generate("ci pipeline").await.unwrap();
        assert!(raw_key.starts_with(KEY_PREFIX));

        let verified = repo.verify(&raw_key).await.unwrap().expect("key should verify");
        assert_eq!(verified.id, row.id);
        assert!(verified.last_used_at.is_some());

        repo.disable(row.id).await.unwrap();
        assert!(repo.verify(&raw_key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_key_does_not_verify() {
        let pool = crate::store::connect(":memory:").await.unwrap();
        crate::store::run_migrations(&pool).await.unwrap();
        let repo = ApiKeyRepo::new(pool);

        assert!(repo.verify("ob_not-a-real-key").await.unwrap().is_none());
    }
}
