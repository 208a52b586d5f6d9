use rand::RngCore;
use sqlx::SqlitePool;

use crate::error::OutboxError;

/// A row of the `app_setting` table: a flat key/value store (spec §6.2,
/// `SPEC_FULL.md` §3). Internal use only — never exposed over HTTP.
///
/// Grounded on `original_source/src/outbox/models/app_setting.py`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AppSetting {
    pub key: String,
    pub value: String,
    pub description: String,
}

#[derive(Clone)]
pub struct AppSettingRepo {
    pool: SqlitePool,
}

impl AppSettingRepo {
    pub fn new(pool: SqlitePool) -> Self { Self { pool } }

    pub async fn get(&self, key: &str) -> Result<Option<String>, OutboxError> {
        let value = sqlx::query_scalar("SELECT value FROM app_setting WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    pub async fn set(&self, key: &str, value: &str, description: &str) -> Result<(), OutboxError> {
        sqlx::query(
            "INSERT INTO app_setting (key, value, description) VALUES (?, ?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, description = excluded.description",
        )
        .bind(key)
        .bind(value)
        .bind(description)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_all(&self) -> Result<Vec<AppSetting>, OutboxError> {
        let rows = sqlx::query_as::<_, AppSetting>("SELECT * FROM app_setting ORDER BY key")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}

const SECRET_KEY_SETTING: &str = "secret_key";

/// Ensure a server-generated secret exists, minting one on first boot.
/// Grounded on `original_source/src/outbox/db.py`'s `init_db` call to
/// `AppSetting.rotate_secret_key()`; this crate has no HMAC-signed cookie
/// surface to consume it (that's the out-of-scope session-auth subsystem),
/// so it's persisted and otherwise left alone.
pub async fn ensure_secret_key(pool: &SqlitePool) -> Result<(), OutboxError> {
    let settings = AppSettingRepo::new(pool.clone());
    if settings.get(SECRET_KEY_SETTING).await?.is_some() {
        return Ok(());
    }

    let mut random = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut random);
    let secret = hex::encode(random);
    settings.set(SECRET_KEY_SETTING, &secret, "server-generated, rotated only by re-running init on an empty row").await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ensure_secret_key_is_generated_once() {
        let pool = crate::store::connect(":memory:").await.unwrap();
        crate::store::run_migrations(&pool).await.unwrap();

        ensure_secret_key(&pool).await.unwrap();
        let settings = AppSettingRepo::new(pool.clone());
        let first = settings.get("secret_key").await.unwrap().unwrap();

        ensure_secret_key(&pool).await.unwrap();
        let second = settings.get("secret_key").await.unwrap().unwrap();

        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
    }

    #[tokio::test]
    async fn set_upserts_value_and_description() {
        let pool = crate::store::connect(":memory:").await.unwrap();
        crate::store::run_migrations(&pool).await.unwrap();
        let settings = AppSettingRepo::new(pool);

        settings.set("retention_days_override", "14", "ops override").await.unwrap();
        settings.set("retention_days_override", "30", "ops override").await.unwrap();

        let all = settings.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].value, "30");
    }
}
