use std::collections::HashMap;

use chrono::DateTime;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::MessageStatus;
use crate::error::OutboxError;

/// A row of the `message` table (spec §3). Recipient lists are kept as their
/// raw JSON-encoded text; use `to_list`/`cc_list`/`bcc_list` to decode them.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Message {
    pub id: i64,
    pub uuid: String,
    pub status: String,
    pub delivery_type: String,
    pub from_address: String,
    pub to_recipients: String,
    pub cc_recipients: Option<String>,
    pub bcc_recipients: Option<String>,
    pub subject: String,
    pub body: String,
    pub body_type: String,
    pub retries_remaining: i64,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub source_app: Option<String>,
    pub source_api_key_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn status(&self) -> MessageStatus {
        self.status.parse().expect("status column always holds a valid MessageStatus")
    }

    /// Decode `to_recipients`, tolerating a legacy bare-string row.
    pub fn to_list(&self) -> Vec<String> { decode_recipients(&self.to_recipients) }

    pub fn cc_list(&self) -> Vec<String> {
        self.cc_recipients.as_deref().map(decode_recipients).unwrap_or_default()
    }

    pub fn bcc_list(&self) -> Vec<String> {
        self.bcc_recipients.as_deref().map(decode_recipients).unwrap_or_default()
    }
}

fn decode_recipients(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_else(|_| {
        if raw.is_empty() { Vec::new() } else { vec![raw.to_string()] }
    })
}

pub struct NewMessage<'a> {
    pub from_address: &'a str,
    pub to: &'a [String],
    pub cc: Option<&'a [String]>,
    pub bcc: Option<&'a [String]>,
    pub subject: &'a str,
    pub body: &'a str,
    pub body_type: &'a str,
    pub delivery_type: &'a str,
    pub source_app: Option<&'a str>,
    pub source_api_key_id: Option<i64>,
    pub max_retries: i64,
}

#[derive(Debug, Default, serde::Serialize)]
pub struct MessageStats {
    pub by_status: HashMap<String, i64>,
    pub total: i64,
}

/// Queries and mutations over the `message` entity (spec §4.3), including
/// batch selection for the delivery engine and retention purge.
///
/// Grounded on `original_source/src/outbox/models/message.py`.
#[derive(Clone)]
pub struct MessageRepo {
    pool: SqlitePool,
}

impl MessageRepo {
    pub fn new(pool: SqlitePool) -> Self { Self { pool } }

    #[tracing::instrument(skip(self, new))]
    pub async fn create(&self, new: NewMessage<'_>) -> Result<Message, OutboxError> {
        let msg_uuid = Uuid::new_v4().to_string();
        let now = Utc::now();
        let to_json = serde_json::to_string(new.to).expect("Vec<String> always serializes");
        let cc_json = new.cc.map(|v| serde_json::to_string(v).expect("Vec<String> always serializes"));
        let bcc_json = new.bcc.map(|v| serde_json::to_string(v).expect("Vec<String> always serializes"));

        sqlx::query(
            "INSERT INTO message \
             (uuid, status, delivery_type, from_address, to_recipients, cc_recipients, \
              bcc_recipients, subject, body, body_type, retries_remaining, source_app, \
              source_api_key_id, created_at, updated_at) \
             VALUES (?, 'queued', ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&msg_uuid)
        .bind(new.delivery_type)
        .bind(new.from_address)
        .bind(&to_json)
        .bind(&cc_json)
        .bind(&bcc_json)
        .bind(new.subject)
        .bind(new.body)
        .bind(new.body_type)
        .bind(new.max_retries)
        .bind(new.source_app)
        .bind(new.source_api_key_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_by_uuid(&msg_uuid)
            .await?
            .ok_or_else(|| OutboxError::Internal(anyhow::anyhow!("message vanished immediately after insert")))
    }

    pub async fn get_by_uuid(&self, msg_uuid: &str) -> Result<Option<Message>, OutboxError> {
        let row = sqlx::query_as::<_, Message>("SELECT * FROM message WHERE uuid = ?")
            .bind(msg_uuid)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Message>, OutboxError> {
        let row = sqlx::query_as::<_, Message>("SELECT * FROM message WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Transactional single-row status update. Sets `updated_at = now`, and
    /// `sent_at = now` only when transitioning to `sent` (spec §4.3).
    #[tracing::instrument(skip(self))]
    pub async fn update_status(
        &self,
        id: i64,
        new_status: MessageStatus,
        retries_remaining: i64,
        last_error: Option<&str>,
        next_retry_at: Option<DateTime<Utc>>,
    ) -> Result<(), OutboxError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        if new_status == MessageStatus::Sent {
            sqlx::query(
                "UPDATE message SET status = ?, retries_remaining = ?, last_error = ?, \
                 next_retry_at = ?, updated_at = ?, sent_at = ? WHERE id = ?",
            )
            .bind(new_status.as_str())
            .bind(retries_remaining)
            .bind(last_error)
            .bind(next_retry_at)
            .bind(now)
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        } else {
            sqlx::query(
                "UPDATE message SET status = ?, retries_remaining = ?, last_error = ?, \
                 next_retry_at = ?, updated_at = ? WHERE id = ?",
            )
            .bind(new_status.as_str())
            .bind(retries_remaining)
            .bind(last_error)
            .bind(next_retry_at)
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn list(
        &self,
        status: Option<&str>,
        search: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>, OutboxError> {
        let term = search.map(|s| format!("%{s}%"));

        let rows = match (status, &term) {
            (Some(status), Some(term)) => {
                sqlx::query_as::<_, Message>(
                    "SELECT * FROM message WHERE status = ? AND \
                     (subject LIKE ? OR to_recipients LIKE ? OR from_address LIKE ? OR uuid LIKE ?) \
                     ORDER BY created_at DESC LIMIT ? OFFSET ?",
                )
                .bind(status)
                .bind(term)
                .bind(term)
                .bind(term)
                .bind(term)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
            (Some(status), None) => {
                sqlx::query_as::<_, Message>(
                    "SELECT * FROM message WHERE status = ? ORDER BY created_at DESC LIMIT ? OFFSET ?",
                )
                .bind(status)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
            (None, Some(term)) => {
                sqlx::query_as::<_, Message>(
                    "SELECT * FROM message WHERE \
                     (subject LIKE ? OR to_recipients LIKE ? OR from_address LIKE ? OR uuid LIKE ?) \
                     ORDER BY created_at DESC LIMIT ? OFFSET ?",
                )
                .bind(term)
                .bind(term)
                .bind(term)
                .bind(term)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
            (None, None) => {
                sqlx::query_as::<_, Message>(
                    "SELECT * FROM message ORDER BY created_at DESC LIMIT ? OFFSET ?",
                )
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows)
    }

    pub async fn count(&self, status: Option<&str>) -> Result<i64, OutboxError> {
        let count: i64 = match status {
            Some(status) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM message WHERE status = ?")
                    .bind(status)
                    .fetch_one(&self.pool)
                    .await?
            }
            None => sqlx::query_scalar("SELECT COUNT(*) FROM message").fetch_one(&self.pool).await?,
        };
        Ok(count)
    }

    pub async fn stats(&self) -> Result<MessageStats, OutboxError> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM message GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        let mut stats = MessageStats::default();
        for (status, count) in rows {
            stats.total += count;
            stats.by_status.insert(status, count);
        }
        Ok(stats)
    }

    /// Rows ready for the delivery engine to pick up: `queued`, or `failed`
    /// with an elapsed `next_retry_at` (spec §4.3, §4.5).
    pub async fn get_pending_batch(&self, batch_size: i64) -> Result<Vec<Message>, OutboxError> {
        let now = Utc::now();
        let rows = sqlx::query_as::<_, Message>(
            "SELECT * FROM message \
             WHERE status = 'queued' \
                OR (status = 'failed' AND next_retry_at IS NOT NULL AND next_retry_at <= ?) \
             ORDER BY created_at ASC LIMIT ?",
        )
        .bind(now)
        .bind(batch_size)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Delete terminal rows (`sent`, `dead`, `cancelled`) older than
    /// `retention_days`; returns the number of rows deleted.
    #[tracing::instrument(skip(self))]
    pub async fn purge_old(&self, retention_days: i64) -> Result<u64, OutboxError> {
        let cutoff = Utc::now() - chrono::Duration::days(retention_days);
        let result = sqlx::query(
            "DELETE FROM message WHERE status IN ('sent', 'dead', 'cancelled') AND updated_at < ?",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
