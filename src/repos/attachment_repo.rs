use chrono::DateTime;
use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::OutboxError;

/// A row of the `attachment` table (spec §3). `sha256`/`disk_path`/
/// `size_bytes` describe the blob in the `BlobStore`; `filename`/
/// `content_type` are caller-supplied metadata only. Multiple rows may share
/// a `disk_path` (content-addressed dedup).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Attachment {
    pub id: i64,
    pub message_id: i64,
    pub filename: String,
    pub content_type: String,
    pub sha256: String,
    pub disk_path: String,
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
}

pub struct NewAttachment<'a> {
    pub message_id: i64,
    pub filename: &'a str,
    pub content_type: &'a str,
    pub sha256: &'a str,
    pub disk_path: &'a str,
    pub size_bytes: i64,
}

/// Queries over the `attachment` entity (spec §4.2, §4.3).
///
/// Grounded on `original_source/src/outbox/models/attachment.py`.
#[derive(Clone)]
pub struct AttachmentRepo {
    pool: SqlitePool,
}

impl AttachmentRepo {
    pub fn new(pool: SqlitePool) -> Self { Self { pool } }

    pub async fn create(&self, new: NewAttachment<'_>) -> Result<Attachment, OutboxError> {
        let now = Utc::now();
        let id = sqlx::query(
            "INSERT INTO attachment \
             (message_id, filename, content_type, sha256, disk_path, size_bytes, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(new.message_id)
        .bind(new.filename)
        .bind(new.content_type)
        .bind(new.sha256)
        .bind(new.disk_path)
        .bind(new.size_bytes)
        .bind(now)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        sqlx::query_as::<_, Attachment>("SELECT * FROM attachment WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(OutboxError::from)
    }

    pub async fn get_for_message(&self, message_id: i64) -> Result<Vec<Attachment>, OutboxError> {
        let rows = sqlx::query_as::<_, Attachment>(
            "SELECT * FROM attachment WHERE message_id = ? ORDER BY id ASC",
        )
        .bind(message_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

}
