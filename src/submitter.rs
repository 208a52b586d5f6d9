use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use serde::Deserialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::audit::AuditLog;
use crate::blob_store::BlobStore;
use crate::domain::BodyType;
use crate::error::OutboxError;
use crate::repos::Message;

#[derive(Debug, Deserialize)]
pub struct AttachmentInput {
    pub filename: String,
    pub content_type: String,
    pub content_base64: String,
}

#[derive(Debug, Default)]
pub struct SubmitRequest {
    pub from_address: String,
    pub to: Vec<String>,
    pub cc: Option<Vec<String>>,
    pub bcc: Option<Vec<String>>,
    pub subject: String,
    pub body: String,
    pub body_type: String,
    pub delivery_type: String,
    pub source_app: Option<String>,
    pub source_api_key_id: Option<i64>,
    pub attachments: Vec<AttachmentInput>,
}

/// Validates and persists a new message plus its attachments as one
/// observable unit (spec §4.4): the message row never appears `queued`
/// with an incomplete attachment set.
///
/// Grounded on `original_source/src/outbox/blueprints/api.py::submit_message`
/// and the teacher's `idempotency/persistence.rs` transaction style.
#[derive(Clone)]
pub struct Submitter {
    pool: SqlitePool,
    blobs: BlobStore,
    audit: AuditLog,
    max_retries: i64,
}

impl Submitter {
    pub fn new(pool: SqlitePool, blobs: BlobStore, audit: AuditLog, max_retries: i64) -> Self {
        Self { pool, blobs, audit, max_retries }
    }

    #[tracing::instrument(skip(self, req), fields(to_count = req.to.len()))]
    pub async fn submit(&self, req: SubmitRequest) -> Result<Message, OutboxError> {
        validate(&req)?;

        let mut decoded = Vec::with_capacity(req.attachments.len());
        for a in &req.attachments {
            let bytes = BASE64
                .decode(&a.content_base64)
                .map_err(|e| OutboxError::Validation(format!("attachment {}: invalid base64: {e}", a.filename)))?;
            decoded.push((a, bytes));
        }

        // Content-addressed puts are idempotent, so it's safe to write the
        // blobs before the rows exist.
        let mut blobs = Vec::with_capacity(decoded.len());
        for (a, bytes) in &decoded {
            let (sha256, path) = self.blobs.put(bytes).await?;
            blobs.push((*a, sha256, path.to_string_lossy().to_string(), bytes.len() as i64));
        }

        let msg_uuid = Uuid::new_v4().to_string();
        let now = Utc::now();
        let to_json = serde_json::to_string(&req.to).expect("Vec<String> always serializes");
        let cc_json = req.cc.as_ref().map(|v| serde_json::to_string(v).expect("Vec<String> always serializes"));
        let bcc_json = req.bcc.as_ref().map(|v| serde_json::to_string(v).expect("Vec<String> always serializes"));

        let mut tx = self.pool.begin().await?;

        let message_id = sqlx::query(
            "INSERT INTO message \
             (uuid, status, delivery_type, from_address, to_recipients, cc_recipients, \
              bcc_recipients, subject, body, body_type, retries_remaining, source_app, \
              source_api_key_id, created_at, updated_at) \
             VALUES (?, 'queued', ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&msg_uuid)
        .bind(&req.delivery_type)
        .bind(&req.from_address)
        .bind(&to_json)
        .bind(&cc_json)
        .bind(&bcc_json)
        .bind(&req.subject)
        .bind(&req.body)
        .bind(&req.body_type)
        .bind(self.max_retries)
        .bind(&req.source_app)
        .bind(req.source_api_key_id)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        for (a, sha256, disk_path, size_bytes) in &blobs {
            sqlx::query(
                "INSERT INTO attachment (message_id, filename, content_type, sha256, disk_path, size_bytes, created_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(message_id)
            .bind(a.filename.as_str())
            .bind(a.content_type.as_str())
            .bind(sha256.as_str())
            .bind(disk_path.as_str())
            .bind(*size_bytes)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        let row = sqlx::query_as::<_, Message>("SELECT * FROM message WHERE id = ?")
            .bind(message_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        self.audit
            .record("api", "message_submitted", &msg_uuid, Some(&req.subject))
            .await?;

        Ok(row)
    }
}

fn validate(req: &SubmitRequest) -> Result<(), OutboxError> {
    if req.from_address.trim().is_empty() {
        return Err(OutboxError::Validation("from_address must not be empty".into()));
    }
    if req.to.is_empty() {
        return Err(OutboxError::Validation("to must contain at least one address".into()));
    }
    req.body_type
        .parse::<BodyType>()
        .map_err(|e| OutboxError::Validation(e.to_string()))?;
    Ok(())
}
