use crate::audit::AuditLog;
use crate::domain::MessageStatus;
use crate::error::OutboxError;
use crate::repos::Message;
use crate::repos::MessageRepo;
use crate::repos::MessageStats;

/// Operator-facing mutations over the message queue (spec §4.6): retry,
/// cancel, and read proxies onto `MessageRepo`. Every mutation writes one
/// `AuditLog` row.
///
/// Grounded on `original_source/src/outbox/client/backends/local.py` and the
/// retry/cancel handlers in `blueprints/api.py`.
#[derive(Clone)]
pub struct AdminOps {
    messages: MessageRepo,
    audit: AuditLog,
    max_retries: i64,
}

impl AdminOps {
    pub fn new(messages: MessageRepo, audit: AuditLog, max_retries: i64) -> Self {
        Self { messages, audit, max_retries }
    }

    #[tracing::instrument(skip(self))]
    pub async fn retry(&self, msg_uuid: &str, actor: &str) -> Result<Message, OutboxError> {
        let msg = self.messages.get_by_uuid(msg_uuid).await?.ok_or(OutboxError::NotFound)?;
        if !matches!(msg.status(), MessageStatus::Failed | MessageStatus::Dead) {
            return Err(OutboxError::InvalidState(format!(
                "cannot retry a message in status {}",
                msg.status()
            )));
        }

        self.messages
            .update_status(msg.id, MessageStatus::Queued, self.max_retries, None, None)
            .await?;
        self.audit.record(actor, "message_retried", msg_uuid, None).await?;

        self.messages.get_by_uuid(msg_uuid).await?.ok_or(OutboxError::NotFound)
    }

    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, msg_uuid: &str, actor: &str) -> Result<Message, OutboxError> {
        let msg = self.messages.get_by_uuid(msg_uuid).await?.ok_or(OutboxError::NotFound)?;
        if msg.status() != MessageStatus::Queued {
            return Err(OutboxError::InvalidState(format!(
                "cannot cancel a message in status {}",
                msg.status()
            )));
        }

        self.messages
            .update_status(msg.id, MessageStatus::Cancelled, msg.retries_remaining, None, None)
            .await?;
        self.audit.record(actor, "message_cancelled", msg_uuid, None).await?;

        self.messages.get_by_uuid(msg_uuid).await?.ok_or(OutboxError::NotFound)
    }

    pub async fn stats(&self) -> Result<MessageStats, OutboxError> { self.messages.stats().await }

    pub async fn get(&self, msg_uuid: &str) -> Result<Option<Message>, OutboxError> {
        self.messages.get_by_uuid(msg_uuid).await
    }

    pub async fn list(
        &self,
        status: Option<&str>,
        search: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>, OutboxError> {
        self.messages.list(status, search, limit, offset).await
    }

    pub async fn count(&self, status: Option<&str>) -> Result<i64, OutboxError> { self.messages.count(status).await }
}
