use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;

use crate::delivery::smtp::build_message;
use crate::delivery::smtp::AttachmentPart;
use crate::delivery::smtp::MailTransport;
use crate::domain::BodyType;
use crate::domain::MessageStatus;
use crate::repos::AttachmentRepo;
use crate::repos::Message;
use crate::repos::MessageRepo;

pub struct DeliveryEngineConfig {
    pub max_retries: i64,
    pub retry_base_seconds: i64,
    pub retry_max_seconds: i64,
    pub batch_size: i64,
    pub poll_interval: Duration,
    pub retention_days: i64,
}

/// Long-running poll → send → purge loop (spec §4.5). A single worker is
/// assumed; `sending` is purely informational and is not recovered across a
/// crash (see DESIGN.md's Open Question decision).
///
/// Grounded on `original_source/worker/queue_worker.py`'s loop shape and
/// backoff formula, and the teacher's `main.rs` task/shutdown pattern.
pub struct DeliveryEngine<T: MailTransport> {
    messages: MessageRepo,
    attachments: AttachmentRepo,
    transport: T,
    config: DeliveryEngineConfig,
}

impl<T: MailTransport> DeliveryEngine<T> {
    pub fn new(messages: MessageRepo, attachments: AttachmentRepo, transport: T, config: DeliveryEngineConfig) -> Self {
        Self { messages, attachments, transport, config }
    }

    #[tracing::instrument(skip_all)]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("delivery engine starting");
        let mut cycle: u64 = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.messages.get_pending_batch(self.config.batch_size).await {
                Ok(batch) => {
                    if !batch.is_empty() {
                        tracing::info!(batch_size = batch.len(), "processing pending batch");
                    }
                    for msg in batch {
                        if *shutdown.borrow() {
                            break;
                        }
                        self.handle_one(msg).await;
                    }
                }
                Err(e) => tracing::error!(error = ?e, "failed to fetch pending batch"),
            }

            if let Err(e) = self.messages.purge_old(self.config.retention_days).await {
                tracing::error!(error = ?e, "failed to purge old messages");
            }
            cycle += 1;
            tracing::debug!(cycle, "poll cycle complete");

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = shutdown.changed() => {}
            }
        }

        tracing::info!("delivery engine stopped");
    }

    #[tracing::instrument(skip(self, msg), fields(message.uuid = %msg.uuid))]
    async fn handle_one(&self, msg: Message) {
        if let Err(e) = self
            .messages
            .update_status(msg.id, MessageStatus::Sending, msg.retries_remaining, None, None)
            .await
        {
            tracing::error!(error = ?e, "failed to mark message sending");
            return;
        }

        match self.send(&msg).await {
            Ok(()) => {
                if let Err(e) = self
                    .messages
                    .update_status(msg.id, MessageStatus::Sent, msg.retries_remaining, None, None)
                    .await
                {
                    tracing::error!(error = ?e, "failed to mark message sent after a successful send");
                }
                tracing::info!("message sent");
            }
            Err(e) => self.handle_send_failure(&msg, e).await,
        }
    }

    async fn handle_send_failure(&self, msg: &Message, error: anyhow::Error) {
        let retries_remaining = msg.retries_remaining - 1;
        let last_error = error.to_string();

        if retries_remaining > 0 {
            let exponent = (self.config.max_retries - retries_remaining - 1).max(0) as u32;
            let pow = 1i64.checked_shl(exponent.min(62)).unwrap_or(i64::MAX);
            let delay = self.config.retry_base_seconds.saturating_mul(pow).min(self.config.retry_max_seconds);
            let next_retry_at = Utc::now() + chrono::Duration::seconds(delay);

            tracing::warn!(retries_remaining, delay_seconds = delay, error = %last_error, "send failed, will retry");
            if let Err(e) = self
                .messages
                .update_status(msg.id, MessageStatus::Failed, retries_remaining, Some(&last_error), Some(next_retry_at))
                .await
            {
                tracing::error!(error = ?e, "failed to record retry schedule");
            }
        } else {
            tracing::error!(error = %last_error, "send failed, retries exhausted, dead-lettering");
            if let Err(e) = self
                .messages
                .update_status(msg.id, MessageStatus::Dead, retries_remaining, Some(&last_error), None)
                .await
            {
                tracing::error!(error = ?e, "failed to record dead-letter");
            }
        }
    }

    async fn send(&self, msg: &Message) -> Result<(), anyhow::Error> {
        let body_type: BodyType = msg.body_type.parse().map_err(|e| anyhow::anyhow!("{e}"))?;

        let rows = self.attachments.get_for_message(msg.id).await?;
        let mut parts = Vec::with_capacity(rows.len());
        for row in rows {
            match tokio::fs::read(&row.disk_path).await {
                Ok(bytes) => parts.push(AttachmentPart {
                    filename: row.filename,
                    content_type: row.content_type,
                    bytes,
                }),
                Err(e) => tracing::warn!(
                    attachment.id = row.id,
                    attachment.sha256 = %row.sha256,
                    error = %e,
                    "attachment blob missing, skipping it for this send"
                ),
            }
        }

        let message = build_message(
            &msg.from_address,
            &msg.to_list(),
            &msg.cc_list(),
            &msg.bcc_list(),
            &msg.subject,
            &msg.body,
            body_type,
            &parts,
        )?;

        self.transport.send(message).await
    }
}
