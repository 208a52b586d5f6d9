use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::OutboxError;

/// Append-only audit trail for admin mutations (retry, cancel, key
/// enable/disable, ...).
///
/// Grounded on `original_source/src/outbox/blueprints/api.py::_audit_log`.
#[derive(Clone)]
pub struct AuditLog {
    pool: SqlitePool,
}

impl AuditLog {
    pub fn new(pool: SqlitePool) -> Self { Self { pool } }

    #[tracing::instrument(skip(self))]
    pub async fn record(
        &self,
        actor: &str,
        action: &str,
        target: &str,
        details: Option<&str>,
    ) -> Result<(), OutboxError> {
        sqlx::query(
            "INSERT INTO audit_log (timestamp, actor, action, target, details) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(Utc::now())
        .bind(actor)
        .bind(action)
        .bind(target)
        .bind(details)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn record_writes_succeed_for_distinct_targets() {
        let pool = crate::store::connect(":memory:").await.unwrap();
        crate::store::run_migrations(&pool).await.unwrap();
        let log = AuditLog::new(pool);

        log.record("admin", "retry", "msg-uuid-1", Some("reset from dead")).await.unwrap();
        log.record("admin", "cancel", "msg-uuid-2", None).await.unwrap();
    }
}
