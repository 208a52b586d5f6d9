use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::SqliteConnectOptions;
use sqlx::sqlite::SqliteJournalMode;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

/// Open (creating if absent) the embedded database at `database_path`,
/// applying the pragmas spec §4.1 requires: WAL journaling, foreign-key
/// enforcement, and a busy-wait timeout of at least 5 seconds.
///
/// Grounded on `original_source/src/outbox/db.py::get_db`.
pub async fn connect(database_path: &str) -> Result<SqlitePool, anyhow::Error> {
    if let Some(parent) = Path::new(database_path).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite://{database_path}"))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new().connect_with(options).await?;
    Ok(pool)
}

/// Run the embedded migrations. Must complete before the HTTP server or the
/// delivery engine begin accepting work.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), anyhow::Error> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
