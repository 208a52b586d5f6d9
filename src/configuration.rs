use config::Config;
use config::ConfigError;
use config::Environment;
use config::File;
use config::FileFormat;
use secrecy::Secret;
use serde::Deserialize;

/// Full configuration surface (spec §6.3), plus the HTTP bind address and the
/// admin API-key bootstrap list every teacher-style `Settings` carries.
///
/// Grounded on the teacher's `configuration::get_configuration`. The
/// INI-import registry, SQL-inspection view, and HTML config editor from
/// `original_source/src/outbox/config.py` are explicitly out of scope.
#[derive(Deserialize, Clone)]
pub struct Settings {
    pub application_host: String,
    pub application_port: u16,

    pub database_path: String,
    pub blob_directory: String,
    pub blob_max_size_mb: u64,

    pub smtp_server: String,
    pub smtp_port: u16,
    pub smtp_use_tls: bool,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<Secret<String>>,
    pub mail_default_sender: String,

    pub queue_poll_interval_seconds: u64,
    pub queue_max_retries: i64,
    pub queue_retry_base_seconds: i64,
    pub queue_retry_max_seconds: i64,
    pub queue_batch_size: i64,
    pub retention_days: i64,

    /// Keys minted on first startup when the `api_key` table is empty, so a
    /// fresh deployment isn't locked out of its own admin API (Open Question,
    /// see DESIGN.md). Each entry is a human-readable description; the raw
    /// key is generated and logged once at startup.
    #[serde(default)]
    pub api_keys_bootstrap: Vec<String>,
}

impl Settings {
    pub fn blob_max_size_bytes(&self) -> u64 { self.blob_max_size_mb * 1024 * 1024 }
}

/// Load `configuration.yaml` from the current directory, then apply
/// environment overrides prefixed `OUTBOX`, with `__` as the nesting
/// separator (e.g. `OUTBOX__SMTP_PORT=2525`).
pub fn get_configuration() -> Result<Settings, ConfigError> {
    let settings = Config::builder()
        .add_source(File::new("configuration.yaml", FileFormat::Yaml))
        .add_source(Environment::with_prefix("outbox").separator("__"))
        .build()?;
    settings.try_deserialize()
}
