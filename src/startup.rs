use std::net::TcpListener;

use actix_web::dev::Server;
use actix_web::web;
use actix_web::App;
use actix_web::HttpServer;
use sqlx::SqlitePool;
use tokio::sync::watch;
use tracing_actix_web::TracingLogger;

use crate::admin_ops::AdminOps;
use crate::app_setting;
use crate::audit::AuditLog;
use crate::blob_store::BlobStore;
use crate::configuration::Settings;
use crate::delivery::smtp::LettreTransport;
use crate::delivery::smtp::MailTransport;
use crate::delivery::DeliveryEngine;
use crate::delivery::DeliveryEngineConfig;
use crate::repos::ApiKeyRepo;
use crate::repos::AttachmentRepo;
use crate::repos::MessageRepo;
use crate::routes;
use crate::store;
use crate::submitter::Submitter;

/// Wrapper for actix's `Server` with access to the bound port.
pub struct Application {
    port: u16,
    server: Server,
}

impl Application {
    /// Wire the store, blob store, repos, submitter, admin ops and HTTP
    /// routes, and build (but do not spawn) the delivery engine that shares
    /// the same connection pool.
    ///
    /// Grounded on the teacher's `Application::build`/`run`.
    pub async fn build(
        cfg: &Settings,
    ) -> Result<(Self, DeliveryEngine<LettreTransport>, watch::Sender<bool>), anyhow::Error> {
        let transport = LettreTransport::from_settings(cfg)?;
        Self::build_with_transport(cfg, transport).await
    }

    /// Same wiring as `build`, but with the mail transport supplied by the
    /// caller — lets integration tests swap in a `StubTransport`.
    pub async fn build_with_transport<T: MailTransport + 'static>(
        cfg: &Settings,
        transport: T,
    ) -> Result<(Self, DeliveryEngine<T>, watch::Sender<bool>), anyhow::Error> {
        let pool = store::connect(&cfg.database_path).await?;
        store::run_migrations(&pool).await?;
        app_setting::ensure_secret_key(&pool).await?;

        let blobs = BlobStore::new(cfg.blob_directory.clone(), cfg.blob_max_size_bytes());
        let api_keys = ApiKeyRepo::new(pool.clone());
        bootstrap_api_keys(&api_keys, cfg).await?;

        let messages = MessageRepo::new(pool.clone());
        let attachments = AttachmentRepo::new(pool.clone());
        let audit = AuditLog::new(pool.clone());

        let submitter = Submitter::new(pool.clone(), blobs, audit.clone(), cfg.queue_max_retries);
        let admin_ops = AdminOps::new(messages.clone(), audit.clone(), cfg.queue_max_retries);

        let engine = DeliveryEngine::new(
            messages,
            attachments,
            transport,
            DeliveryEngineConfig {
                max_retries: cfg.queue_max_retries,
                retry_base_seconds: cfg.queue_retry_base_seconds,
                retry_max_seconds: cfg.queue_retry_max_seconds,
                batch_size: cfg.queue_batch_size,
                poll_interval: std::time::Duration::from_secs(cfg.queue_poll_interval_seconds),
                retention_days: cfg.retention_days,
            },
        );

        let addr = format!("{}:{}", cfg.application_host, cfg.application_port);
        let listener = TcpListener::bind(addr)?;
        let port = listener.local_addr()?.port();

        let server = run(listener, pool, submitter, admin_ops, api_keys).await?;
        let (shutdown_tx, _) = watch::channel(false);

        Ok((Self { port, server }, engine, shutdown_tx))
    }

    pub fn get_port(&self) -> u16 { self.port }

    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> { self.server.await }
}

async fn bootstrap_api_keys(api_keys: &ApiKeyRepo, cfg: &Settings) -> Result<(), anyhow::Error> {
    if !api_keys.get_all().await?.is_empty() {
        return Ok(());
    }
    for description in &cfg.api_keys_bootstrap {
        let (_, raw_key) = api_keys.generate(description).await?;
        tracing::warn!(
            description = %description,
            api_key = %raw_key,
            "bootstrapped an API key; record this value now, it will not be shown again"
        );
    }
    Ok(())
}

async fn run(
    listener: TcpListener,
    pool: SqlitePool,
    submitter: Submitter,
    admin_ops: AdminOps,
    api_keys: ApiKeyRepo,
) -> Result<Server, anyhow::Error> {
    let pool = web::Data::new(pool);
    let submitter = web::Data::new(submitter);
    let admin_ops = web::Data::new(admin_ops);
    let api_keys = web::Data::new(api_keys);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .configure(routes::configure)
            .app_data(pool.clone())
            .app_data(submitter.clone())
            .app_data(admin_ops.clone())
            .app_data(api_keys.clone())
    })
    .listen(listener)?
    .run();

    Ok(server)
}
