use outbox::configuration::get_configuration;
use outbox::configuration::Settings;
use outbox::delivery::smtp::StubTransport;
use outbox::repos::ApiKeyRepo;
use outbox::startup::Application;
use outbox::store;
use sqlx::SqlitePool;

pub struct TestApp {
    pub address: String,
    pub api_client: reqwest::Client,
    pub api_key: String,
    pub transport: StubTransport,
    /// Direct handle to the app's database, for assertions the HTTP
    /// projection doesn't expose (e.g. attachment `sha256`/`disk_path`).
    pub pool: SqlitePool,
}

impl TestApp {
    pub async fn post_message(&self, body: &serde_json::Value) -> reqwest::Response {
        self.api_client
            .post(format!("{}/api/v1/messages", &self.address))
            .header("X-API-Key", &self.api_key)
            .json(body)
            .send()
            .await
            .expect("request to spawned app should not fail")
    }

    pub async fn get_message(&self, uuid: &str) -> reqwest::Response {
        self.api_client
            .get(format!("{}/api/v1/messages/{uuid}", &self.address))
            .header("X-API-Key", &self.api_key)
            .send()
            .await
            .expect("request to spawned app should not fail")
    }

    pub async fn retry_message(&self, uuid: &str) -> reqwest::Response {
        self.api_client
            .post(format!("{}/api/v1/messages/{uuid}/retry", &self.address))
            .header("X-API-Key", &self.api_key)
            .send()
            .await
            .expect("request to spawned app should not fail")
    }

    pub async fn cancel_message(&self, uuid: &str) -> reqwest::Response {
        self.api_client
            .post(format!("{}/api/v1/messages/{uuid}/cancel", &self.address))
            .header("X-API-Key", &self.api_key)
            .send()
            .await
            .expect("request to spawned app should not fail")
    }
}

/// Spawn a fully-wired `Application` against a temporary SQLite database and
/// blob root, with a `StubTransport` standing in for the real SMTP relay.
/// Mirrors the teacher's `tests/api/helpers.rs::spawn_app`.
pub async fn spawn_app() -> TestApp { spawn_app_with(|_| {}).await }

pub async fn spawn_app_with(customize: impl FnOnce(&mut Settings)) -> TestApp {
    spawn_app_ex(customize, StubTransport::new(), true).await
}

/// Like `spawn_app_with`, but never starts the delivery engine task — for
/// tests that need to observe a `queued` message before anything can pick it
/// up (e.g. cancel-before-pickup).
pub async fn spawn_app_http_only_with(customize: impl FnOnce(&mut Settings)) -> TestApp {
    spawn_app_ex(customize, StubTransport::new(), false).await
}

/// Like `spawn_app_with`, but lets the caller prime the stub transport (e.g.
/// `StubTransport::always_failing()` to exercise retry/dead-letter paths).
pub async fn spawn_app_with_transport(customize: impl FnOnce(&mut Settings), transport: StubTransport) -> TestApp {
    spawn_app_ex(customize, transport, true).await
}

async fn spawn_app_ex(customize: impl FnOnce(&mut Settings), transport: StubTransport, start_engine: bool) -> TestApp {
    let db_dir = Box::leak(Box::new(tempfile::tempdir().expect("tempdir")));
    let blob_dir = Box::leak(Box::new(tempfile::tempdir().expect("tempdir")));

    let mut cfg = get_configuration().expect("configuration.yaml must be readable in the crate root");
    cfg.application_host = "127.0.0.1".to_string();
    cfg.application_port = 0;
    cfg.database_path = db_dir.path().join("outbox.sqlite3").to_string_lossy().to_string();
    cfg.blob_directory = blob_dir.path().to_string_lossy().to_string();
    cfg.queue_poll_interval_seconds = 0;
    customize(&mut cfg);

    let (application, engine, shutdown_tx) =
        Application::build_with_transport(&cfg, transport.clone()).await.expect("failed to build application");

    let address = format!("http://127.0.0.1:{}", application.get_port());

    let pool = store::connect(&cfg.database_path).await.expect("failed to open test database");
    let api_keys = ApiKeyRepo::new(pool.clone());
    let (_, api_key) = api_keys.generate("integration-test").await.expect("failed to mint test api key");

    tokio::spawn(application.run_until_stopped());
    if start_engine {
        let shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move { engine.run(shutdown_rx).await });
    } else {
        drop(shutdown_tx);
    }

    TestApp { address, api_client: reqwest::Client::new(), api_key, transport, pool }
}
