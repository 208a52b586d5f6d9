use std::fmt::Debug;
use std::fmt::Display;

use tokio::task::JoinError;
use outbox::configuration::get_configuration;
use outbox::startup::Application;
use outbox::telemetry::get_subscriber;
use outbox::telemetry::init_subscriber;

fn report_exit(name: &str, outcome: Result<Result<(), impl Debug + Display>, JoinError>) {
    match outcome {
        Ok(Ok(())) => {
            tracing::info!("{name} exited gracefully")
        }
        Ok(Err(e)) => {
            tracing::error!(error.cause_chain = ?e, error.message = %e, "{name} failed (inner)")
        }
        Err(e) => {
            tracing::error!(error.cause_chain = ?e, error.message = %e, "{name} failed (outer)")
        }
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::signal;
    use tokio::signal::unix::SignalKind;

    let mut terminate = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    tokio::signal::ctrl_c().await.ok();
}

/// Initialise telemetry, load config, run migrations, and start the HTTP
/// server and delivery engine side by side.
#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let subscriber = get_subscriber("outbox", "info", std::io::stdout);
    init_subscriber(subscriber);

    let cfg = get_configuration()?;

    let (application, engine, shutdown_tx) = Application::build(&cfg).await?;
    tracing::info!(port = application.get_port(), "listening");

    let shutdown_rx = shutdown_tx.subscribe();
    let server_thread = tokio::spawn(application.run_until_stopped());
    let engine_thread = tokio::spawn(async move { engine.run(shutdown_rx).await; Ok::<(), anyhow::Error>(()) });
    let signal_thread = tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        tracing::info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
        Ok::<(), anyhow::Error>(())
    });

    tokio::select! {
        o = server_thread => { report_exit("API", o) },
        o = engine_thread => { report_exit("delivery engine", o) },
        o = signal_thread => { report_exit("signal handler", o) },
    }

    Ok(())
}
