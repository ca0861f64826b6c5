#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod args;

use args::Args;
use clap::Parser;
use switchyard_server::Server;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = args.load_config()?;

    let _telemetry_guard = switchyard_telemetry::init(&config.telemetry, &args.log)?;

    let groups = config.groups.len();
    let persistence = config.persistence.backend;
    let server = Box::pin(Server::new(config)).await?;

    tracing::info!(
        config_path = %args.config.display(),
        listen_address = %server.listen_address(),
        groups,
        ?persistence,
        "switchyard ready"
    );

    server.serve(cancel_on_signal()).await?;

    tracing::info!("switchyard stopped");
    Ok(())
}

/// Token cancelled on the first `SIGINT` or `SIGTERM`
fn cancel_on_signal() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(signal) => tracing::info!(signal, "draining connections"),
            Err(e) => tracing::error!(error = %e, "signal handler unavailable, shutting down"),
        }
        trigger.cancel();
    });

    token
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map(|()| "SIGINT"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|()| "SIGINT")
}
