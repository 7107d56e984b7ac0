use anyhow::Result;
use diskmon::*;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Duration;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

/// Commands queued while a tick is in flight; the UI never sends many.
const COMMAND_CAPACITY: usize = 32;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;
    let (captures_tx, _) = broadcast::channel::<Arc<models::DeltaCapture>>(
        app_config.publishing.broadcast_capacity,
    );
    let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CAPACITY);
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    let monitor = Arc::new(monitor::Monitor::new(
        app_config.capture.retention_cap,
        app_config.source.server_name.clone(),
        app_config.capture.interval_secs,
    ));
    let source = Arc::new(source::CommandSource::from_config(&app_config.source));

    let sampler = worker::Sampler::new(
        source.clone(),
        monitor.clone(),
        captures_tx.clone(),
        Duration::from_secs(app_config.capture.fetch_timeout_secs),
    );
    let worker_handle = worker::spawn(
        sampler,
        worker::SamplerConfig {
            interval_secs: app_config.capture.interval_secs,
            stats_log_interval_secs: app_config.capture.stats_log_interval_secs,
        },
        commands_rx,
        shutdown_rx,
    );
    if app_config.capture.auto_start {
        commands_tx.send(worker::SamplerCommand::Start).await?;
    }

    let app = routes::app(
        monitor,
        commands_tx,
        captures_tx,
        source,
        app_config.clone(),
    );
    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(
        server = %app_config.source.server_name,
        interval_secs = app_config.capture.interval_secs,
        "Listening on http://{}",
        addr
    );

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = async {
            #[cfg(unix)]
            {
                let terminate = tokio::signal::unix::SignalKind::terminate();
                let mut sigterm = match tokio::signal::unix::signal(terminate) {
                    Ok(s) => s,
                    Err(_) => {
                        let _ = tokio::signal::ctrl_c().await;
                        return;
                    }
                };
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            #[cfg(not(unix))]
            {
                let _ = tokio::signal::ctrl_c().await;
            }
        } => {
            tracing::info!("Received shutdown signal");
            let _ = shutdown_tx.send(());
            let _ = worker_handle.await;
        }
    }

    Ok(())
}
