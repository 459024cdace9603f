//! Trade Stream Relay Binary
//!
//! Connects to an exchange trade stream and relays trade events to BigQuery.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin trade-stream-relay
//! ```
//!
//! # Environment Variables
//!
//! ## Feed
//! - `FEED_URL`: Trade stream URL (default: wss://stream.binance.com:9443/ws/btcusdt@trade)
//! - `RELAY_RECONNECT_DELAY_INITIAL_MS`, `RELAY_RECONNECT_DELAY_MAX_SECS`,
//!   `RELAY_RECONNECT_DELAY_MULTIPLIER`, `RELAY_RECONNECT_JITTER`
//! - `RELAY_CONNECT_TIMEOUT_SECS`, `RELAY_READ_IDLE_TIMEOUT_SECS`,
//!   `RELAY_MIN_STABLE_SESSION_SECS`
//!
//! ## Sink (disabled unless `GOOGLE_CLOUD_PROJECT` is set)
//! - `GOOGLE_CLOUD_PROJECT`
//! - `BIGQUERY_ACCESS_TOKEN`: fixed bearer token. It is never refreshed, so a
//!   gcloud-issued token stops working after about an hour. When unset, tokens
//!   come from the metadata server and are refreshed before they expire.
//! - `GCE_METADATA_HOST` (default: metadata.google.internal)
//! - `BIGQUERY_DATASET` (default: crypto_data), `BIGQUERY_TABLE` (default: trades)
//! - `RELAY_SINK_QUEUE_CAPACITY`, `RELAY_SINK_ENQUEUE_TIMEOUT_MS`,
//!   `RELAY_SINK_WRITE_TIMEOUT_SECS`
//!
//! ## Process
//! - `PORT`: Liveness HTTP port (default: 8080)
//! - `OTEL_ENABLED`: Enable OpenTelemetry export (default: false)
//! - `RUST_LOG`: Log filter (default: info)

use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use trade_stream_relay::infrastructure::telemetry;
use trade_stream_relay::{
    BigQuerySink, ConnectionSupervisor, ForwarderConfig, LivenessServer, RelayConfig,
    SinkForwarder, SupervisorConfig, WsConnector, init_metrics,
};

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        return Err("failed to install rustls crypto provider".into());
    }

    load_dotenv_from_ancestors();

    let _telemetry_guard = telemetry::init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting trade stream relay");

    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Prometheus recorder unavailable");
    }

    let config = match RelayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let liveness = LivenessServer::new(config.server.port, shutdown_token.clone());
    tokio::spawn(async move {
        if let Err(e) = liveness.run().await {
            tracing::error!(error = %e, "Liveness server error");
        }
    });

    tokio::spawn(await_shutdown(shutdown_token.clone()));

    let (forwarder, writer) = build_forwarder(&config);

    let connector = WsConnector::new(config.feed.url.clone(), config.feed.connect_timeout);
    let supervisor = ConnectionSupervisor::new(
        connector,
        SupervisorConfig::from_feed_settings(&config.feed),
        forwarder,
        shutdown_token.clone(),
    );

    let result = supervisor.run().await;
    shutdown_token.cancel();

    if let Some(writer) = writer
        && tokio::time::timeout(SHUTDOWN_TIMEOUT, writer).await.is_err()
    {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Sink writer did not drain before shutdown timeout"
        );
    }

    if let Err(e) = result {
        tracing::error!(error = %e, "Relay stopped on unrecoverable error");
        return Err(e.into());
    }

    tracing::info!("Trade stream relay stopped");
    Ok(())
}

fn build_forwarder(config: &RelayConfig) -> (SinkForwarder, Option<JoinHandle<()>>) {
    let Some(bigquery) = config.sink.bigquery.as_ref() else {
        tracing::warn!("GOOGLE_CLOUD_PROJECT not set, trade events will not be persisted");
        return (SinkForwarder::disabled(), None);
    };

    match BigQuerySink::new(bigquery, config.sink.write_timeout) {
        Ok(sink) => {
            tracing::info!(
                project = %bigquery.project_id,
                dataset = %bigquery.dataset,
                table = %bigquery.table,
                endpoint = %sink.insert_url(),
                "BigQuery sink enabled"
            );
            let (forwarder, writer) = SinkForwarder::spawn(
                Arc::new(sink),
                ForwarderConfig::from_sink_settings(&config.sink),
            );
            (forwarder, Some(writer))
        }
        Err(e) => {
            tracing::warn!(error = %e, "BigQuery sink unavailable, trade events will not be persisted");
            (SinkForwarder::disabled(), None)
        }
    }
}

fn log_config(config: &RelayConfig) {
    tracing::info!(
        feed_url = %config.feed.url,
        port = config.server.port,
        sink_enabled = config.sink.bigquery.is_some(),
        "Configuration loaded"
    );
    tracing::debug!(
        reconnect_initial_ms = config.feed.reconnect_delay_initial.as_millis(),
        reconnect_max_secs = config.feed.reconnect_delay_max.as_secs(),
        idle_timeout_secs = config.feed.read_idle_timeout.as_secs(),
        queue_capacity = config.sink.queue_capacity,
        "Relay tunables"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv_from_ancestors() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Cancel `shutdown_token` on Ctrl+C or SIGTERM.
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
        () = shutdown_token.cancelled() => return,
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
