//! TradingView Stream Ingest Binary
//!
//! Starts the market data collector.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin tradingview-stream-ingest [config.yaml]
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `TV_DEVICE_TOKEN`: provider `device_t` cookie
//! - `TV_SESSION_ID`: provider `sessionid` cookie
//! - `TV_SESSION_SIGN`: provider `sessionid_sign` cookie
//!
//! ## Optional
//! - `DB_HOST` / `DB_PORT` / `DB_USER` / `DB_PASSWORD` / `DB_NAME` /
//!   `DB_SSLMODE`: Postgres connection (default: localhost postgres)
//! - `SERVER_PORT`: control-plane HTTP port (default: 8080)
//! - `TV_WS_URL`: provider stream URL override
//! - `TV_MAX_RETRIES`: reconnect attempts before parking (default: 5)
//! - `TV_PING_INTERVAL_SECS`: ping cadence (default: 30)
//! - `TV_SERIES_BAR_COUNT`: bars requested per series (default: 300)
//! - `RUST_LOG`: log filter (default: info)
//! - `LOG_FORMAT`: set to `json` for JSON logs

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tradingview_stream_ingest::application::services::{
    CandleIngestor, QuoteIngestor, SubscriptionRegistry,
};
use tradingview_stream_ingest::infrastructure::cache::{QuoteCache, QuoteCacheConfig};
use tradingview_stream_ingest::infrastructure::config::AppConfig;
use tradingview_stream_ingest::infrastructure::db::{
    PgCandleStore, PgSubscriptionStore, connect, migrate,
};
use tradingview_stream_ingest::infrastructure::http::{AppState, ControlServer};
use tradingview_stream_ingest::infrastructure::telemetry;
use tradingview_stream_ingest::infrastructure::tradingview::reconnect::ReconnectConfig;
use tradingview_stream_ingest::infrastructure::tradingview::{
    AuthTokenManager, MessageRouter, ProviderCookies, QuoteTokenClient, StreamClient,
    StreamClientConfig, StreamEvent,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("failed to install rustls crypto provider");

    let _ = dotenvy::dotenv();

    telemetry::init();
    tracing::info!("starting TradingView stream ingest");

    let config = AppConfig::load()?;
    tracing::info!(
        server_port = config.server.port,
        db_host = %config.database.host,
        ws_url = %config.provider.ws_url,
        series_bar_count = config.stream.series_bar_count,
        "configuration loaded"
    );

    // Database and stores.
    let pool = connect(&config.database).await?;
    migrate(&pool).await?;
    let subscriptions = Arc::new(PgSubscriptionStore::new(pool.clone()));
    let candles = Arc::new(PgCandleStore::new(pool));

    // Quote cache.
    let quotes = Arc::new(QuoteCache::new(QuoteCacheConfig {
        max_entries: config.cache.max_entries,
    }));

    // Auth token manager over the provider's HTTP surface.
    let cookies = ProviderCookies {
        device_token: config.provider.device_token.clone(),
        session_id: config.provider.session_id.clone(),
        session_sign: config.provider.session_sign.clone(),
    };
    let auth = Arc::new(AuthTokenManager::new(QuoteTokenClient::new(
        config.provider.rest_url.clone(),
        cookies,
    )?));

    // Stream client.
    let shutdown = CancellationToken::new();
    let (event_tx, event_rx) = mpsc::channel::<StreamEvent>(config.stream.event_buffer);
    let client = Arc::new(StreamClient::new(
        StreamClientConfig {
            url: config.provider.ws_url.clone(),
            handshake_timeout: Duration::from_secs(config.stream.handshake_timeout_secs),
            write_timeout: Duration::from_secs(config.stream.write_timeout_secs),
            ping_interval: Duration::from_secs(config.stream.ping_interval_secs),
            reconnect: ReconnectConfig {
                max_attempts: config.stream.max_retries,
                ..ReconnectConfig::default()
            },
            ..StreamClientConfig::default()
        },
        Arc::clone(&auth),
        event_tx,
        shutdown.clone(),
    ));

    // Registry over the store and the client's send capability.
    let registry = Arc::new(SubscriptionRegistry::new(
        subscriptions.clone(),
        client.clone(),
        config.stream.series_bar_count,
    ));

    // Stale rows from a previous process are meaningless to the provider.
    registry.cleanup_stale_sessions().await?;

    // Ingest pipeline.
    let router = MessageRouter::new(
        QuoteIngestor::new(Arc::clone(&quotes)),
        CandleIngestor::new(subscriptions.clone(), candles.clone()),
    );

    // Spawn the stream supervisor.
    let client_task = Arc::clone(&client);
    tokio::spawn(async move {
        client_task.run().await;
    });

    // Spawn the event loop (re-subscription + ingest).
    let event_registry = Arc::clone(&registry);
    tokio::spawn(async move {
        run_event_loop(event_rx, router, event_registry).await;
    });

    // Control plane.
    let state = AppState {
        registry,
        subscriptions,
        candles,
        quotes,
        connection: client,
        started_at: Instant::now(),
    };
    let server = ControlServer::new(config.server.port, state, shutdown.clone());
    tokio::spawn(async move {
        if let Err(error) = server.run().await {
            tracing::error!(error = %error, "control plane error");
        }
    });

    tracing::info!("stream ingest ready");

    await_shutdown(shutdown).await;

    tracing::info!("stream ingest stopped");
    Ok(())
}

/// Consume supervisor events: re-subscribe on every (re)connect, route
/// inbound frames into the ingest processors.
async fn run_event_loop(
    mut events: mpsc::Receiver<StreamEvent>,
    router: MessageRouter,
    registry: Arc<SubscriptionRegistry>,
) {
    while let Some(event) = events.recv().await {
        match event {
            StreamEvent::Connected => {
                tracing::info!("provider stream connected");
                match registry.resubscribe_enabled().await {
                    Ok(0) => {}
                    Ok(count) => tracing::info!(count, "re-subscribed enabled rows"),
                    Err(error) => {
                        tracing::error!(error = %error, "re-subscription after connect failed");
                    }
                }
            }
            StreamEvent::Reconnecting { attempt } => {
                tracing::warn!(attempt, "reconnecting to provider");
            }
            StreamEvent::Disconnected => {
                tracing::warn!("provider stream disconnected");
            }
            StreamEvent::Frame(envelope) => {
                if let Err(error) = router.route(&envelope).await {
                    tracing::error!(error = %error, "failed to process inbound frame");
                }
            }
        }
    }
    tracing::info!("event loop stopped");
}

/// Wait for SIGINT or SIGTERM, then cancel everything.
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received Ctrl+C, shutting down");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, shutting down");
        }
    }

    shutdown.cancel();
}
