//! HTTP Control Plane
//!
//! The external surface for managing subscriptions and querying state.
//! Route semantics follow the original service contract; errors render as
//! JSON `{"error": "..."}`.

pub mod error;
pub mod handlers;

use std::net::SocketAddr;

use axum::Router;
use axum::routing::{delete, get, post};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub use error::ApiError;
pub use handlers::{AppState, SymbolRequest};

/// Assemble the control-plane router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::service_info))
        .route("/health", get(handlers::health))
        .route("/reconnect", get(handlers::reconnect))
        .route(
            "/symbols",
            post(handlers::create_symbol)
                .delete(handlers::delete_symbol)
                .get(handlers::list_symbols),
        )
        .route("/symbols/unsubscribe", delete(handlers::unsubscribe_all))
        .route(
            "/symbols/session/{session_id}/status",
            get(handlers::session_status),
        )
        .route("/symbols/{exchange}/{symbol}", get(handlers::symbols_for_pair))
        .route(
            "/candles/{exchange}/{symbol}/{timeframe}/{limit}",
            get(handlers::get_candles),
        )
        .route("/quotes/{exchange}/{symbol}", get(handlers::get_quote))
        .with_state(state)
}

/// Control-plane server errors.
#[derive(Debug, thiserror::Error)]
pub enum ControlServerError {
    /// Failed to bind to the configured port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// The server failed while running.
    #[error("server error: {0}")]
    ServerFailed(String),
}

/// Control-plane HTTP server.
pub struct ControlServer {
    port: u16,
    state: AppState,
    cancel: CancellationToken,
}

impl ControlServer {
    /// Create a server bound to a port at run time.
    #[must_use]
    pub const fn new(port: u16, state: AppState, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run until cancelled.
    ///
    /// # Errors
    ///
    /// Returns a [`ControlServerError`] when binding fails or the server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), ControlServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|error| ControlServerError::BindFailed(self.port, error.to_string()))?;

        tracing::info!(port = self.port, "control plane listening");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|error| ControlServerError::ServerFailed(error.to_string()))?;

        tracing::info!("control plane stopped");
        Ok(())
    }
}
