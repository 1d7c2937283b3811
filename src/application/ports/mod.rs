//! Port Interfaces
//!
//! Contracts between the application services and the systems they drive,
//! following the hexagonal layering: the registry and ingest processors only
//! ever see these traits, never the Postgres pool or the live socket.
//!
//! ## Driven ports (outbound)
//!
//! - [`SubscriptionStore`]: durable subscription rows
//! - [`CandleStore`]: durable OHLCV rows
//! - [`StreamConnection`]: send/reconnect capability of the provider stream
//!
//! Handing the registry a [`StreamConnection`] rather than the concrete
//! client breaks the supervisor → registry → supervisor callback cycle.

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::market::{Candle, CandleUpsert, Timeframe};
use crate::domain::subscription::{Subscription, SubscriptionKey};
use crate::infrastructure::tradingview::messages::OutboundMessage;

// =============================================================================
// Connection state
// =============================================================================

/// Lifecycle state of the provider connection. Only the supervisor mutates
/// it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No socket, and no attempt in progress.
    #[default]
    Disconnected,
    /// Dialing or re-dialing the provider.
    Connecting,
    /// Socket is up and the auth bootstrap has been sent.
    Connected,
}

impl ConnectionState {
    /// Stable string form for logs and the control surface.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Failure of a durable-store operation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The underlying database rejected or failed the operation.
    #[error("database error: {0}")]
    Database(String),
    /// A stored row could not be mapped back into a domain value.
    #[error("corrupt row: {0}")]
    CorruptRow(String),
}

/// Failure of the provider connection as seen through the port.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// There is no live socket to write to.
    #[error("not connected to the provider")]
    NotConnected,
    /// The transport failed (dial, read, write, close).
    #[error("connection failure: {0}")]
    Transport(String),
    /// The auth-token exchange or bootstrap failed.
    #[error("authentication failure: {0}")]
    Auth(String),
    /// A reconnect attempt is already in flight.
    #[error("reconnect already in flight")]
    ReconnectInFlight,
    /// The operation did not complete within its deadline.
    #[error("operation timed out")]
    Timeout,
}

impl ConnectionError {
    /// Whether retrying the operation may succeed without operator action.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NotConnected | Self::Transport(_) | Self::Timeout | Self::ReconnectInFlight
        )
    }
}

// =============================================================================
// Stores
// =============================================================================

/// Durable store of desired subscriptions.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Persist a freshly created row.
    async fn insert(&self, subscription: &Subscription) -> Result<(), StoreError>;

    /// The enabled row for a logical key, if any. At most one exists.
    async fn find_enabled_by_key(
        &self,
        key: &SubscriptionKey,
    ) -> Result<Option<Subscription>, StoreError>;

    /// The row carrying a provider session id, enabled or not.
    async fn find_by_session_id(
        &self,
        session_id: &str,
    ) -> Result<Option<Subscription>, StoreError>;

    /// All enabled rows.
    async fn list_enabled(&self) -> Result<Vec<Subscription>, StoreError>;

    /// All enabled rows for one (exchange, symbol) pair.
    async fn list_enabled_for_symbol(
        &self,
        exchange: &str,
        symbol: &str,
    ) -> Result<Vec<Subscription>, StoreError>;

    /// Flip the enabled flag of one row.
    async fn set_enabled(&self, id: Uuid, enabled: bool) -> Result<(), StoreError>;

    /// Assign a fresh provider session id to a row and mark it enabled.
    async fn reassign_session(&self, id: Uuid, session_id: &str) -> Result<(), StoreError>;

    /// Flip every enabled row to disabled. Returns the number of rows
    /// affected. Run at startup: the provider has no memory of sessions
    /// from a previous process.
    async fn disable_all(&self) -> Result<u64, StoreError>;
}

/// Durable store of OHLCV rows.
#[async_trait]
pub trait CandleStore: Send + Sync {
    /// Insert or update the row keyed by
    /// (exchange, symbol, timeframe, timestamp).
    async fn upsert(&self, candle: &CandleUpsert) -> Result<(), StoreError>;

    /// The `limit` most recent candles for a series, returned in ascending
    /// timestamp order.
    async fn recent_ascending(
        &self,
        exchange: &str,
        symbol: &str,
        timeframe: Timeframe,
        limit: i64,
    ) -> Result<Vec<Candle>, StoreError>;
}

// =============================================================================
// Stream connection
// =============================================================================

/// The capabilities of the provider connection that the application layer is
/// allowed to use: send a message, trigger a reconnect, observe state. The
/// socket itself never crosses this boundary.
#[async_trait]
pub trait StreamConnection: Send + Sync {
    /// Write one protocol message on the live socket.
    async fn send(&self, message: &OutboundMessage) -> Result<(), ConnectionError>;

    /// Tear down the current socket (if any) and dial again, running the
    /// auth bootstrap. Single-flight: a concurrent call fails with
    /// [`ConnectionError::ReconnectInFlight`].
    async fn reconnect(&self) -> Result<(), ConnectionError>;

    /// Current connection state.
    fn state(&self) -> ConnectionState;
}
