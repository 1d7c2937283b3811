#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::default_trait_access
    )
)]

//! TradingView Stream Ingest - Market Data Collector
//!
//! A long-lived client for TradingView's socket.io-style market-data
//! WebSocket that multiplexes many logical subscriptions over a single
//! connection, persists OHLCV candles, caches the latest quote per symbol,
//! and exposes an HTTP control plane for subscription management.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Candles, quote snapshots, timeframes, subscription
//!   identity. Pure types, no I/O.
//!
//! - **Application**: Port interfaces plus the services built on them
//!   - `ports`: store and stream-connection contracts
//!   - `services`: subscription registry, quote/candle ingest
//!
//! - **Infrastructure**: Adapters
//!   - `tradingview`: frame codec, typed messages, auth, supervisor, router
//!   - `db`: Postgres stores
//!   - `cache`: latest-quote cache
//!   - `http`: axum control plane
//!   - `config`, `telemetry`: ambient plumbing
//!
//! # Data Flow
//!
//! ```text
//! TradingView WS ──► supervisor ──► router ──► candle upserts ──► Postgres
//!       ▲               │                └────► quote merges ──► cache
//!       │               ▼                                          │
//!   subscribe      event stream                                    ▼
//!       └───── registry ◄──── HTTP control plane ◄────────── operators
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - core market data types with no external dependencies.
pub mod domain;

/// Application layer - ports and services.
pub mod application;

/// Infrastructure layer - adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::market::{Candle, CandleUpsert, QuoteSnapshot, QuoteUpdate, Timeframe};
pub use domain::subscription::{
    Subscription, SubscriptionKey, SubscriptionKind, generate_session_id,
};

// Ports
pub use application::ports::{
    CandleStore, ConnectionError, ConnectionState, StoreError, StreamConnection,
    SubscriptionStore,
};

// Services
pub use application::services::{
    CandleIngestor, QuoteIngestor, RegistryError, SubscriptionRegistry,
};

// Provider protocol
pub use infrastructure::tradingview::{
    AuthTokenManager, Envelope, FrameCodec, InboundMessage, MessageRouter, OutboundMessage,
    ProviderCookies, QuoteTokenClient, StreamClient, StreamClientConfig, StreamEvent,
};

// Infrastructure
pub use infrastructure::cache::{QuoteCache, QuoteCacheConfig};
pub use infrastructure::config::{AppConfig, ConfigError};
pub use infrastructure::http::{AppState, ControlServer, router as control_router};
