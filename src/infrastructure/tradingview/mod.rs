//! TradingView WebSocket Adapters
//!
//! Implements the provider's socket.io-style protocol:
//!
//! - **codec**: `~m~<len>~m~` frame envelope, heartbeat detection
//! - **messages**: typed inbound/outbound methods and their parsers
//! - **auth**: quote-token exchange and the shared token manager
//! - **reconnect**: exponential backoff policy with jitter
//! - **client**: connection supervisor and reader loop
//! - **router**: method dispatch into the ingest processors

pub mod auth;
pub mod client;
pub mod codec;
pub mod messages;
pub mod reconnect;
pub mod router;

pub use auth::{AuthError, AuthTokenManager, ProviderCookies, QuoteTokenClient};
pub use client::{StreamClient, StreamClientConfig, StreamClientError, StreamEvent};
pub use codec::FrameCodec;
pub use messages::{
    DEFAULT_QUOTE_FIELDS, Envelope, InboundMessage, MessageError, OutboundMessage,
};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use router::{MessageRouter, RouteError};
