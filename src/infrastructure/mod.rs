//! Infrastructure Layer - Adapters and external integrations.

/// In-process quote cache.
pub mod cache;

/// Configuration loading.
pub mod config;

/// Postgres stores.
pub mod db;

/// HTTP control plane.
pub mod http;

/// Tracing initialization.
pub mod telemetry;

/// Provider protocol: codec, messages, auth, supervisor, router.
pub mod tradingview;
