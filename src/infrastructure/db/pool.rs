//! Connection Pool & Schema
//!
//! Creates the shared `PgPool` and applies the idempotent DDL at startup.
//! The partial unique index enforces at most one enabled subscription per
//! (exchange, symbol, kind, timeframe) tuple in the schema itself.

use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::infrastructure::config::DatabaseSettings;

const SCHEMA: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS subscriptions (
        id UUID PRIMARY KEY,
        provider_session_id TEXT NOT NULL UNIQUE,
        exchange TEXT NOT NULL,
        symbol TEXT NOT NULL,
        kind TEXT NOT NULL,
        timeframe TEXT,
        enabled BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    ",
    r"
    CREATE UNIQUE INDEX IF NOT EXISTS subscriptions_enabled_key
        ON subscriptions (exchange, symbol, kind, COALESCE(timeframe, ''))
        WHERE enabled
    ",
    r"
    CREATE TABLE IF NOT EXISTS candles (
        id UUID PRIMARY KEY,
        exchange TEXT NOT NULL,
        symbol TEXT NOT NULL,
        timeframe TEXT NOT NULL,
        timestamp BIGINT NOT NULL,
        open DOUBLE PRECISION NOT NULL,
        high DOUBLE PRECISION NOT NULL,
        low DOUBLE PRECISION NOT NULL,
        close DOUBLE PRECISION NOT NULL,
        volume DOUBLE PRECISION NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        UNIQUE (exchange, symbol, timeframe, timestamp)
    )
    ",
    r"CREATE INDEX IF NOT EXISTS candles_exchange_symbol ON candles (exchange, symbol)",
    r"CREATE INDEX IF NOT EXISTS candles_timestamp ON candles (timestamp)",
];

/// Open a pool against the configured database.
///
/// # Errors
///
/// Returns the underlying connection error.
pub async fn connect(settings: &DatabaseSettings) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&settings.url())
        .await
}

/// Apply the schema. Every statement is idempotent, so this runs on every
/// startup.
///
/// # Errors
///
/// Returns the first statement failure.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
