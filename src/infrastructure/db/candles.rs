//! Candle Store
//!
//! Postgres implementation of the candle port. Writes are upserts keyed by
//! (exchange, symbol, timeframe, timestamp); reads fetch the most recent
//! rows and reverse them into ascending timestamp order.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::application::ports::{CandleStore, StoreError};
use crate::domain::market::{Candle, CandleUpsert, Timeframe};

/// Postgres-backed candle store.
pub struct PgCandleStore {
    pool: PgPool,
}

impl PgCandleStore {
    /// Create a store over a shared pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_row(row: &PgRow) -> Result<Candle, StoreError> {
    let timeframe_raw: String = row.try_get("timeframe")?;
    let timeframe = Timeframe::parse(&timeframe_raw)
        .ok_or_else(|| StoreError::CorruptRow(format!("unknown timeframe: {timeframe_raw}")))?;

    Ok(Candle {
        id: row.try_get("id")?,
        exchange: row.try_get("exchange")?,
        symbol: row.try_get("symbol")?,
        timeframe,
        timestamp: row.try_get("timestamp")?,
        open: row.try_get("open")?,
        high: row.try_get("high")?,
        low: row.try_get("low")?,
        close: row.try_get("close")?,
        volume: row.try_get("volume")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

#[async_trait]
impl CandleStore for PgCandleStore {
    async fn upsert(&self, candle: &CandleUpsert) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO candles (
                id, exchange, symbol, timeframe, timestamp,
                open, high, low, close, volume, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (exchange, symbol, timeframe, timestamp) DO UPDATE SET
                open = EXCLUDED.open,
                high = EXCLUDED.high,
                low = EXCLUDED.low,
                close = EXCLUDED.close,
                volume = EXCLUDED.volume
            ",
        )
        .bind(Uuid::new_v4())
        .bind(&candle.exchange)
        .bind(&candle.symbol)
        .bind(candle.timeframe.as_str())
        .bind(candle.timestamp)
        .bind(candle.open)
        .bind(candle.high)
        .bind(candle.low)
        .bind(candle.close)
        .bind(candle.volume)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent_ascending(
        &self,
        exchange: &str,
        symbol: &str,
        timeframe: Timeframe,
        limit: i64,
    ) -> Result<Vec<Candle>, StoreError> {
        let rows = sqlx::query(
            r"
            SELECT id, exchange, symbol, timeframe, timestamp,
                   open, high, low, close, volume, created_at
            FROM candles
            WHERE exchange = $1 AND symbol = $2 AND timeframe = $3
            ORDER BY timestamp DESC
            LIMIT $4
            ",
        )
        .bind(exchange)
        .bind(symbol)
        .bind(timeframe.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut candles = rows
            .iter()
            .map(map_row)
            .collect::<Result<Vec<_>, _>>()?;
        // Newest-first from the query; callers want chronological order.
        candles.reverse();
        Ok(candles)
    }
}
