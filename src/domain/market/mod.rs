//! Market Data Types
//!
//! Candles, quote snapshots, and timeframes as the provider streams them.
//!
//! # Quote merge rule
//!
//! The provider sends partial quote updates: any field it has nothing new
//! for arrives as zero/absent. [`QuoteSnapshot::merge`] therefore only
//! overwrites a field when the incoming value is non-zero, so the cached
//! snapshot converges on the most recent known value per field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Timeframe
// =============================================================================

/// Candle timeframe supported by the provider.
///
/// The serialized forms are the literal interval strings the provider's
/// `create_series` method expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    /// Ten seconds.
    #[serde(rename = "10S")]
    TenSeconds,
    /// One minute.
    #[serde(rename = "1")]
    OneMinute,
    /// Five minutes.
    #[serde(rename = "5")]
    FiveMinutes,
    /// One day.
    #[serde(rename = "1D")]
    OneDay,
}

impl Timeframe {
    /// The provider's interval string for this timeframe.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TenSeconds => "10S",
            Self::OneMinute => "1",
            Self::FiveMinutes => "5",
            Self::OneDay => "1D",
        }
    }

    /// Parse a provider interval string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "10S" => Some(Self::TenSeconds),
            "1" => Some(Self::OneMinute),
            "5" => Some(Self::FiveMinutes),
            "1D" => Some(Self::OneDay),
            _ => None,
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Timeframe {
    type Err = UnknownTimeframe;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| UnknownTimeframe(s.to_string()))
    }
}

/// Error for an interval string the provider does not support.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown timeframe: {0} (expected one of 10S, 1, 5, 1D)")]
pub struct UnknownTimeframe(pub String);

// =============================================================================
// Candle
// =============================================================================

/// One persisted OHLCV row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candle {
    /// Surrogate id.
    pub id: Uuid,
    /// Exchange name (e.g. "BINANCE").
    pub exchange: String,
    /// Symbol short name (e.g. "BTCUSDT").
    pub symbol: String,
    /// Candle timeframe.
    pub timeframe: Timeframe,
    /// Bar open time, epoch seconds.
    pub timestamp: i64,
    /// Open price.
    pub open: f64,
    /// High price.
    pub high: f64,
    /// Low price.
    pub low: f64,
    /// Close price.
    pub close: f64,
    /// Volume.
    pub volume: f64,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
}

/// An OHLCV bar extracted from a provider series update, before persistence.
///
/// Keyed by (exchange, symbol, timeframe, timestamp); upserting the same key
/// twice replaces the OHLCV values.
#[derive(Debug, Clone, PartialEq)]
pub struct CandleUpsert {
    /// Exchange name.
    pub exchange: String,
    /// Symbol short name.
    pub symbol: String,
    /// Candle timeframe.
    pub timeframe: Timeframe,
    /// Bar open time, epoch seconds.
    pub timestamp: i64,
    /// Open price.
    pub open: f64,
    /// High price.
    pub high: f64,
    /// Low price.
    pub low: f64,
    /// Close price.
    pub close: f64,
    /// Volume.
    pub volume: f64,
}

impl CandleUpsert {
    /// Build an upsert from a provider bar value array
    /// `[timestamp, open, high, low, close, volume]`.
    ///
    /// Returns `None` when the array carries fewer than six values
    /// (malformed provider frame, skipped silently by the ingest path).
    #[must_use]
    pub fn from_values(
        exchange: &str,
        symbol: &str,
        timeframe: Timeframe,
        values: &[f64],
    ) -> Option<Self> {
        if values.len() < 6 {
            return None;
        }

        #[allow(clippy::cast_possible_truncation)]
        let timestamp = values[0] as i64;

        Some(Self {
            exchange: exchange.to_string(),
            symbol: symbol.to_string(),
            timeframe,
            timestamp,
            open: values[1],
            high: values[2],
            low: values[3],
            close: values[4],
            volume: values[5],
        })
    }
}

// =============================================================================
// Quote snapshot
// =============================================================================

/// Partial quote update as parsed off the wire.
///
/// Zero-valued fields mean "no new information"; see [`QuoteSnapshot::merge`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct QuoteUpdate {
    /// Last trade price.
    #[serde(default, rename = "lp")]
    pub last_price: f64,
    /// Last trade timestamp, epoch seconds.
    #[serde(default, rename = "lp_time")]
    pub last_price_time: i64,
    /// Absolute price change.
    #[serde(default, rename = "ch")]
    pub change: f64,
    /// Percentage price change.
    #[serde(default, rename = "chp")]
    pub change_percent: f64,
    /// Best bid.
    #[serde(default)]
    pub bid: f64,
    /// Best bid size.
    #[serde(default)]
    pub bid_size: f64,
    /// Best ask.
    #[serde(default)]
    pub ask: f64,
    /// Best ask size.
    #[serde(default)]
    pub ask_size: f64,
    /// Trading volume.
    #[serde(default)]
    pub volume: f64,
    /// Real-time close price.
    #[serde(default, rename = "rtc")]
    pub realtime_close: f64,
    /// Real-time close timestamp, epoch seconds.
    #[serde(default, rename = "rtc_time")]
    pub realtime_close_time: i64,
    /// Absolute change during regular trading hours.
    #[serde(default, rename = "rch")]
    pub regular_change: f64,
    /// Percentage change during regular trading hours.
    #[serde(default, rename = "rchp")]
    pub regular_change_percent: f64,
}

/// Latest known quote state for one provider symbol, held in the cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QuoteSnapshot {
    /// Provider symbol name ("EXCHANGE:SYMBOL").
    pub symbol: String,
    /// Last trade price.
    #[serde(rename = "lp")]
    pub last_price: f64,
    /// Last trade timestamp, epoch seconds.
    #[serde(rename = "lp_time")]
    pub last_price_time: i64,
    /// Absolute price change.
    #[serde(rename = "ch")]
    pub change: f64,
    /// Percentage price change.
    #[serde(rename = "chp")]
    pub change_percent: f64,
    /// Best bid.
    pub bid: f64,
    /// Best bid size.
    pub bid_size: f64,
    /// Best ask.
    pub ask: f64,
    /// Best ask size.
    pub ask_size: f64,
    /// Trading volume.
    pub volume: f64,
    /// Real-time close price.
    #[serde(rename = "rtc")]
    pub realtime_close: f64,
    /// Real-time close timestamp, epoch seconds.
    #[serde(rename = "rtc_time")]
    pub realtime_close_time: i64,
    /// Absolute change during regular trading hours.
    #[serde(rename = "rch")]
    pub regular_change: f64,
    /// Percentage change during regular trading hours.
    #[serde(rename = "rchp")]
    pub regular_change_percent: f64,
}

impl QuoteSnapshot {
    /// Create an empty snapshot for a symbol.
    #[must_use]
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..Self::default()
        }
    }

    /// Apply a partial update, overwriting a field only when the incoming
    /// value is non-zero.
    pub fn merge(&mut self, update: &QuoteUpdate) {
        merge_f64(&mut self.last_price, update.last_price);
        merge_i64(&mut self.last_price_time, update.last_price_time);
        merge_f64(&mut self.change, update.change);
        merge_f64(&mut self.change_percent, update.change_percent);
        merge_f64(&mut self.bid, update.bid);
        merge_f64(&mut self.bid_size, update.bid_size);
        merge_f64(&mut self.ask, update.ask);
        merge_f64(&mut self.ask_size, update.ask_size);
        merge_f64(&mut self.volume, update.volume);
        merge_f64(&mut self.realtime_close, update.realtime_close);
        merge_i64(&mut self.realtime_close_time, update.realtime_close_time);
        merge_f64(&mut self.regular_change, update.regular_change);
        merge_f64(&mut self.regular_change_percent, update.regular_change_percent);
    }
}

fn merge_f64(target: &mut f64, incoming: f64) {
    if incoming != 0.0 {
        *target = incoming;
    }
}

fn merge_i64(target: &mut i64, incoming: i64) {
    if incoming != 0 {
        *target = incoming;
    }
}

// =============================================================================
// Tests
// =============================================================================
