//! Subscription Identity
//!
//! Durable subscription rows map a desired (exchange, symbol, kind,
//! timeframe) tuple to the provider session id currently carrying it. The
//! session id is reassigned on every (re)subscribe; at most one row per
//! tuple may be enabled at a time.

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::market::Timeframe;

/// Session-id prefix for chart (candle) sessions.
pub const CHART_SESSION_PREFIX: &str = "cs_";

/// Session-id prefix for quote sessions.
pub const QUOTE_SESSION_PREFIX: &str = "qs_";

/// Length of the random suffix of a provider session id.
const SESSION_SUFFIX_LEN: usize = 12;

// =============================================================================
// Kind
// =============================================================================

/// What a subscription streams: OHLCV candles or real-time quotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionKind {
    /// OHLCV candle series over a chart session.
    Candle,
    /// Real-time quote updates over a quote session.
    Quote,
}

impl SubscriptionKind {
    /// Stable string form, used for persistence and request bodies.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Candle => "candle",
            Self::Quote => "quote",
        }
    }

    /// Parse the persisted/request form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "candle" => Some(Self::Candle),
            "quote" => Some(Self::Quote),
            _ => None,
        }
    }

    /// Session-id prefix for this kind.
    #[must_use]
    pub const fn session_prefix(&self) -> &'static str {
        match self {
            Self::Candle => CHART_SESSION_PREFIX,
            Self::Quote => QUOTE_SESSION_PREFIX,
        }
    }
}

impl std::fmt::Display for SubscriptionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Key
// =============================================================================

/// The logical identity of a subscription.
///
/// A timeframe is required for candle subscriptions and absent for quote
/// subscriptions; [`SubscriptionKey::new`] enforces this.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SubscriptionKey {
    /// Exchange name (e.g. "BINANCE").
    pub exchange: String,
    /// Symbol short name (e.g. "BTCUSDT").
    pub symbol: String,
    /// Candle or quote.
    pub kind: SubscriptionKind,
    /// Timeframe; `Some` iff kind is candle.
    pub timeframe: Option<Timeframe>,
}

/// Error for a key whose timeframe does not match its kind.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InvalidKey {
    /// A candle subscription without a timeframe.
    #[error("candle subscription requires a timeframe")]
    MissingTimeframe,
    /// A quote subscription carrying a timeframe.
    #[error("quote subscription must not carry a timeframe")]
    UnexpectedTimeframe,
}

impl SubscriptionKey {
    /// Build a key, enforcing that a timeframe is present exactly when the
    /// kind is candle.
    pub fn new(
        exchange: impl Into<String>,
        symbol: impl Into<String>,
        kind: SubscriptionKind,
        timeframe: Option<Timeframe>,
    ) -> Result<Self, InvalidKey> {
        match (kind, timeframe) {
            (SubscriptionKind::Candle, None) => Err(InvalidKey::MissingTimeframe),
            (SubscriptionKind::Quote, Some(_)) => Err(InvalidKey::UnexpectedTimeframe),
            _ => Ok(Self {
                exchange: exchange.into(),
                symbol: symbol.into(),
                kind,
                timeframe,
            }),
        }
    }

    /// The provider symbol descriptor, `"EXCHANGE:SYMBOL"`.
    #[must_use]
    pub fn provider_symbol(&self) -> String {
        format!("{}:{}", self.exchange, self.symbol)
    }
}

// =============================================================================
// Row
// =============================================================================

/// One durable subscription row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Subscription {
    /// Surrogate id.
    pub id: Uuid,
    /// Session id the provider routes frames with; reassigned on every
    /// (re)subscribe.
    pub provider_session_id: String,
    /// Exchange name.
    pub exchange: String,
    /// Symbol short name.
    pub symbol: String,
    /// Candle or quote.
    pub kind: SubscriptionKind,
    /// Timeframe; `Some` iff kind is candle.
    pub timeframe: Option<Timeframe>,
    /// Whether this row should be live on the connection.
    pub enabled: bool,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// The logical key of this row.
    #[must_use]
    pub fn key(&self) -> SubscriptionKey {
        SubscriptionKey {
            exchange: self.exchange.clone(),
            symbol: self.symbol.clone(),
            kind: self.kind,
            timeframe: self.timeframe,
        }
    }

    /// The provider symbol descriptor, `"EXCHANGE:SYMBOL"`.
    #[must_use]
    pub fn provider_symbol(&self) -> String {
        format!("{}:{}", self.exchange, self.symbol)
    }
}

/// Allocate a fresh provider session id for a subscription kind:
/// the kind's prefix followed by 12 random alphanumeric characters.
#[must_use]
pub fn generate_session_id(kind: SubscriptionKind) -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(SESSION_SUFFIX_LEN)
        .map(char::from)
        .collect();
    format!("{}{}", kind.session_prefix(), suffix)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_roundtrip() {
        assert_eq!(SubscriptionKind::parse("candle"), Some(SubscriptionKind::Candle));
        assert_eq!(SubscriptionKind::parse("quote"), Some(SubscriptionKind::Quote));
        assert_eq!(SubscriptionKind::parse("trade"), None);
    }

    #[test]
    fn candle_key_requires_timeframe() {
        let err = SubscriptionKey::new("BINANCE", "BTCUSDT", SubscriptionKind::Candle, None);
        assert!(matches!(err, Err(InvalidKey::MissingTimeframe)));

        let key = SubscriptionKey::new(
            "BINANCE",
            "BTCUSDT",
            SubscriptionKind::Candle,
            Some(Timeframe::OneMinute),
        )
        .unwrap();
        assert_eq!(key.provider_symbol(), "BINANCE:BTCUSDT");
    }

    #[test]
    fn quote_key_rejects_timeframe() {
        let err = SubscriptionKey::new(
            "NASDAQ",
            "AAPL",
            SubscriptionKind::Quote,
            Some(Timeframe::OneDay),
        );
        assert!(matches!(err, Err(InvalidKey::UnexpectedTimeframe)));

        assert!(SubscriptionKey::new("NASDAQ", "AAPL", SubscriptionKind::Quote, None).is_ok());
    }

    #[test]
    fn session_id_shape() {
        let cs = generate_session_id(SubscriptionKind::Candle);
        let qs = generate_session_id(SubscriptionKind::Quote);

        assert!(cs.starts_with("cs_"));
        assert!(qs.starts_with("qs_"));
        assert_eq!(cs.len(), 3 + 12);
        assert!(cs[3..].chars().all(|c| c.is_ascii_alphanumeric()));
        assert!(qs[3..].chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn session_ids_are_unique_enough() {
        let a = generate_session_id(SubscriptionKind::Candle);
        let b = generate_session_id(SubscriptionKind::Candle);
        assert_ne!(a, b);
    }
}
