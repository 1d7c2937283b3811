//! Ingest Processors
//!
//! Translate routed provider messages into cache merges and candle
//! upserts. A frame whose session id no longer maps to a subscription row
//! is dropped: the provider occasionally emits late frames after a session
//! teardown.

use std::sync::Arc;

use crate::application::ports::{CandleStore, StoreError, SubscriptionStore};
use crate::domain::market::{CandleUpsert, QuoteSnapshot};
use crate::infrastructure::cache::QuoteCache;
use crate::infrastructure::tradingview::messages::{QuoteDataMessage, SeriesBlock};

/// Ingest failure.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// The durable store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

// =============================================================================
// Quotes
// =============================================================================

/// Merges incoming quote deltas into the per-symbol cache.
pub struct QuoteIngestor {
    cache: Arc<QuoteCache>,
}

impl QuoteIngestor {
    /// Create an ingestor over the shared cache.
    #[must_use]
    pub fn new(cache: Arc<QuoteCache>) -> Self {
        Self { cache }
    }

    /// Apply one quote frame: non-zero fields overwrite the cached
    /// snapshot, zero fields leave it untouched. The write is visible to
    /// readers as soon as this returns.
    pub fn process(&self, message: &QuoteDataMessage) {
        let name = &message.quote.name;
        if name.is_empty() {
            tracing::debug!("quote frame without symbol name, dropping");
            return;
        }

        let mut snapshot = self
            .cache
            .get(name)
            .unwrap_or_else(|| QuoteSnapshot::new(name.clone()));
        snapshot.merge(&message.quote.values);

        if !self.cache.insert(snapshot) {
            tracing::warn!(symbol = %name, "quote cache rejected write");
        }
    }
}

// =============================================================================
// Candles
// =============================================================================

/// Upserts OHLCV rows extracted from chart-session series updates.
pub struct CandleIngestor {
    subscriptions: Arc<dyn SubscriptionStore>,
    candles: Arc<dyn CandleStore>,
}

impl CandleIngestor {
    /// Create an ingestor over the durable stores.
    #[must_use]
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        candles: Arc<dyn CandleStore>,
    ) -> Self {
        Self {
            subscriptions,
            candles,
        }
    }

    /// Apply one series update for a chart session. Entries with fewer than
    /// six values are skipped silently (malformed provider frame).
    ///
    /// # Errors
    ///
    /// Propagates store failures; an unknown session id is not an error.
    pub async fn process(
        &self,
        session_id: &str,
        series: &SeriesBlock,
    ) -> Result<(), IngestError> {
        let Some(subscription) = self.subscriptions.find_by_session_id(session_id).await? else {
            tracing::warn!(session_id, "no subscription for incoming series frame, dropping");
            return Ok(());
        };
        let Some(timeframe) = subscription.timeframe else {
            tracing::warn!(
                session_id,
                "series frame for a subscription without timeframe, dropping"
            );
            return Ok(());
        };

        for entry in &series.entries {
            let Some(upsert) = CandleUpsert::from_values(
                &subscription.exchange,
                &subscription.symbol,
                timeframe,
                &entry.values,
            ) else {
                continue;
            };
            self.candles.upsert(&upsert).await?;
        }

        Ok(())
    }
}
