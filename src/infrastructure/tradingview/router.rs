//! Message Router
//!
//! Maps inbound methods to the ingest processors via the typed parsers.
//! Unknown methods log at debug and return without error; parse failures
//! are wrapped with context and returned, but never terminate the reader.

use crate::application::services::{CandleIngestor, IngestError, QuoteIngestor};
use crate::infrastructure::tradingview::messages::{
    Envelope, InboundMessage, MessageError, METHOD_DATA_UPDATE, METHOD_TIMESCALE_UPDATE,
};

/// Routing failure for one inbound payload.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    /// A recognized method carried a malformed parameter array.
    #[error("failed to parse {method} message: {source}")]
    Parse {
        /// Inbound method name.
        method: String,
        /// Underlying parse error.
        #[source]
        source: MessageError,
    },
    /// The ingest processor failed.
    #[error("ingest failed for {method}: {source}")]
    Ingest {
        /// Inbound method name.
        method: &'static str,
        /// Underlying ingest error.
        #[source]
        source: IngestError,
    },
}

/// Dispatches typed inbound messages to the ingest processors.
pub struct MessageRouter {
    quotes: QuoteIngestor,
    candles: CandleIngestor,
}

impl MessageRouter {
    /// Create a router over the two processors.
    #[must_use]
    pub const fn new(quotes: QuoteIngestor, candles: CandleIngestor) -> Self {
        Self { quotes, candles }
    }

    /// Route one envelope. Unknown methods are a no-op.
    ///
    /// # Errors
    ///
    /// Returns a [`RouteError`] on parse or ingest failure; the caller logs
    /// it and keeps reading.
    pub async fn route(&self, envelope: &Envelope) -> Result<(), RouteError> {
        let message = match InboundMessage::from_envelope(envelope) {
            Ok(Some(message)) => message,
            Ok(None) => {
                tracing::debug!(method = %envelope.method, "no handler for method");
                return Ok(());
            }
            Err(source) => {
                return Err(RouteError::Parse {
                    method: envelope.method.clone(),
                    source,
                });
            }
        };

        match message {
            InboundMessage::QuoteData(message) => {
                self.quotes.process(&message);
                Ok(())
            }
            InboundMessage::TimescaleUpdate(message) => self
                .candles
                .process(&message.session_id, &message.update.series)
                .await
                .map_err(|source| RouteError::Ingest {
                    method: METHOD_TIMESCALE_UPDATE,
                    source,
                }),
            InboundMessage::DataUpdate(message) => self
                .candles
                .process(&message.session_id, &message.update.series)
                .await
                .map_err(|source| RouteError::Ingest {
                    method: METHOD_DATA_UPDATE,
                    source,
                }),
            InboundMessage::SeriesLoading(message) => {
                tracing::debug!(
                    session_id = %message.session_id,
                    series_id = %message.series_id,
                    "series loading"
                );
                Ok(())
            }
            InboundMessage::SymbolResolved(message) => {
                tracing::debug!(
                    session_id = %message.session_id,
                    symbol = %message.info.pro_name,
                    "symbol resolved"
                );
                Ok(())
            }
            InboundMessage::SeriesCompleted(message) => {
                tracing::debug!(
                    session_id = %message.session_id,
                    status = %message.status,
                    "series completed"
                );
                Ok(())
            }
            InboundMessage::QuoteCompleted(message) => {
                tracing::debug!(
                    session_id = %message.session_id,
                    symbol = %message.symbol,
                    "quote completed"
                );
                Ok(())
            }
        }
    }
}
