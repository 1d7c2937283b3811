//! Shared test fixtures: in-memory store implementations and a recording
//! stream connection.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use uuid::Uuid;

use tradingview_stream_ingest::application::ports::{
    CandleStore, ConnectionError, ConnectionState, StoreError, StreamConnection,
    SubscriptionStore,
};
use tradingview_stream_ingest::application::services::SubscriptionRegistry;
use tradingview_stream_ingest::domain::market::{Candle, CandleUpsert, Timeframe};
use tradingview_stream_ingest::domain::subscription::{
    Subscription, SubscriptionKey, SubscriptionKind, generate_session_id,
};
use tradingview_stream_ingest::infrastructure::cache::{QuoteCache, QuoteCacheConfig};
use tradingview_stream_ingest::infrastructure::http::AppState;
use tradingview_stream_ingest::infrastructure::tradingview::OutboundMessage;

// =============================================================================
// Subscription store
// =============================================================================

#[derive(Default)]
pub struct MemorySubscriptionStore {
    rows: Mutex<Vec<Subscription>>,
}

impl MemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> Vec<Subscription> {
        self.rows.lock().clone()
    }

    pub fn seed(&self, subscription: Subscription) {
        self.rows.lock().push(subscription);
    }

    pub fn seed_enabled(
        &self,
        exchange: &str,
        symbol: &str,
        kind: SubscriptionKind,
        timeframe: Option<Timeframe>,
    ) -> Subscription {
        let now = Utc::now();
        let subscription = Subscription {
            id: Uuid::new_v4(),
            provider_session_id: generate_session_id(kind),
            exchange: exchange.to_string(),
            symbol: symbol.to_string(),
            kind,
            timeframe,
            enabled: true,
            created_at: now,
            updated_at: now,
        };
        self.seed(subscription.clone());
        subscription
    }
}

#[async_trait]
impl SubscriptionStore for MemorySubscriptionStore {
    async fn insert(&self, subscription: &Subscription) -> Result<(), StoreError> {
        self.rows.lock().push(subscription.clone());
        Ok(())
    }

    async fn find_enabled_by_key(
        &self,
        key: &SubscriptionKey,
    ) -> Result<Option<Subscription>, StoreError> {
        Ok(self
            .rows
            .lock()
            .iter()
            .find(|row| row.enabled && row.key() == *key)
            .cloned())
    }

    async fn find_by_session_id(
        &self,
        session_id: &str,
    ) -> Result<Option<Subscription>, StoreError> {
        Ok(self
            .rows
            .lock()
            .iter()
            .find(|row| row.provider_session_id == session_id)
            .cloned())
    }

    async fn list_enabled(&self) -> Result<Vec<Subscription>, StoreError> {
        Ok(self
            .rows
            .lock()
            .iter()
            .filter(|row| row.enabled)
            .cloned()
            .collect())
    }

    async fn list_enabled_for_symbol(
        &self,
        exchange: &str,
        symbol: &str,
    ) -> Result<Vec<Subscription>, StoreError> {
        Ok(self
            .rows
            .lock()
            .iter()
            .filter(|row| row.enabled && row.exchange == exchange && row.symbol == symbol)
            .cloned()
            .collect())
    }

    async fn set_enabled(&self, id: Uuid, enabled: bool) -> Result<(), StoreError> {
        let mut rows = self.rows.lock();
        if let Some(row) = rows.iter_mut().find(|row| row.id == id) {
            row.enabled = enabled;
            row.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn reassign_session(&self, id: Uuid, session_id: &str) -> Result<(), StoreError> {
        let mut rows = self.rows.lock();
        if let Some(row) = rows.iter_mut().find(|row| row.id == id) {
            row.provider_session_id = session_id.to_string();
            row.enabled = true;
            row.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn disable_all(&self) -> Result<u64, StoreError> {
        let mut rows = self.rows.lock();
        let mut disabled = 0;
        for row in rows.iter_mut().filter(|row| row.enabled) {
            row.enabled = false;
            row.updated_at = Utc::now();
            disabled += 1;
        }
        Ok(disabled)
    }
}

// =============================================================================
// Candle store
// =============================================================================

#[derive(Default)]
pub struct MemoryCandleStore {
    rows: Mutex<Vec<Candle>>,
}

impl MemoryCandleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> Vec<Candle> {
        self.rows.lock().clone()
    }
}

#[async_trait]
impl CandleStore for MemoryCandleStore {
    async fn upsert(&self, candle: &CandleUpsert) -> Result<(), StoreError> {
        let mut rows = self.rows.lock();
        if let Some(existing) = rows.iter_mut().find(|row| {
            row.exchange == candle.exchange
                && row.symbol == candle.symbol
                && row.timeframe == candle.timeframe
                && row.timestamp == candle.timestamp
        }) {
            existing.open = candle.open;
            existing.high = candle.high;
            existing.low = candle.low;
            existing.close = candle.close;
            existing.volume = candle.volume;
        } else {
            rows.push(Candle {
                id: Uuid::new_v4(),
                exchange: candle.exchange.clone(),
                symbol: candle.symbol.clone(),
                timeframe: candle.timeframe,
                timestamp: candle.timestamp,
                open: candle.open,
                high: candle.high,
                low: candle.low,
                close: candle.close,
                volume: candle.volume,
                created_at: Utc::now(),
            });
        }
        Ok(())
    }

    async fn recent_ascending(
        &self,
        exchange: &str,
        symbol: &str,
        timeframe: Timeframe,
        limit: i64,
    ) -> Result<Vec<Candle>, StoreError> {
        let mut matched: Vec<Candle> = self
            .rows
            .lock()
            .iter()
            .filter(|row| {
                row.exchange == exchange && row.symbol == symbol && row.timeframe == timeframe
            })
            .cloned()
            .collect();
        matched.sort_by_key(|row| std::cmp::Reverse(row.timestamp));
        matched.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        matched.reverse();
        Ok(matched)
    }
}

// =============================================================================
// Recording connection
// =============================================================================

#[derive(Default)]
pub struct RecordingConnection {
    sent: Mutex<Vec<OutboundMessage>>,
    reconnects: AtomicUsize,
}

impl RecordingConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().clone()
    }

    pub fn sent_methods(&self) -> Vec<&'static str> {
        self.sent.lock().iter().map(OutboundMessage::method).collect()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }

    pub fn reconnect_count(&self) -> usize {
        self.reconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StreamConnection for RecordingConnection {
    async fn send(&self, message: &OutboundMessage) -> Result<(), ConnectionError> {
        self.sent.lock().push(message.clone());
        Ok(())
    }

    async fn reconnect(&self) -> Result<(), ConnectionError> {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn state(&self) -> ConnectionState {
        ConnectionState::Connected
    }
}

// =============================================================================
// Wiring
// =============================================================================

pub struct TestHarness {
    pub state: AppState,
    pub subscriptions: Arc<MemorySubscriptionStore>,
    pub candles: Arc<MemoryCandleStore>,
    pub quotes: Arc<QuoteCache>,
    pub connection: Arc<RecordingConnection>,
}

pub fn harness() -> TestHarness {
    let subscriptions = Arc::new(MemorySubscriptionStore::new());
    let candles = Arc::new(MemoryCandleStore::new());
    let quotes = Arc::new(QuoteCache::new(QuoteCacheConfig::default()));
    let connection = Arc::new(RecordingConnection::new());

    let registry = Arc::new(SubscriptionRegistry::new(
        subscriptions.clone(),
        connection.clone(),
        300,
    ));

    let state = AppState {
        registry,
        subscriptions: subscriptions.clone(),
        candles: candles.clone(),
        quotes: quotes.clone(),
        connection: connection.clone(),
        started_at: Instant::now(),
    };

    TestHarness {
        state,
        subscriptions,
        candles,
        quotes,
        connection,
    }
}
