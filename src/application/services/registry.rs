//! Subscription Registry
//!
//! The registry owns the durable mapping of (exchange, symbol, kind,
//! timeframe) tuples to provider session ids and keeps it reconciled with
//! the live connection. Every (re)subscribe allocates a fresh session id;
//! the old id is never reused because the provider has no memory of it.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::application::ports::{
    ConnectionError, StoreError, StreamConnection, SubscriptionStore,
};
use crate::domain::subscription::{
    InvalidKey, Subscription, SubscriptionKey, SubscriptionKind, generate_session_id,
};
use crate::infrastructure::tradingview::messages::{DEFAULT_QUOTE_FIELDS, OutboundMessage};

/// Registry operation failure.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// An enabled row already exists for the requested key.
    #[error("subscription already exists with session {0}")]
    AlreadySubscribed(String),
    /// The key is internally inconsistent (kind vs timeframe).
    #[error(transparent)]
    InvalidKey(#[from] InvalidKey),
    /// The durable store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The provider connection failed.
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// Durable subscription registry plus the protocol actions that keep it in
/// sync with the provider.
pub struct SubscriptionRegistry {
    store: Arc<dyn SubscriptionStore>,
    connection: Arc<dyn StreamConnection>,
    series_bar_count: u32,
}

impl SubscriptionRegistry {
    /// Create a registry over a store and the connection's send capability.
    #[must_use]
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        connection: Arc<dyn StreamConnection>,
        series_bar_count: u32,
    ) -> Self {
        Self {
            store,
            connection,
            series_bar_count,
        }
    }

    /// Subscribe to a new key: allocate a session id, run the provider
    /// subscribe sequence, then persist the enabled row.
    ///
    /// # Errors
    ///
    /// Fails with [`RegistryError::AlreadySubscribed`] when an enabled row
    /// already exists for the key, and propagates store and connection
    /// failures.
    pub async fn subscribe(&self, key: SubscriptionKey) -> Result<Subscription, RegistryError> {
        if let Some(existing) = self.store.find_enabled_by_key(&key).await? {
            return Err(RegistryError::AlreadySubscribed(
                existing.provider_session_id,
            ));
        }

        let session_id = generate_session_id(key.kind);
        self.send_subscribe_sequence(&session_id, &key).await?;

        let now = Utc::now();
        let subscription = Subscription {
            id: Uuid::new_v4(),
            provider_session_id: session_id,
            exchange: key.exchange,
            symbol: key.symbol,
            kind: key.kind,
            timeframe: key.timeframe,
            enabled: true,
            created_at: now,
            updated_at: now,
        };
        self.store.insert(&subscription).await?;

        tracing::info!(
            session_id = %subscription.provider_session_id,
            exchange = %subscription.exchange,
            symbol = %subscription.symbol,
            kind = %subscription.kind,
            "subscribed"
        );
        Ok(subscription)
    }

    /// Tear down one subscription on the provider and flip its row to
    /// disabled. Network errors surface to the caller (user-initiated
    /// unsubscribe must report them).
    pub async fn unsubscribe(
        &self,
        subscription: &Subscription,
    ) -> Result<Subscription, RegistryError> {
        self.send_unsubscribe_sequence(subscription).await?;
        self.store.set_enabled(subscription.id, false).await?;

        tracing::info!(
            session_id = %subscription.provider_session_id,
            exchange = %subscription.exchange,
            symbol = %subscription.symbol,
            "unsubscribed"
        );

        let mut updated = subscription.clone();
        updated.enabled = false;
        updated.updated_at = Utc::now();
        Ok(updated)
    }

    /// Unsubscribe every enabled row. Returns the number of rows processed.
    pub async fn unsubscribe_all(&self) -> Result<usize, RegistryError> {
        let rows = self.store.list_enabled().await?;
        for row in &rows {
            self.send_unsubscribe_sequence(row).await?;
            self.store.set_enabled(row.id, false).await?;
        }
        Ok(rows.len())
    }

    /// Re-subscribe every enabled row with a fresh session id, persisting
    /// each row before the next is processed so a crash mid-way leaves a
    /// consistent partial state. Rows whose subscribe sequence fails keep
    /// their previous session id and are retried on the next reconnect.
    ///
    /// Returns the number of rows successfully re-subscribed.
    pub async fn resubscribe_enabled(&self) -> Result<usize, RegistryError> {
        let rows = self.store.list_enabled().await?;
        let mut resubscribed = 0;

        for row in &rows {
            let session_id = generate_session_id(row.kind);
            match self.send_subscribe_sequence(&session_id, &row.key()).await {
                Ok(()) => {
                    self.store.reassign_session(row.id, &session_id).await?;
                    resubscribed += 1;
                }
                Err(error) => {
                    tracing::warn!(
                        error = %error,
                        exchange = %row.exchange,
                        symbol = %row.symbol,
                        "re-subscribe failed, keeping previous session id"
                    );
                }
            }
        }

        Ok(resubscribed)
    }

    /// Operator-triggered reconciliation: best-effort unsubscribe of every
    /// enabled row, then reconnect. Re-subscription runs when the supervisor
    /// reports the new connection as established.
    pub async fn reconcile(&self) -> Result<(), RegistryError> {
        let rows = self.store.list_enabled().await?;
        for row in &rows {
            if let Err(error) = self.send_unsubscribe_sequence(row).await {
                tracing::debug!(
                    error = %error,
                    session_id = %row.provider_session_id,
                    "best-effort unsubscribe before reconnect failed"
                );
            }
        }
        self.connection.reconnect().await?;
        Ok(())
    }

    /// Disable every enabled row. Run once at startup: session ids from a
    /// previous process are meaningless to the provider.
    pub async fn cleanup_stale_sessions(&self) -> Result<u64, RegistryError> {
        let disabled = self.store.disable_all().await?;
        if disabled > 0 {
            tracing::info!(disabled, "disabled stale subscription rows from previous run");
        }
        Ok(disabled)
    }

    async fn send_subscribe_sequence(
        &self,
        session_id: &str,
        key: &SubscriptionKey,
    ) -> Result<(), RegistryError> {
        let symbol = key.provider_symbol();
        match key.kind {
            SubscriptionKind::Candle => {
                let Some(timeframe) = key.timeframe else {
                    return Err(InvalidKey::MissingTimeframe.into());
                };
                self.connection
                    .send(&OutboundMessage::chart_create_session(session_id))
                    .await?;
                self.connection
                    .send(&OutboundMessage::switch_timezone(session_id))
                    .await?;
                self.connection
                    .send(&OutboundMessage::resolve_symbol(session_id, &symbol))
                    .await?;
                self.connection
                    .send(&OutboundMessage::create_series(
                        session_id,
                        timeframe.as_str(),
                        self.series_bar_count,
                    ))
                    .await?;
            }
            SubscriptionKind::Quote => {
                self.connection
                    .send(&OutboundMessage::quote_create_session(session_id))
                    .await?;
                self.connection
                    .send(&OutboundMessage::quote_set_fields(
                        session_id,
                        DEFAULT_QUOTE_FIELDS,
                    ))
                    .await?;
                self.connection
                    .send(&OutboundMessage::quote_add_symbols(session_id, &[&symbol]))
                    .await?;
            }
        }
        Ok(())
    }

    async fn send_unsubscribe_sequence(
        &self,
        subscription: &Subscription,
    ) -> Result<(), ConnectionError> {
        match subscription.kind {
            SubscriptionKind::Candle => {
                self.connection
                    .send(&OutboundMessage::chart_delete_session(
                        &subscription.provider_session_id,
                    ))
                    .await
            }
            SubscriptionKind::Quote => {
                self.connection
                    .send(&OutboundMessage::quote_remove_symbols(
                        &subscription.provider_session_id,
                        &[&subscription.provider_symbol()],
                    ))
                    .await
            }
        }
    }
}
