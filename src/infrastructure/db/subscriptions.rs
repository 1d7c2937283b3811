//! Subscription Store
//!
//! Postgres implementation of the subscription port. Kind and timeframe
//! are persisted as their provider string forms; a row that fails to map
//! back is surfaced as a corrupt-row error rather than silently skipped.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::application::ports::{StoreError, SubscriptionStore};
use crate::domain::market::Timeframe;
use crate::domain::subscription::{Subscription, SubscriptionKey, SubscriptionKind};

const SELECT_COLUMNS: &str = "id, provider_session_id, exchange, symbol, kind, timeframe, \
                              enabled, created_at, updated_at";

/// Postgres-backed subscription store.
pub struct PgSubscriptionStore {
    pool: PgPool,
}

impl PgSubscriptionStore {
    /// Create a store over a shared pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_row(row: &PgRow) -> Result<Subscription, StoreError> {
    let kind_raw: String = row.try_get("kind")?;
    let kind = SubscriptionKind::parse(&kind_raw)
        .ok_or_else(|| StoreError::CorruptRow(format!("unknown subscription kind: {kind_raw}")))?;

    let timeframe_raw: Option<String> = row.try_get("timeframe")?;
    let timeframe = match timeframe_raw {
        Some(raw) => Some(
            Timeframe::parse(&raw)
                .ok_or_else(|| StoreError::CorruptRow(format!("unknown timeframe: {raw}")))?,
        ),
        None => None,
    };

    Ok(Subscription {
        id: row.try_get("id")?,
        provider_session_id: row.try_get("provider_session_id")?,
        exchange: row.try_get("exchange")?,
        symbol: row.try_get("symbol")?,
        kind,
        timeframe,
        enabled: row.try_get("enabled")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

#[async_trait]
impl SubscriptionStore for PgSubscriptionStore {
    async fn insert(&self, subscription: &Subscription) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO subscriptions (
                id, provider_session_id, exchange, symbol, kind, timeframe,
                enabled, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ",
        )
        .bind(subscription.id)
        .bind(&subscription.provider_session_id)
        .bind(&subscription.exchange)
        .bind(&subscription.symbol)
        .bind(subscription.kind.as_str())
        .bind(subscription.timeframe.map(|tf| tf.as_str()))
        .bind(subscription.enabled)
        .bind(subscription.created_at)
        .bind(subscription.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_enabled_by_key(
        &self,
        key: &SubscriptionKey,
    ) -> Result<Option<Subscription>, StoreError> {
        let row = sqlx::query(&format!(
            r"
            SELECT {SELECT_COLUMNS} FROM subscriptions
            WHERE exchange = $1 AND symbol = $2 AND kind = $3
              AND timeframe IS NOT DISTINCT FROM $4 AND enabled
            LIMIT 1
            ",
        ))
        .bind(&key.exchange)
        .bind(&key.symbol)
        .bind(key.kind.as_str())
        .bind(key.timeframe.map(|tf| tf.as_str()))
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(map_row).transpose()
    }

    async fn find_by_session_id(
        &self,
        session_id: &str,
    ) -> Result<Option<Subscription>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM subscriptions WHERE provider_session_id = $1",
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(map_row).transpose()
    }

    async fn list_enabled(&self) -> Result<Vec<Subscription>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM subscriptions WHERE enabled ORDER BY created_at",
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_row).collect()
    }

    async fn list_enabled_for_symbol(
        &self,
        exchange: &str,
        symbol: &str,
    ) -> Result<Vec<Subscription>, StoreError> {
        let rows = sqlx::query(&format!(
            r"
            SELECT {SELECT_COLUMNS} FROM subscriptions
            WHERE enabled AND exchange = $1 AND symbol = $2
            ORDER BY created_at
            ",
        ))
        .bind(exchange)
        .bind(symbol)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_row).collect()
    }

    async fn set_enabled(&self, id: Uuid, enabled: bool) -> Result<(), StoreError> {
        sqlx::query("UPDATE subscriptions SET enabled = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(enabled)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn reassign_session(&self, id: Uuid, session_id: &str) -> Result<(), StoreError> {
        sqlx::query(
            r"
            UPDATE subscriptions
            SET provider_session_id = $2, enabled = TRUE, updated_at = now()
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn disable_all(&self) -> Result<u64, StoreError> {
        let result =
            sqlx::query("UPDATE subscriptions SET enabled = FALSE, updated_at = now() WHERE enabled")
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }
}
