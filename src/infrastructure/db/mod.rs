//! Postgres Adapters
//!
//! Implements the durable-store ports over a shared `PgPool`:
//!
//! - **pool**: connection setup and idempotent schema creation
//! - **subscriptions**: [`crate::application::ports::SubscriptionStore`]
//! - **candles**: [`crate::application::ports::CandleStore`]

pub mod candles;
pub mod pool;
pub mod subscriptions;

pub use candles::PgCandleStore;
pub use pool::{connect, migrate};
pub use subscriptions::PgSubscriptionStore;

use crate::application::ports::StoreError;

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        Self::Database(error.to_string())
    }
}
