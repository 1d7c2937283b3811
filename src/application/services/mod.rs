//! Application Services
//!
//! Services that orchestrate domain logic across the ports.
//!
//! - [`registry::SubscriptionRegistry`]: subscription lifecycle and
//!   reconnect reconciliation
//! - [`ingest`]: quote and candle processors fed by the message router

pub mod ingest;
pub mod registry;

pub use ingest::{CandleIngestor, IngestError, QuoteIngestor};
pub use registry::{RegistryError, SubscriptionRegistry};
