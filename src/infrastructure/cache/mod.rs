//! Quote Cache
//!
//! Size-bounded in-process cache of the latest [`QuoteSnapshot`] per
//! provider symbol. Readers are lock-free; writes are visible as soon as
//! [`QuoteCache::insert`] returns, so a control-plane read issued after a
//! completed ingest always observes it. At capacity, a write for a
//! previously unseen symbol is rejected (the caller logs it); known
//! symbols always update in place.

use dashmap::DashMap;

use crate::domain::market::QuoteSnapshot;

/// Configuration for the quote cache.
#[derive(Debug, Clone)]
pub struct QuoteCacheConfig {
    /// Maximum number of distinct symbols held.
    pub max_entries: usize,
}

impl Default for QuoteCacheConfig {
    fn default() -> Self {
        Self { max_entries: 10_000 }
    }
}

/// Latest-quote cache keyed by provider symbol name.
pub struct QuoteCache {
    entries: DashMap<String, QuoteSnapshot>,
    max_entries: usize,
}

impl QuoteCache {
    /// Create a cache with the given capacity bound.
    #[must_use]
    pub fn new(config: QuoteCacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries: config.max_entries,
        }
    }

    /// The cached snapshot for a symbol, if any.
    #[must_use]
    pub fn get(&self, symbol: &str) -> Option<QuoteSnapshot> {
        self.entries.get(symbol).map(|entry| entry.clone())
    }

    /// Store a snapshot under its symbol name. Returns `false` when the
    /// cache is full and the symbol is not already present.
    pub fn insert(&self, snapshot: QuoteSnapshot) -> bool {
        if !self.entries.contains_key(&snapshot.symbol)
            && self.entries.len() >= self.max_entries
        {
            return false;
        }
        let key = snapshot.symbol.clone();
        self.entries.insert(key, snapshot);
        true
    }

    /// Number of cached symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
