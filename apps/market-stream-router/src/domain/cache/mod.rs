//! Live Market Presence Cache
//!
//! Tracks which markets are currently open in one stream's view. Presence
//! is the only information kept; no payload is stored.

use std::collections::HashSet;

use super::streaming::MarketId;

/// Set of market identifiers considered live by a single listener.
///
/// # Example
///
/// ```rust
/// use market_stream_router::domain::cache::MarketCache;
///
/// let mut cache = MarketCache::new();
/// assert!(cache.add("1.23"));
/// assert!(!cache.add("1.23"));
/// assert_eq!(cache.len(), 1);
///
/// assert!(cache.remove("1.23"));
/// assert!(!cache.remove("1.23"));
/// assert!(cache.is_empty());
/// ```
#[derive(Debug, Default, Clone)]
pub struct MarketCache {
    markets: HashSet<MarketId>,
}

impl MarketCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a presence marker.
    ///
    /// Returns `true` if the market was not already present.
    pub fn add(&mut self, market_id: &str) -> bool {
        if self.markets.contains(market_id) {
            return false;
        }
        self.markets.insert(market_id.to_string())
    }

    /// Delete a presence marker.
    ///
    /// Returns `true` if the market was present.
    pub fn remove(&mut self, market_id: &str) -> bool {
        self.markets.remove(market_id)
    }

    /// Whether the market is currently live.
    #[must_use]
    pub fn contains(&self, market_id: &str) -> bool {
        self.markets.contains(market_id)
    }

    /// Number of live markets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.markets.len()
    }

    /// Whether no market is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.markets.is_empty()
    }

    /// Identifiers of live markets, in no particular order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.markets.iter().map(String::as_str)
    }
}
