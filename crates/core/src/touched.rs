//! Markets the user has changed a position in.
//!
//! Recorded after every confirmed bundle so position views can include
//! markets that indexers have not picked up yet.

use alloy::primitives::B256;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::fmt::Debug;

/// One recorded market.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TouchedMarket {
    pub chain_id: u64,
    pub market_id: B256,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Confirmed bundles against this market
    pub touches: u32,
}

/// Local cache of touched markets.
pub trait TouchedMarketStore: Send + Sync + Debug {
    fn record_touched_market(&self, chain_id: u64, market_id: B256);

    /// Markets on `chain_id`, most recently touched first.
    fn touched_markets(&self, chain_id: u64) -> Vec<TouchedMarket>;

    fn contains(&self, chain_id: u64, market_id: B256) -> bool {
        self.touched_markets(chain_id)
            .iter()
            .any(|m| m.market_id == market_id)
    }
}

/// Concurrent in-memory store.
#[derive(Debug, Default)]
pub struct InMemoryTouchedMarkets {
    markets: DashMap<(u64, B256), TouchedMarket>,
}

impl InMemoryTouchedMarkets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.markets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markets.is_empty()
    }
}

impl TouchedMarketStore for InMemoryTouchedMarkets {
    fn record_touched_market(&self, chain_id: u64, market_id: B256) {
        let now = Utc::now();
        self.markets
            .entry((chain_id, market_id))
            .and_modify(|m| {
                m.last_seen = now;
                m.touches = m.touches.saturating_add(1);
            })
            .or_insert_with(|| TouchedMarket {
                chain_id,
                market_id,
                first_seen: now,
                last_seen: now,
                touches: 1,
            });
        tracing::debug!(chain_id, market_id = %market_id, "Market recorded as touched");
    }

    fn touched_markets(&self, chain_id: u64) -> Vec<TouchedMarket> {
        let mut markets: Vec<TouchedMarket> = self
            .markets
            .iter()
            .filter(|entry| entry.key().0 == chain_id)
            .map(|entry| entry.value().clone())
            .collect();
        markets.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        markets
    }

    fn contains(&self, chain_id: u64, market_id: B256) -> bool {
        self.markets.contains_key(&(chain_id, market_id))
    }
}
