use crate::market::types::MarketSnapshot;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

const UPDATE_CHANNEL_CAPACITY: usize = 1_024;

/// Result of a cache read. `Unknown` means "no data yet" and must be rendered
/// as a placeholder, never as a zero price.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "snapshot", rename_all = "lowercase")]
pub enum SnapshotLookup {
    Known(Arc<MarketSnapshot>),
    Unknown,
}

impl SnapshotLookup {
    pub fn snapshot(&self) -> Option<&MarketSnapshot> {
        match self {
            Self::Known(snapshot) => Some(snapshot),
            Self::Unknown => None,
        }
    }

    pub fn price(&self) -> Option<f64> {
        self.snapshot().and_then(MarketSnapshot::price)
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Self::Known(_))
    }
}

/// Latest snapshot per symbol.
///
/// Entries are stored as `Arc<MarketSnapshot>` and swapped whole under a
/// short write lock, so a reader holds either the previous or the next
/// snapshot, never a mix. Clones share the same map.
#[derive(Debug, Clone)]
pub struct SymbolCache {
    entries: Arc<RwLock<HashMap<String, Arc<MarketSnapshot>>>>,
    updates: broadcast::Sender<Arc<MarketSnapshot>>,
}

impl Default for SymbolCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolCache {
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            updates,
        }
    }

    /// Replaces any snapshot stored under `symbol`. Nothing from the previous
    /// entry survives.
    pub fn upsert(&self, symbol: impl Into<String>, snapshot: MarketSnapshot) -> Arc<MarketSnapshot> {
        let snapshot = Arc::new(snapshot);
        {
            let mut writable = self.entries.write();
            writable.insert(symbol.into(), Arc::clone(&snapshot));
        }
        // No subscribers is fine; the map is the source of truth.
        let _ = self.updates.send(Arc::clone(&snapshot));
        snapshot
    }

    pub fn get(&self, symbol: &str) -> SnapshotLookup {
        let readable = self.entries.read();
        match readable.get(symbol) {
            Some(snapshot) => SnapshotLookup::Known(Arc::clone(snapshot)),
            None => SnapshotLookup::Unknown,
        }
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().keys().cloned().collect();
        keys.sort_unstable();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<MarketSnapshot>> {
        self.updates.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::types::Trend;

    fn snapshot(symbol: &str, price: f64) -> MarketSnapshot {
        MarketSnapshot::new(symbol, Some(price))
    }

    #[test]
    fn unseen_symbol_is_unknown() {
        let cache = SymbolCache::new();
        let lookup = cache.get("BTCUSDT");

        assert_eq!(lookup, SnapshotLookup::Unknown);
        assert!(!lookup.is_known());
        assert_eq!(lookup.price(), None);
    }

    #[test]
    fn upsert_replaces_whole_snapshot() {
        let cache = SymbolCache::new();
        let mut first = snapshot("BTCUSDT", 95_000.0);
        first.trend = Some(Trend::Up);
        first.rsi = Some(55.0);
        let second = snapshot("BTCUSDT", 95_100.0);

        cache.upsert("BTCUSDT", first);
        cache.upsert("BTCUSDT", second.clone());

        let stored = cache.get("BTCUSDT");
        assert_eq!(stored.snapshot(), Some(&second));
        let stored = stored.snapshot().expect("snapshot should be known");
        assert!(stored.trend.is_none());
        assert!(stored.rsi.is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn keys_lists_every_known_symbol() {
        let cache = SymbolCache::new();
        assert!(cache.is_empty());

        cache.upsert("SOLUSDT", snapshot("SOLUSDT", 150.0));
        cache.upsert("BTCUSDT", snapshot("BTCUSDT", 95_000.0));
        cache.upsert("SOLUSDT", snapshot("SOLUSDT", 151.0));

        assert_eq!(cache.keys(), vec!["BTCUSDT".to_string(), "SOLUSDT".to_string()]);
    }

    #[test]
    fn unknown_price_is_not_zero() {
        let cache = SymbolCache::new();
        cache.upsert("PEPEUSDT", MarketSnapshot::new("PEPEUSDT", None));

        let lookup = cache.get("PEPEUSDT");
        assert!(lookup.is_known());
        assert_eq!(lookup.price(), None);
    }

    #[tokio::test]
    async fn subscribers_receive_every_upsert_in_order() {
        let cache = SymbolCache::new();
        let mut updates = cache.subscribe();

        cache.upsert("ETHUSDT", snapshot("ETHUSDT", 2_500.0));
        cache.upsert("ETHUSDT", snapshot("ETHUSDT", 2_510.0));

        let first = updates.recv().await.expect("first update should arrive");
        let second = updates.recv().await.expect("second update should arrive");
        assert_eq!(first.price(), Some(2_500.0));
        assert_eq!(second.price(), Some(2_510.0));
    }

    #[test]
    fn concurrent_readers_never_observe_torn_snapshots() {
        let cache = SymbolCache::new();
        let writer_cache = cache.clone();

        let writer = std::thread::spawn(move || {
            for step in 1..=2_000_u32 {
                let value = f64::from(step);
                let mut next = MarketSnapshot::new("BTCUSDT", Some(value));
                next.bid = Some(value);
                next.ask = Some(value);
                writer_cache.upsert("BTCUSDT", next);
            }
        });

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let reader_cache = cache.clone();
                std::thread::spawn(move || {
                    for _ in 0..2_000 {
                        if let Some(seen) = reader_cache.get("BTCUSDT").snapshot() {
                            assert_eq!(seen.current_price, seen.bid);
                            assert_eq!(seen.current_price, seen.ask);
                        }
                    }
                })
            })
            .collect();

        writer.join().expect("writer should finish");
        for reader in readers {
            reader.join().expect("reader should finish");
        }
        assert_eq!(cache.get("BTCUSDT").price(), Some(2_000.0));
    }
}
