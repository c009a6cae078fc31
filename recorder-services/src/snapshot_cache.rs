//! Feed snapshot cache
//!
//! Holds the view from the most recently completed cycle. Writers build a new
//! [`FeedSnapshot`] and swap it in whole, so readers always see either the
//! previous or the next complete snapshot and never wait on a cycle.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use recorder_core::{MarketBook, MarketCatalogue, MarketSummary};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Totals derived from a snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedAggregates {
    pub markets: usize,
    pub books: usize,
    pub in_play: usize,
    pub venues: usize,
    pub total_matched: Decimal,
}

/// Catalogue and books from one completed cycle
#[derive(Debug, Clone, Default)]
pub struct FeedSnapshot {
    /// Catalogue entries in exchange order (first to start)
    pub catalogue: Vec<MarketCatalogue>,
    pub books: HashMap<String, MarketBook>,
    pub updated_at: Option<DateTime<Utc>>,
    pub aggregates: FeedAggregates,
}

impl FeedSnapshot {
    pub fn new(
        catalogue: Vec<MarketCatalogue>,
        books: HashMap<String, MarketBook>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        let venues: HashSet<&str> = catalogue
            .iter()
            .map(|m| m.venue())
            .filter(|v| !v.is_empty())
            .collect();

        let aggregates = FeedAggregates {
            markets: catalogue.len(),
            books: books.len(),
            in_play: books.values().filter(|b| b.inplay).count(),
            venues: venues.len(),
            total_matched: catalogue
                .iter()
                .map(|m| {
                    books
                        .get(&m.market_id)
                        .and_then(|b| b.total_matched)
                        .or(m.total_matched)
                        .unwrap_or_default()
                })
                .sum(),
        };

        Self {
            catalogue,
            books,
            updated_at: Some(updated_at),
            aggregates,
        }
    }

    pub fn contains(&self, market_id: &str) -> bool {
        self.catalogue.iter().any(|m| m.market_id == market_id)
    }

    /// Dashboard rows, ordered by scheduled start
    pub fn summaries(&self, now: DateTime<Utc>) -> Vec<MarketSummary> {
        let mut rows: Vec<MarketSummary> = self
            .catalogue
            .iter()
            .map(|m| MarketSummary::new(m, self.books.get(&m.market_id), now))
            .collect();
        rows.sort_by(|a, b| a.market_start_time.cmp(&b.market_start_time));
        rows
    }
}

/// Atomically swapped pointer to the latest [`FeedSnapshot`]
#[derive(Default)]
pub struct SnapshotCache {
    current: RwLock<Arc<FeedSnapshot>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Arc<FeedSnapshot> {
        self.current.read().clone()
    }

    pub fn publish(&self, snapshot: FeedSnapshot) {
        *self.current.write() = Arc::new(snapshot);
    }

    pub fn clear(&self) {
        self.publish(FeedSnapshot::default());
    }

    pub fn markets(&self) -> Vec<MarketCatalogue> {
        self.snapshot().catalogue.clone()
    }

    pub fn book(&self, market_id: &str) -> Option<MarketBook> {
        self.snapshot().books.get(market_id).cloned()
    }

    /// Books for `market_ids` in request order, skipping unknown ids
    pub fn books(&self, market_ids: &[String]) -> Vec<MarketBook> {
        let snapshot = self.snapshot();
        market_ids
            .iter()
            .filter_map(|id| snapshot.books.get(id).cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn catalogue(id: &str, venue: &str, hour: u32) -> MarketCatalogue {
        serde_json::from_value(json!({
            "marketId": id,
            "marketName": "R1",
            "marketStartTime": format!("2026-04-01T{:02}:00:00Z", hour),
            "totalMatched": 10,
            "event": {"venue": venue}
        }))
        .unwrap()
    }

    fn book(id: &str, inplay: bool) -> MarketBook {
        serde_json::from_value(json!({
            "marketId": id,
            "status": "OPEN",
            "inplay": inplay,
            "totalMatched": 100
        }))
        .unwrap()
    }

    #[test]
    fn test_aggregates() {
        let now = Utc.with_ymd_and_hms(2026, 4, 1, 12, 0, 0).unwrap();
        let books = HashMap::from([("1.1".to_string(), book("1.1", true))]);
        let snapshot = FeedSnapshot::new(
            vec![catalogue("1.1", "Ascot", 14), catalogue("1.2", "Ascot", 13)],
            books,
            now,
        );

        assert_eq!(snapshot.aggregates.markets, 2);
        assert_eq!(snapshot.aggregates.books, 1);
        assert_eq!(snapshot.aggregates.in_play, 1);
        assert_eq!(snapshot.aggregates.venues, 1);
        assert_eq!(snapshot.aggregates.total_matched, dec!(110));

        let rows = snapshot.summaries(now);
        assert_eq!(rows[0].market_id, "1.2");
        assert!(!rows[0].has_book_data);
        assert!(rows[1].in_play);
    }

    #[test]
    fn test_publish_swaps_whole_snapshot() {
        let now = Utc.with_ymd_and_hms(2026, 4, 1, 12, 0, 0).unwrap();
        let cache = SnapshotCache::new();
        let before = cache.snapshot();

        cache.publish(FeedSnapshot::new(
            vec![catalogue("1.1", "Ascot", 14)],
            HashMap::from([("1.1".to_string(), book("1.1", false))]),
            now,
        ));

        // readers holding the old Arc keep a consistent view
        assert!(before.catalogue.is_empty());
        assert_eq!(cache.markets().len(), 1);
        assert!(cache.book("1.1").is_some());
        assert_eq!(
            cache.books(&["9.9".to_string(), "1.1".to_string()]).len(),
            1
        );

        cache.clear();
        assert!(cache.snapshot().updated_at.is_none());
    }
}
