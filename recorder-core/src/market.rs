//! Market data structures as the exchange returns them
//!
//! Catalogue and book types keep the exchange's own field names so the feed
//! can replay them verbatim. Fields this crate does not model are kept in
//! `extra` and written back out unchanged.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Status of a market as reported in its book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketStatus {
    Inactive,
    Open,
    Suspended,
    Closed,
    #[default]
    #[serde(other)]
    Unknown,
}

// ============================================================================
// Catalogue Types
// ============================================================================

/// Event the market belongs to (a race meeting, a fixture)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_date: Option<DateTime<Utc>>,
}

/// Static description of a runner (selection) in a market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerCatalog {
    pub selection_id: u64,
    #[serde(default)]
    pub runner_name: String,
    #[serde(default)]
    pub handicap: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_priority: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Slow-changing market metadata from the catalogue query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketCatalogue {
    pub market_id: String,
    #[serde(default)]
    pub market_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_matched: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub runners: Vec<RunnerCatalog>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<Event>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MarketCatalogue {
    /// Venue name, empty when the event projection was not requested
    pub fn venue(&self) -> &str {
        self.event
            .as_ref()
            .and_then(|e| e.venue.as_deref())
            .unwrap_or("")
    }

    pub fn event_name(&self) -> &str {
        self.event
            .as_ref()
            .and_then(|e| e.name.as_deref())
            .unwrap_or("")
    }

    pub fn runner_count(&self) -> usize {
        self.runners.len()
    }
}

// ============================================================================
// Book Types
// ============================================================================

/// A price and the amount available (or traded) at it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSize {
    pub price: Decimal,
    pub size: Decimal,
}

impl PriceSize {
    pub fn new(price: Decimal, size: Decimal) -> Self {
        Self { price, size }
    }
}

/// Exchange ladder for one runner
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangePrices {
    /// Best price first
    #[serde(default)]
    pub available_to_back: Vec<PriceSize>,
    /// Best price first
    #[serde(default)]
    pub available_to_lay: Vec<PriceSize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub traded_volume: Vec<PriceSize>,
}

/// Live state of a runner in a market book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Runner {
    pub selection_id: u64,
    #[serde(default)]
    pub handicap: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_price_traded: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_matched: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ex: Option<ExchangePrices>,
    /// Starting price block; the exchange may send non-numeric sentinels here
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sp: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Runner {
    pub fn back_prices(&self) -> &[PriceSize] {
        self.ex
            .as_ref()
            .map(|ex| ex.available_to_back.as_slice())
            .unwrap_or(&[])
    }

    pub fn lay_prices(&self) -> &[PriceSize] {
        self.ex
            .as_ref()
            .map(|ex| ex.available_to_lay.as_slice())
            .unwrap_or(&[])
    }
}

/// Fast-changing order book state for one market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketBook {
    pub market_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_market_data_delayed: Option<bool>,
    #[serde(default)]
    pub status: MarketStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bet_delay: Option<u32>,
    #[serde(default)]
    pub inplay: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_of_runners: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_of_active_runners: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_match_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_matched: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_available: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    #[serde(default)]
    pub runners: Vec<Runner>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ============================================================================
// Dashboard Rows
// ============================================================================

/// One row of the dashboard's market table: catalogue joined with its book
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSummary {
    pub market_id: String,
    pub market_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_start_time: Option<DateTime<Utc>>,
    pub venue: String,
    pub event: String,
    pub runners: usize,
    pub status: MarketStatus,
    pub in_play: bool,
    pub total_matched: Decimal,
    pub has_book_data: bool,
    /// Minutes until the scheduled start, negative once started
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minutes_to_off: Option<f64>,
}

impl MarketSummary {
    /// Build a row from the catalogue entry and, when present, the latest book
    pub fn new(catalogue: &MarketCatalogue, book: Option<&MarketBook>, now: DateTime<Utc>) -> Self {
        let minutes_to_off = catalogue.market_start_time.map(|start| {
            let seconds = start.signed_duration_since(now).num_seconds() as f64;
            (seconds / 6.0).round() / 10.0
        });

        let total_matched = book
            .and_then(|b| b.total_matched)
            .or(catalogue.total_matched)
            .unwrap_or_default();

        Self {
            market_id: catalogue.market_id.clone(),
            market_name: catalogue.market_name.clone(),
            market_start_time: catalogue.market_start_time,
            venue: catalogue.venue().to_string(),
            event: catalogue.event_name().to_string(),
            runners: catalogue.runner_count(),
            // The catalogue only lists open markets
            status: book.map(|b| b.status).unwrap_or(MarketStatus::Open),
            in_play: book.map(|b| b.inplay).unwrap_or(false),
            total_matched,
            has_book_data: book.is_some(),
            minutes_to_off,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    const CATALOGUE_JSON: &str = r#"{
        "marketId": "1.234567",
        "marketName": "2m4f Hcap Chs",
        "marketStartTime": "2026-03-10T14:30:00.000Z",
        "totalMatched": 1520.75,
        "description": {"bettingType": "ODDS"},
        "event": {"id": "3345", "name": "Chelt 10th Mar", "countryCode": "GB", "venue": "Cheltenham"},
        "runners": [
            {"selectionId": 101, "runnerName": "Alpha", "handicap": 0, "sortPriority": 1},
            {"selectionId": 102, "runnerName": "Bravo", "handicap": 0.0, "sortPriority": 2}
        ]
    }"#;

    const BOOK_JSON: &str = r#"{
        "marketId": "1.234567",
        "status": "OPEN",
        "inplay": true,
        "betDelay": 5,
        "totalMatched": 2000,
        "crossMatching": true,
        "runners": [
            {
                "selectionId": 101,
                "handicap": 0,
                "status": "ACTIVE",
                "ex": {
                    "availableToBack": [{"price": 3.5, "size": 12.4}],
                    "availableToLay": [{"price": 3.6, "size": 8}]
                },
                "sp": {"nearPrice": "NaN"}
            }
        ]
    }"#;

    #[test]
    fn test_catalogue_accessors() {
        let market: MarketCatalogue = serde_json::from_str(CATALOGUE_JSON).unwrap();

        assert_eq!(market.market_id, "1.234567");
        assert_eq!(market.venue(), "Cheltenham");
        assert_eq!(market.event_name(), "Chelt 10th Mar");
        assert_eq!(market.runner_count(), 2);
        assert_eq!(market.total_matched, Some(dec!(1520.75)));
    }

    #[test]
    fn test_unmodelled_fields_survive() {
        let market: MarketCatalogue = serde_json::from_str(CATALOGUE_JSON).unwrap();
        let value = serde_json::to_value(&market).unwrap();

        assert_eq!(value["description"]["bettingType"], "ODDS");

        let book: MarketBook = serde_json::from_str(BOOK_JSON).unwrap();
        let value = serde_json::to_value(&book).unwrap();

        assert_eq!(value["crossMatching"], true);
        assert_eq!(value["inplay"], true);
        assert_eq!(value["runners"][0]["sp"]["nearPrice"], "NaN");
    }

    #[test]
    fn test_book_ladders() {
        let book: MarketBook = serde_json::from_str(BOOK_JSON).unwrap();

        assert_eq!(book.status, MarketStatus::Open);
        assert!(book.inplay);
        let runner = &book.runners[0];
        assert_eq!(runner.back_prices(), &[PriceSize::new(dec!(3.5), dec!(12.4))]);
        assert_eq!(runner.lay_prices()[0].price, dec!(3.6));
    }

    #[test]
    fn test_unknown_status_is_tolerated() {
        let book: MarketBook =
            serde_json::from_str(r#"{"marketId": "1.1", "status": "SOMETHING_NEW"}"#).unwrap();
        assert_eq!(book.status, MarketStatus::Unknown);
        assert!(book.runners.is_empty());
    }

    #[test]
    fn test_summary_joins_book() {
        let market: MarketCatalogue = serde_json::from_str(CATALOGUE_JSON).unwrap();
        let book: MarketBook = serde_json::from_str(BOOK_JSON).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 14, 0, 0).unwrap();

        let row = MarketSummary::new(&market, Some(&book), now);
        assert!(row.has_book_data);
        assert!(row.in_play);
        assert_eq!(row.total_matched, dec!(2000));
        assert_eq!(row.minutes_to_off, Some(30.0));

        let row = MarketSummary::new(&market, None, now);
        assert!(!row.has_book_data);
        assert_eq!(row.status, MarketStatus::Open);
        assert_eq!(row.total_matched, dec!(1520.75));
    }
}
