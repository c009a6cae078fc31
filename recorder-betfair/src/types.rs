//! Betfair JSON-RPC wire types
//!
//! These mirror the exchange's envelope and request parameters. Response
//! payloads decode straight into the recorder-core market types.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use recorder_core::{MarketProjection, PriceData, RecorderConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";
pub const METHOD_PREFIX: &str = "SportsAPING/v1.0/";

pub const LIST_MARKET_CATALOGUE: &str = "listMarketCatalogue";
pub const LIST_MARKET_BOOK: &str = "listMarketBook";
pub const LIST_EVENT_TYPES: &str = "listEventTypes";

/// Fully qualified JSON-RPC method name
pub fn method_name(operation: &str) -> String {
    format!("{}{}", METHOD_PREFIX, operation)
}

/// Operation name from a method, accepting both the qualified and bare forms
pub fn operation_name(method: &str) -> &str {
    method.strip_prefix(METHOD_PREFIX).unwrap_or(method)
}

/// JSON-RPC request envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest<P = Value> {
    #[serde(default = "default_jsonrpc")]
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: P,
    #[serde(default)]
    pub id: Value,
}

fn default_jsonrpc() -> String {
    JSONRPC_VERSION.to_string()
}

impl<P> JsonRpcRequest<P> {
    pub fn new(operation: &str, params: P) -> Self {
        Self {
            jsonrpc: default_jsonrpc(),
            method: method_name(operation),
            params,
            id: Value::from(1),
        }
    }
}

/// JSON-RPC response envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct JsonRpcResponse<T = Value> {
    #[serde(default = "default_jsonrpc")]
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    #[serde(default)]
    pub id: Value,
}

impl<T> JsonRpcResponse<T> {
    pub fn success(id: Value, result: T) -> Self {
        Self {
            jsonrpc: default_jsonrpc(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn failure(id: Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: default_jsonrpc(),
            result: None,
            error: Some(error),
            id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;

    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Exchange error code, e.g. `INVALID_SESSION_INFORMATION`.
    ///
    /// Betfair nests it as `data.APINGException.errorCode`; older responses
    /// only carry it in the message.
    pub fn exchange_code(&self) -> Option<String> {
        let nested = self.data.as_ref().and_then(|data| {
            data.as_object()?
                .values()
                .find_map(|v| v.get("errorCode")?.as_str().map(str::to_string))
        });
        nested.or_else(|| {
            self.message
                .split(|c: char| !(c.is_ascii_uppercase() || c == '_'))
                .find(|word| word.len() > 3 && word.contains('_'))
                .map(str::to_string)
        })
    }
}

/// Time window for a market filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketFilter {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub market_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub event_type_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub market_countries: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub market_type_codes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_start_time: Option<TimeRange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMarketCatalogueParams {
    pub filter: MarketFilter,
    pub market_projection: Vec<MarketProjection>,
    pub sort: String,
    pub max_results: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceProjection {
    #[serde(default)]
    pub price_data: Vec<PriceData>,
    /// Include virtual (cross-matched) prices in the ladders
    #[serde(default)]
    pub virtualise: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMarketBookParams {
    #[serde(default)]
    pub market_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_projection: Option<PriceProjection>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ListEventTypesParams {
    pub filter: MarketFilter,
}

/// Response from the identity keepAlive endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct KeepAliveResponse {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub error: Option<String>,
}

impl KeepAliveResponse {
    pub fn is_success(&self) -> bool {
        self.status.eq_ignore_ascii_case("SUCCESS")
    }
}

pub const CATALOGUE_MAX_RESULTS: u32 = 1000;
pub const CATALOGUE_SORT: &str = "FIRST_TO_START";

/// What the engine asks the catalogue for on one cycle
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogueRequest {
    pub event_type_id: String,
    pub countries: Vec<String>,
    /// Empty means every market type
    pub market_types: Vec<String>,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub projection: Vec<MarketProjection>,
    pub max_results: u32,
}

impl CatalogueRequest {
    /// Markets starting within the UTC day `date`
    pub fn for_day(config: &RecorderConfig, date: NaiveDate) -> Self {
        let from = date.and_time(chrono::NaiveTime::MIN).and_utc();
        let to = from + Duration::days(1) - Duration::seconds(1);
        Self {
            event_type_id: config.event_type_id.clone(),
            countries: config.countries.clone(),
            market_types: config.market_types.clone(),
            from,
            to,
            projection: config.catalogue_projection.clone(),
            max_results: CATALOGUE_MAX_RESULTS,
        }
    }

    pub fn to_params(&self) -> ListMarketCatalogueParams {
        ListMarketCatalogueParams {
            filter: MarketFilter {
                event_type_ids: vec![self.event_type_id.clone()],
                market_countries: self.countries.clone(),
                market_type_codes: self.market_types.clone(),
                market_start_time: Some(TimeRange {
                    from: self.from,
                    to: self.to,
                }),
                ..Default::default()
            },
            market_projection: self.projection.clone(),
            sort: CATALOGUE_SORT.to_string(),
            max_results: self.max_results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_catalogue_params_shape() {
        let config = RecorderConfig::default();
        let date = NaiveDate::from_ymd_opt(2026, 5, 2).unwrap();
        let params = CatalogueRequest::for_day(&config, date).to_params();
        let value = serde_json::to_value(&params).unwrap();

        assert_eq!(value["filter"]["eventTypeIds"], json!(["7"]));
        assert_eq!(value["filter"]["marketCountries"], json!(["GB", "IE"]));
        assert_eq!(value["filter"]["marketTypeCodes"], json!(["WIN"]));
        assert_eq!(value["filter"]["marketStartTime"]["from"], json!("2026-05-02T00:00:00Z"));
        assert_eq!(value["filter"]["marketStartTime"]["to"], json!("2026-05-02T23:59:59Z"));
        assert_eq!(value["sort"], json!("FIRST_TO_START"));
        assert_eq!(value["maxResults"], json!(1000));
        assert_eq!(value["marketProjection"][0], json!("EVENT"));
    }

    #[test]
    fn test_empty_market_types_omitted() {
        let mut config = RecorderConfig::default();
        config.market_types.clear();
        let date = NaiveDate::from_ymd_opt(2026, 5, 2).unwrap();
        let value = serde_json::to_value(CatalogueRequest::for_day(&config, date).to_params()).unwrap();
        assert!(value["filter"].get("marketTypeCodes").is_none());
    }

    #[test]
    fn test_request_envelope() {
        let request = JsonRpcRequest::new(
            LIST_MARKET_BOOK,
            ListMarketBookParams {
                market_ids: vec!["1.2".into()],
                price_projection: Some(PriceProjection {
                    price_data: vec![PriceData::ExBestOffers],
                    virtualise: true,
                }),
            },
        );
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["jsonrpc"], json!("2.0"));
        assert_eq!(value["method"], json!("SportsAPING/v1.0/listMarketBook"));
        assert_eq!(value["params"]["priceProjection"]["priceData"], json!(["EX_BEST_OFFERS"]));
        assert_eq!(value["params"]["priceProjection"]["virtualise"], json!(true));
        assert_eq!(operation_name("SportsAPING/v1.0/listMarketBook"), "listMarketBook");
        assert_eq!(operation_name("listMarketBook"), "listMarketBook");
    }

    #[test]
    fn test_exchange_code_extraction() {
        let nested: JsonRpcError = serde_json::from_value(json!({
            "code": -32099,
            "message": "ANGX-0003",
            "data": {
                "APINGException": {"errorCode": "INVALID_SESSION_INFORMATION", "errorDetails": ""},
                "exceptionname": "APINGException"
            }
        }))
        .unwrap();
        assert_eq!(nested.exchange_code().as_deref(), Some("INVALID_SESSION_INFORMATION"));

        let flat = JsonRpcError::new(-32099, "DSC-0018: NO_APP_KEY");
        assert_eq!(flat.exchange_code().as_deref(), Some("NO_APP_KEY"));

        assert_eq!(JsonRpcError::new(-32700, "Parse error").exchange_code(), None);
    }
}
