//! Read path for downstream consumers
//!
//! Bodies use the exchange's own response shapes so a consumer written
//! against the exchange can point its base URL here instead.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::Json,
    routing::{get, post},
    Router,
};
use recorder_betfair::types::{
    operation_name, JsonRpcError, JsonRpcRequest, JsonRpcResponse, ListMarketBookParams,
    MarketFilter, LIST_MARKET_BOOK, LIST_MARKET_CATALOGUE,
};
use recorder_core::{MarketBook, MarketCatalogue, RecorderError};
use recorder_services::SnapshotCache;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarketBookRequest {
    #[serde(default)]
    market_ids: Vec<String>,
}

/// The parts of a `listMarketCatalogue` request the cache can honour
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct CatalogueQuery {
    filter: MarketFilter,
    max_results: Option<usize>,
}

/// Create feed routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/feed/markets", get(feed_markets))
        .route("/feed/market-book", post(feed_market_books))
        .route("/feed/market-book/{market_id}", get(feed_market_book))
        .route("/feed/json-rpc/v1", post(json_rpc))
}

async fn feed_markets(State(state): State<AppState>) -> Json<Vec<MarketCatalogue>> {
    Json(state.engine.cache().markets())
}

async fn feed_market_books(
    State(state): State<AppState>,
    payload: Result<Json<MarketBookRequest>, JsonRejection>,
) -> Result<Json<Vec<MarketBook>>, ApiError> {
    let Json(request) =
        payload.map_err(|e| RecorderError::parse(format!("Invalid market-book body: {}", e)))?;
    Ok(Json(state.engine.cache().books(&request.market_ids)))
}

async fn feed_market_book(
    State(state): State<AppState>,
    Path(market_id): Path<String>,
) -> Result<Json<MarketBook>, ApiError> {
    state
        .engine
        .cache()
        .book(&market_id)
        .map(Json)
        .ok_or_else(|| ApiError(RecorderError::not_found(format!("Market {}", market_id))))
}

/// Single request or batch, answered in kind
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RpcReply {
    Single(JsonRpcResponse),
    Batch(Vec<JsonRpcResponse>),
}

async fn json_rpc(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Json<RpcReply> {
    let cache = state.engine.cache();
    let reply = match payload {
        Ok(Json(Value::Array(requests))) => {
            RpcReply::Batch(requests.into_iter().map(|r| answer(cache, r)).collect())
        }
        Ok(Json(request)) => RpcReply::Single(answer(cache, request)),
        Err(e) => RpcReply::Single(JsonRpcResponse::failure(
            Value::Null,
            JsonRpcError::new(JsonRpcError::INVALID_REQUEST, e.body_text()),
        )),
    };
    Json(reply)
}

/// Answer one JSON-RPC request from the cache
fn answer(cache: &SnapshotCache, request: Value) -> JsonRpcResponse {
    let request: JsonRpcRequest = match serde_json::from_value(request) {
        Ok(request) => request,
        Err(e) => {
            return JsonRpcResponse::failure(
                Value::Null,
                JsonRpcError::new(JsonRpcError::INVALID_REQUEST, e.to_string()),
            )
        }
    };

    let id = request.id;
    let operation = operation_name(&request.method);
    debug!("Feed JSON-RPC {}", operation);

    let result = match operation {
        LIST_MARKET_CATALOGUE => serde_json::from_value::<CatalogueQuery>(request.params)
            .map(|query| serde_json::to_value(catalogue(cache, query))),
        LIST_MARKET_BOOK => serde_json::from_value::<ListMarketBookParams>(request.params)
            .map(|params| serde_json::to_value(cache.books(&params.market_ids))),
        other => {
            return JsonRpcResponse::failure(
                id,
                JsonRpcError::new(
                    JsonRpcError::METHOD_NOT_FOUND,
                    format!("Method {} is not served from the feed", other),
                ),
            )
        }
    };

    match result {
        Ok(Ok(value)) => JsonRpcResponse::success(id, value),
        Ok(Err(e)) => JsonRpcResponse::failure(
            id,
            JsonRpcError::new(JsonRpcError::INTERNAL_ERROR, e.to_string()),
        ),
        Err(e) => JsonRpcResponse::failure(
            id,
            JsonRpcError::new(JsonRpcError::INVALID_PARAMS, e.to_string()),
        ),
    }
}

fn catalogue(cache: &SnapshotCache, query: CatalogueQuery) -> Vec<MarketCatalogue> {
    let ids = &query.filter.market_ids;
    let mut markets: Vec<MarketCatalogue> = cache
        .markets()
        .into_iter()
        .filter(|m| ids.is_empty() || ids.contains(&m.market_id))
        .collect();
    if let Some(max) = query.max_results {
        markets.truncate(max);
    }
    markets
}
