//! Betfair exchange API client
//!
//! Speaks the betting JSON-RPC endpoint and the identity keepAlive endpoint.

use crate::types::{
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, KeepAliveResponse, ListEventTypesParams,
    ListMarketBookParams, PriceProjection, LIST_EVENT_TYPES, LIST_MARKET_BOOK,
    LIST_MARKET_CATALOGUE,
};
use crate::weight::{total_weight, WEIGHT_BUDGET};
use crate::{CatalogueRequest, MarketDataClient};
use async_trait::async_trait;
use recorder_core::{
    Credentials, MarketBook, MarketCatalogue, PriceData, RecorderError, RecorderResult,
};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Betting API JSON-RPC endpoint
const BETTING_API_URL: &str = "https://api.betfair.com/exchange/betting/json-rpc/v1";
/// Session keepAlive endpoint
const KEEPALIVE_URL: &str = "https://identitysso.betfair.com/api/keepAlive";

/// Exchange error codes meaning the session or app key is unusable
const AUTH_ERROR_CODES: [&str; 4] = [
    "INVALID_SESSION_INFORMATION",
    "NO_SESSION",
    "INVALID_APP_KEY",
    "NO_APP_KEY",
];
const TOO_MUCH_DATA: &str = "TOO_MUCH_DATA";

/// Betfair exchange client
#[derive(Clone)]
pub struct BetfairClient {
    client: Client,
    betting_url: String,
    keepalive_url: String,
}

impl BetfairClient {
    pub fn new() -> Self {
        Self::with_urls(BETTING_API_URL, KEEPALIVE_URL)
    }

    /// Client against non-default endpoints
    pub fn with_urls(betting_url: impl Into<String>, keepalive_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            betting_url: betting_url.into(),
            keepalive_url: keepalive_url.into(),
        }
    }

    pub fn betting_url(&self) -> &str {
        &self.betting_url
    }

    async fn call<P, T>(
        &self,
        credentials: &Credentials,
        operation: &str,
        params: P,
    ) -> RecorderResult<Option<T>>
    where
        P: Serialize,
        T: DeserializeOwned,
    {
        let request = JsonRpcRequest::new(operation, params);

        let response = self
            .client
            .post(&self.betting_url)
            .header("X-Application", &credentials.app_key)
            .header("X-Authentication", &credentials.session_token)
            .header("Accept", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| RecorderError::transport(format!("Failed to call {}: {}", operation, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_http_failure(operation, status.as_u16(), &body));
        }

        let envelope: JsonRpcResponse<T> = response.json().await.map_err(|e| {
            RecorderError::parse(format!("Failed to parse {} response: {}", operation, e))
        })?;

        if let Some(error) = envelope.error {
            return Err(classify_rpc_error(operation, &error));
        }

        Ok(envelope.result)
    }

    /// List today's markets matching the configured filter
    #[instrument(skip(self, credentials, request))]
    pub async fn list_market_catalogue(
        &self,
        credentials: &Credentials,
        request: &CatalogueRequest,
    ) -> RecorderResult<Vec<MarketCatalogue>> {
        debug!(
            "Fetching catalogue for event type {} in {:?}",
            request.event_type_id, request.countries
        );

        let markets: Vec<MarketCatalogue> = self
            .call(credentials, LIST_MARKET_CATALOGUE, request.to_params())
            .await?
            .unwrap_or_default();

        if markets.is_empty() {
            return Err(RecorderError::empty("listMarketCatalogue returned no markets"));
        }

        debug!("Catalogue returned {} markets", markets.len());
        Ok(markets)
    }

    /// Fetch books for one batch of markets
    #[instrument(skip(self, credentials, price_projection), fields(markets = market_ids.len()))]
    pub async fn list_market_book(
        &self,
        credentials: &Credentials,
        market_ids: &[String],
        price_projection: &[PriceData],
    ) -> RecorderResult<Vec<MarketBook>> {
        let weight = total_weight(price_projection) * market_ids.len() as u32;
        if weight > WEIGHT_BUDGET {
            return Err(RecorderError::weight_exceeded(weight, WEIGHT_BUDGET));
        }

        let params = book_params(market_ids, price_projection);
        let books: Option<Vec<MarketBook>> = self
            .call(credentials, LIST_MARKET_BOOK, params)
            .await
            .map_err(|e| match e {
                RecorderError::WeightExceeded { budget, .. } => {
                    RecorderError::weight_exceeded(weight, budget)
                }
                other => other,
            })?;

        Ok(books.unwrap_or_default())
    }

    /// Extend the session token's lifetime
    #[instrument(skip(self, credentials))]
    pub async fn keep_alive(&self, credentials: &Credentials) -> RecorderResult<()> {
        let response = self
            .client
            .get(&self.keepalive_url)
            .header("X-Application", &credentials.app_key)
            .header("X-Authentication", &credentials.session_token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| RecorderError::transport(format!("Failed to send keepalive: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_http_failure("keepAlive", status.as_u16(), &body));
        }

        let keepalive: KeepAliveResponse = response
            .json()
            .await
            .map_err(|e| RecorderError::parse(format!("Failed to parse keepalive response: {}", e)))?;

        if !keepalive.is_success() {
            let reason = keepalive
                .error
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| keepalive.status.clone());
            warn!("Keepalive rejected: {}", reason);
            return Err(RecorderError::auth(format!("Keepalive rejected: {}", reason)));
        }

        debug!("Session extended");
        Ok(())
    }

    /// Check the credentials with a cheap authenticated call
    #[instrument(skip(self, credentials))]
    pub async fn check_session(&self, credentials: &Credentials) -> RecorderResult<()> {
        let _: Option<Value> = self
            .call(credentials, LIST_EVENT_TYPES, ListEventTypesParams::default())
            .await?;
        Ok(())
    }
}

impl Default for BetfairClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketDataClient for BetfairClient {
    async fn fetch_catalogue(
        &self,
        credentials: &Credentials,
        request: &CatalogueRequest,
    ) -> RecorderResult<Vec<MarketCatalogue>> {
        self.list_market_catalogue(credentials, request).await
    }

    async fn fetch_books(
        &self,
        credentials: &Credentials,
        market_ids: &[String],
        price_projection: &[PriceData],
    ) -> RecorderResult<Vec<MarketBook>> {
        self.list_market_book(credentials, market_ids, price_projection)
            .await
    }

    async fn keepalive(&self, credentials: &Credentials) -> RecorderResult<()> {
        self.keep_alive(credentials).await
    }

    async fn validate_session(&self, credentials: &Credentials) -> RecorderResult<()> {
        self.check_session(credentials).await
    }
}

impl std::fmt::Debug for BetfairClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BetfairClient")
            .field("betting_url", &self.betting_url)
            .field("keepalive_url", &self.keepalive_url)
            .finish()
    }
}

/// Map a JSON-RPC error object to the recorder taxonomy
pub fn classify_rpc_error(operation: &str, error: &JsonRpcError) -> RecorderError {
    match error.exchange_code() {
        Some(code) if AUTH_ERROR_CODES.contains(&code.as_str()) => {
            RecorderError::auth(format!("{} rejected the session: {}", operation, code))
        }
        Some(code) if code == TOO_MUCH_DATA => RecorderError::weight_exceeded(0, WEIGHT_BUDGET),
        Some(code) => RecorderError::transport(format!("{} failed: {}", operation, code)),
        None => RecorderError::transport(format!(
            "{} failed ({}): {}",
            operation, error.code, error.message
        )),
    }
}

/// Map a non-success HTTP answer, preferring an embedded JSON-RPC error
pub fn classify_http_failure(operation: &str, status: u16, body: &str) -> RecorderError {
    if let Ok(JsonRpcResponse {
        error: Some(error), ..
    }) = serde_json::from_str::<JsonRpcResponse<Value>>(body)
    {
        return classify_rpc_error(operation, &error);
    }

    match status {
        401 | 403 => RecorderError::auth(format!("{} returned HTTP {}", operation, status)),
        _ => RecorderError::transport(format!(
            "{} returned HTTP {}: {}",
            operation, status, body
        )),
    }
}

/// Book request for one batch, always asking for virtualised ladders
fn book_params(market_ids: &[String], price_projection: &[PriceData]) -> ListMarketBookParams {
    ListMarketBookParams {
        market_ids: market_ids.to_vec(),
        price_projection: Some(PriceProjection {
            price_data: price_projection.to_vec(),
            virtualise: true,
        }),
    }
}
