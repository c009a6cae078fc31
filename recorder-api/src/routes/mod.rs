//! API route definitions

mod config;
mod engine;
mod feed;
mod health;
mod probe;

#[cfg(test)]
pub(crate) mod test_support;

use axum::Router;

use crate::AppState;

/// Create all API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(health::routes())
        .merge(engine::routes())
        .merge(config::routes())
        .merge(feed::routes())
        .merge(probe::routes())
}
