//! HTTP adapters - the hub's axum application.
//!
//! All routes live under `/api`:
//! - `GET /api/health` - liveness
//! - `GET /api/zigbee` - WebSocket device control

pub mod health;

pub use health::{health, health_router, HealthResponse};

use http::HeaderValue;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::adapters::websocket::{zigbee_router, ZigbeeState};
use crate::config::ServerConfig;

/// Build the complete application router.
///
/// CORS is restricted to `server.cors_origins` when set and permissive
/// otherwise. Origins that are not valid header values are skipped.
pub fn app_router(state: ZigbeeState, server: &ServerConfig) -> Router {
    let api = Router::new()
        .merge(health_router())
        .merge(zigbee_router());

    Router::new()
        .nest("/api", api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(server)),
        )
        .with_state(state)
}

fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = server
        .allowed_origins()
        .into_iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any)
    }
}
