use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;

use crate::gateway::{ws_handler, GatewayState};

/// Mounts the `/ws` upgrade endpoint. Authentication and authorization for
/// individual subscriptions happen inside the socket (spec §4.5), so this
/// route itself stays permissive the way the monitoring router's public
/// routes do.
pub fn create_gateway_router(state: Arc<GatewayState>) -> Router {
    Router::new().route("/ws", get(ws_handler)).layer(CorsLayer::permissive()).with_state(state)
}
