use std::sync::Arc;

use axum::{routing::get, Router};

use monitoring_cell::{create_monitoring_router, MonitoringHandlers};
use ws_gateway_cell::{create_gateway_router, GatewayState};

/// Top-level router: the WebSocket upgrade, this system's only
/// client-facing mutation surface, plus the monitoring cell's health and
/// metrics probes. This is the whole REST surface this binary carries.
pub fn create_router(gateway_state: Arc<GatewayState>, monitoring_handlers: Arc<MonitoringHandlers>) -> Router {
    Router::new()
        .route("/", get(|| async { "queue platform is running" }))
        .merge(create_gateway_router(gateway_state))
        .nest("/monitoring", create_monitoring_router(monitoring_handlers))
}
