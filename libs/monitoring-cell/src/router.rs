use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::handlers::{
    acknowledge_alert, clear_all_alerts, get_active_alerts, get_alert_summary, get_current_metrics,
    get_health_status, MonitoringHandlers,
};

pub fn create_monitoring_router(handlers: Arc<MonitoringHandlers>) -> Router {
    let public_routes = Router::new()
        .route("/health", get(get_health_status))
        .route("/metrics", get(get_current_metrics))
        .route("/alerts/summary", get(get_alert_summary))
        .layer(CorsLayer::permissive())
        .with_state(handlers.clone());

    let protected_routes = Router::new()
        .route("/alerts", get(get_active_alerts))
        .route("/alerts/acknowledge", post(acknowledge_alert))
        .with_state(handlers.clone());

    let admin_routes = Router::new()
        .route("/admin/alerts/clear", post(clear_all_alerts))
        .with_state(handlers);

    Router::new().merge(public_routes).merge(protected_routes).merge(admin_routes)
}
