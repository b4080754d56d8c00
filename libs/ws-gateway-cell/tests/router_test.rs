use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use tower::ServiceExt;

use clock_cell::SystemClock;
use queue_engine_cell::QueueEngine;
use service_time_store_cell::InMemoryServiceTimeStore;
use shared_config::AppConfig;
use subscription_hub_cell::SubscriptionHub;
use ticket_store_cell::InMemoryTicketStore;
use ws_gateway_cell::{create_gateway_router, GatewayState};

fn build_state() -> Arc<GatewayState> {
    let tickets = Arc::new(InMemoryTicketStore::new());
    let samples = Arc::new(InMemoryServiceTimeStore::new());
    let hub = Arc::new(SubscriptionHub::default());
    let clock = Arc::new(SystemClock);
    let config = Arc::new(AppConfig::default());
    let engine = Arc::new(QueueEngine::new(tickets, samples, hub.clone(), clock, config.clone()));
    Arc::new(GatewayState { engine, hub, config })
}

#[tokio::test]
async fn plain_http_request_to_ws_route_is_rejected() {
    let app = create_gateway_router(build_state());

    let request = Request::builder().method("GET").uri("/ws?token=bad").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();

    // No `Upgrade` header present, so axum refuses the upgrade before the
    // handler ever runs.
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
