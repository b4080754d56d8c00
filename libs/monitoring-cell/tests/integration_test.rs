use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use tower::ServiceExt;

use clock_cell::SystemClock;
use monitoring_cell::{
    create_monitoring_router, services::{AlertManagerService, HealthMonitorService, MetricsCollectorService},
    MonitoringHandlers,
};
use shared_config::AppConfig;
use subscription_hub_cell::SubscriptionHub;
use ticket_store_cell::InMemoryTicketStore;

fn build_handlers() -> Arc<MonitoringHandlers> {
    let config = Arc::new(AppConfig::default());
    let tickets = Arc::new(InMemoryTicketStore::new());
    let hub = Arc::new(SubscriptionHub::default());
    let clock = Arc::new(SystemClock);
    let metrics = Arc::new(MetricsCollectorService::new());
    let alerts = Arc::new(AlertManagerService::new());
    let health = Arc::new(HealthMonitorService::new(tickets, hub, clock, metrics.clone(), alerts.clone()));
    Arc::new(MonitoringHandlers::new(config, health, metrics, alerts))
}

#[tokio::test]
async fn health_endpoint_reports_status_and_uptime() {
    let app = create_monitoring_router(build_handlers());

    let request = Request::builder().method("GET").uri("/health").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(json.get("status").is_some());
    assert!(json.get("uptime_seconds").is_some());
}

#[tokio::test]
async fn health_endpoint_includes_details_when_requested() {
    let app = create_monitoring_router(build_handlers());

    let request = Request::builder()
        .method("GET")
        .uri("/health?include_details=true")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let details = json["details"].as_object().unwrap();
    assert!(details.get("components").is_some());
    assert!(details.get("queue_metrics").is_some());
}

#[tokio::test]
async fn metrics_endpoint_reports_queue_metrics() {
    let app = create_monitoring_router(build_handlers());

    let request = Request::builder().method("GET").uri("/metrics").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(json.get("queue_metrics").is_some());
    assert!(json["queue_metrics"].get("open_queues").is_some());
}

#[tokio::test]
async fn alerts_endpoint_requires_authentication() {
    let app = create_monitoring_router(build_handlers());

    let request = Request::builder().method("GET").uri("/alerts").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}
