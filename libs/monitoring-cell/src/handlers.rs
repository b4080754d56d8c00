use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::models::{
    Alert, HealthCheckRequest, HealthCheckResponse, HealthStatus, MetricsRequest, MetricsResponse,
    MonitoringError,
};
use crate::services::{AlertManagerService, HealthMonitorService, MetricsCollectorService};
use shared_config::AppConfig;
use shared_models::auth::UserRole;
use shared_utils::jwt::validate_token;

pub struct MonitoringHandlers {
    health_service: Arc<HealthMonitorService>,
    metrics_service: Arc<MetricsCollectorService>,
    alert_service: Arc<AlertManagerService>,
    config: Arc<AppConfig>,
}

impl MonitoringHandlers {
    pub fn new(
        config: Arc<AppConfig>,
        health_service: Arc<HealthMonitorService>,
        metrics_service: Arc<MetricsCollectorService>,
        alert_service: Arc<AlertManagerService>,
    ) -> Self {
        Self {
            health_service,
            metrics_service,
            alert_service,
            config,
        }
    }

    pub fn get_metrics_service(&self) -> Arc<MetricsCollectorService> {
        self.metrics_service.clone()
    }

    fn authenticated(&self, headers: &HeaderMap) -> Result<shared_models::auth::User, MonitoringError> {
        let token = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|auth| auth.strip_prefix("Bearer "))
            .ok_or(MonitoringError::ServiceUnavailable)?;

        validate_token(token, &self.config.jwt_secret).map_err(|_| MonitoringError::ServiceUnavailable)
    }
}

#[instrument(skip(handlers))]
pub async fn get_health_status(
    State(handlers): State<Arc<MonitoringHandlers>>,
    Query(request): Query<HealthCheckRequest>,
) -> Result<Json<HealthCheckResponse>, MonitoringError> {
    let health = handlers.health_service.perform_comprehensive_health_check().await?;

    let healthy_count = health.components.iter().filter(|c| c.status == HealthStatus::Healthy).count() as u32;
    let degraded_count = health.components.iter().filter(|c| c.status == HealthStatus::Degraded).count() as u32;
    let unhealthy_count = health
        .components
        .iter()
        .filter(|c| matches!(c.status, HealthStatus::Unhealthy | HealthStatus::Critical))
        .count() as u32;

    let response = HealthCheckResponse {
        status: health.overall_status.clone(),
        uptime_seconds: health.system_uptime_seconds,
        healthy_components: healthy_count,
        degraded_components: degraded_count,
        unhealthy_components: unhealthy_count,
        last_check: health.timestamp,
        details: if request.include_details.unwrap_or(false) { Some(health) } else { None },
    };

    Ok(Json(response))
}

#[instrument(skip(handlers))]
pub async fn get_current_metrics(
    State(handlers): State<Arc<MonitoringHandlers>>,
    Query(_request): Query<MetricsRequest>,
) -> Result<Json<MetricsResponse>, MonitoringError> {
    let health = handlers.health_service.perform_comprehensive_health_check().await?;
    let alerts = handlers.alert_service.get_active_alerts().await;

    Ok(Json(MetricsResponse {
        current_metrics: health.performance_metrics,
        queue_metrics: health.queue_metrics,
        alerts,
        timestamp: health.timestamp,
    }))
}

#[instrument(skip(handlers))]
pub async fn get_active_alerts(
    State(handlers): State<Arc<MonitoringHandlers>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Alert>>, MonitoringError> {
    handlers.authenticated(&headers)?;
    Ok(Json(handlers.alert_service.get_active_alerts().await))
}

#[instrument(skip(handlers))]
pub async fn acknowledge_alert(
    State(handlers): State<Arc<MonitoringHandlers>>,
    headers: HeaderMap,
    Query(params): Query<std::collections::HashMap<String, String>>,
) -> Result<StatusCode, MonitoringError> {
    let user = handlers.authenticated(&headers)?;
    let alert_id = params
        .get("alert_id")
        .ok_or_else(|| MonitoringError::AlertError("alert_id required".to_string()))?;

    let acknowledged = handlers.alert_service.acknowledge_alert(alert_id).await;
    if acknowledged {
        info!(user_id = %user.id, %alert_id, "alert acknowledged");
        Ok(StatusCode::OK)
    } else {
        Ok(StatusCode::NOT_FOUND)
    }
}

#[instrument(skip(handlers))]
pub async fn clear_all_alerts(
    State(handlers): State<Arc<MonitoringHandlers>>,
    headers: HeaderMap,
) -> Result<StatusCode, MonitoringError> {
    let user = handlers.authenticated(&headers)?;
    if user.role != UserRole::Admin {
        return Err(MonitoringError::ServiceUnavailable);
    }

    handlers.alert_service.clear_all_alerts().await;
    info!(user_id = %user.id, "admin cleared all alerts");
    Ok(StatusCode::OK)
}

#[instrument(skip(handlers))]
pub async fn get_alert_summary(
    State(handlers): State<Arc<MonitoringHandlers>>,
) -> Result<Json<std::collections::HashMap<String, u32>>, MonitoringError> {
    Ok(Json(handlers.alert_service.get_alert_summary().await))
}

impl IntoResponse for MonitoringError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            MonitoringError::HealthCheckFailed(_) => (StatusCode::SERVICE_UNAVAILABLE, "health check failed"),
            MonitoringError::MetricsError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "metrics collection error"),
            MonitoringError::AlertError(_) => (StatusCode::BAD_REQUEST, "alert system error"),
            MonitoringError::ServiceUnavailable => (StatusCode::SERVICE_UNAVAILABLE, "service unavailable"),
        };

        (
            status,
            Json(serde_json::json!({
                "error": message,
                "timestamp": chrono::Utc::now()
            })),
        )
            .into_response()
    }
}
