use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    pub component: String,
    pub status: HealthStatus,
    pub response_time_ms: u64,
    pub last_checked: chrono::DateTime<chrono::Utc>,
    pub error_message: Option<String>,
    pub details: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemHealth {
    pub overall_status: HealthStatus,
    pub system_uptime_seconds: u64,
    pub components: Vec<HealthCheck>,
    pub performance_metrics: PerformanceMetrics,
    pub queue_metrics: QueueMetrics,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub requests_per_second: f64,
    pub average_response_time_ms: f64,
    pub p95_response_time_ms: f64,
    pub error_rate_percentage: f64,
}

/// Queue-domain business metrics (spec §4 observability), replacing the
/// clinic-specific figures a patient-booking dashboard would show.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueMetrics {
    pub open_queues: u64,
    pub waiting_tickets_total: u64,
    pub serving_tickets_total: u64,
    pub avg_wait_estimate_minutes: f64,
    pub tickets_served_today: u64,
    pub subscriber_sessions_active: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub requests_per_second: f64,
    pub average_response_time_ms: f64,
    pub p95_response_time_ms: f64,
    pub error_rate_percentage: f64,
    pub total_requests: u64,
    pub total_errors: u64,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub alert_id: String,
    pub severity: AlertSeverity,
    pub title: String,
    pub description: String,
    pub component: String,
    pub metric_value: f64,
    pub threshold: f64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub tags: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
    Emergency,
}

#[derive(Debug, Clone)]
pub struct AlertRule {
    pub name: String,
    pub metric_name: String,
    pub threshold: f64,
    pub comparison: AlertComparison,
    pub severity: AlertSeverity,
    pub duration_minutes: u64,
}

#[derive(Debug, Clone)]
pub enum AlertComparison {
    GreaterThan,
    LessThan,
    Equals,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthCheckRequest {
    pub include_details: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: HealthStatus,
    pub uptime_seconds: u64,
    pub healthy_components: u32,
    pub degraded_components: u32,
    pub unhealthy_components: u32,
    pub last_check: chrono::DateTime<chrono::Utc>,
    pub details: Option<SystemHealth>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MetricsRequest {
    pub time_range_hours: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub current_metrics: PerformanceMetrics,
    pub queue_metrics: QueueMetrics,
    pub alerts: Vec<Alert>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum MonitoringError {
    #[error("component health check failed: {0}")]
    HealthCheckFailed(String),
    #[error("metrics collection error: {0}")]
    MetricsError(String),
    #[error("alert system error: {0}")]
    AlertError(String),
    #[error("service unavailable")]
    ServiceUnavailable,
}
