// =====================================================================================
// MONITORING CELL - HEALTH & PERFORMANCE MONITORING
// =====================================================================================
//
// Health checks and metrics for the queue platform's own components
// (ticket store, subscription hub), request performance metrics, and a
// threshold-based alert manager.
//
// =====================================================================================

pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{
    Alert, AlertSeverity, HealthCheck, HealthStatus, MetricsSnapshot, MonitoringError,
    PerformanceMetrics, QueueMetrics, SystemHealth,
};

pub use services::{AlertManagerService, HealthMonitorService, MetricsCollectorService};

pub use handlers::MonitoringHandlers;
pub use router::create_monitoring_router;
