pub mod health;
pub mod metrics;
pub mod alerts;

pub use health::HealthMonitorService;
pub use metrics::MetricsCollectorService;
pub use alerts::AlertManagerService;