use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use clock_cell::Clock;
use subscription_hub_cell::SubscriptionHub;
use ticket_store_cell::{TicketState, TicketStore};
use tracing::instrument;

use crate::models::{
    HealthCheck, HealthStatus, MonitoringError, PerformanceMetrics, QueueMetrics, SystemHealth,
};
use crate::services::{AlertManagerService, MetricsCollectorService};

/// Aggregates health across the queue engine's own dependencies — no
/// external database or third-party API is on this crate's critical path,
/// unlike the teacher's Supabase/Cloudflare checks (spec §2 ambient stack:
/// this system owns its state in-process or in the store backend it is
/// given).
pub struct HealthMonitorService {
    start_time: Instant,
    tickets: Arc<dyn TicketStore>,
    hub: Arc<SubscriptionHub>,
    clock: Arc<dyn Clock>,
    metrics_collector: Arc<MetricsCollectorService>,
    alert_manager: Arc<AlertManagerService>,
}

impl HealthMonitorService {
    pub fn new(
        tickets: Arc<dyn TicketStore>,
        hub: Arc<SubscriptionHub>,
        clock: Arc<dyn Clock>,
        metrics_collector: Arc<MetricsCollectorService>,
        alert_manager: Arc<AlertManagerService>,
    ) -> Self {
        Self {
            start_time: Instant::now(),
            tickets,
            hub,
            clock,
            metrics_collector,
            alert_manager,
        }
    }

    #[instrument(skip(self))]
    pub async fn perform_comprehensive_health_check(&self) -> Result<SystemHealth, MonitoringError> {
        let mut checks = Vec::new();
        checks.push(self.check_ticket_store_health().await);
        checks.push(self.check_subscription_hub_health().await);
        checks.push(self.check_memory_health());

        let overall_status = self.determine_overall_status(&checks);

        let performance_metrics = self.collect_performance_metrics().await;
        let queue_metrics = self
            .collect_queue_metrics()
            .await
            .map_err(|e| MonitoringError::MetricsError(e.to_string()))?;

        self.alert_manager
            .evaluate_alerts(&self.metrics_collector.get_current_stats().await)
            .await;

        Ok(SystemHealth {
            overall_status,
            system_uptime_seconds: self.start_time.elapsed().as_secs(),
            components: checks,
            performance_metrics,
            queue_metrics,
            timestamp: self.clock.now(),
        })
    }

    async fn check_ticket_store_health(&self) -> HealthCheck {
        let start = Instant::now();
        let open = self.tickets.list_open_queues().await;
        HealthCheck {
            component: "ticket_store".to_string(),
            status: HealthStatus::Healthy,
            response_time_ms: start.elapsed().as_millis() as u64,
            last_checked: self.clock.now(),
            error_message: None,
            details: HashMap::from([(
                "open_queues".to_string(),
                serde_json::Value::Number(open.len().into()),
            )]),
        }
    }

    async fn check_subscription_hub_health(&self) -> HealthCheck {
        let start = Instant::now();
        let sessions = self.hub.session_count().await;
        HealthCheck {
            component: "subscription_hub".to_string(),
            status: HealthStatus::Healthy,
            response_time_ms: start.elapsed().as_millis() as u64,
            last_checked: self.clock.now(),
            error_message: None,
            details: HashMap::from([(
                "active_sessions".to_string(),
                serde_json::Value::Number(sessions.into()),
            )]),
        }
    }

    fn check_memory_health(&self) -> HealthCheck {
        HealthCheck {
            component: "memory".to_string(),
            status: HealthStatus::Healthy,
            response_time_ms: 1,
            last_checked: self.clock.now(),
            error_message: None,
            details: HashMap::new(),
        }
    }

    fn determine_overall_status(&self, checks: &[HealthCheck]) -> HealthStatus {
        let critical_count = checks.iter().filter(|c| c.status == HealthStatus::Critical).count();
        let unhealthy_count = checks.iter().filter(|c| c.status == HealthStatus::Unhealthy).count();
        let degraded_count = checks.iter().filter(|c| c.status == HealthStatus::Degraded).count();

        if critical_count > 0 {
            HealthStatus::Critical
        } else if unhealthy_count > 0 {
            HealthStatus::Unhealthy
        } else if degraded_count > 1 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }

    async fn collect_performance_metrics(&self) -> PerformanceMetrics {
        let stats = self.metrics_collector.get_current_stats().await;
        PerformanceMetrics {
            requests_per_second: stats.requests_per_second,
            average_response_time_ms: stats.average_response_time_ms,
            p95_response_time_ms: stats.p95_response_time_ms,
            error_rate_percentage: stats.error_rate_percentage,
        }
    }

    async fn collect_queue_metrics(&self) -> Result<QueueMetrics> {
        let now = self.clock.now();
        let open_queues = self.tickets.list_open_queues().await;

        let mut waiting_total = 0u64;
        let mut serving_total = 0u64;
        let mut served_today = 0u64;
        let mut estimate_sum = 0.0;
        let mut estimate_count = 0u64;
        let mut seen_shops = std::collections::HashSet::new();
        let since_midnight = now.date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc();

        for queue in &open_queues {
            seen_shops.insert(queue.shop_id);
            let active = self.tickets.list_active(queue.id).await;
            for ticket in &active {
                match ticket.state {
                    TicketState::Waiting => {
                        waiting_total += 1;
                        if let Some(estimate) = ticket.estimated_wait_minutes {
                            estimate_sum += estimate as f64;
                            estimate_count += 1;
                        }
                    }
                    TicketState::Serving | TicketState::Called => serving_total += 1,
                    _ => {}
                }
            }
        }

        for shop_id in &seen_shops {
            served_today += self.tickets.list_recent_completed(*shop_id, since_midnight).await.len() as u64;
        }

        let subscriber_sessions_active = self.hub.session_count().await as u64;

        Ok(QueueMetrics {
            open_queues: open_queues.len() as u64,
            waiting_tickets_total: waiting_total,
            serving_tickets_total: serving_total,
            avg_wait_estimate_minutes: if estimate_count > 0 {
                estimate_sum / estimate_count as f64
            } else {
                0.0
            },
            tickets_served_today: served_today,
            subscriber_sessions_active,
        })
    }
}
