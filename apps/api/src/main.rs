use std::net::SocketAddr;
use std::sync::Arc;

use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{self, TraceLayer};
use tracing::{info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use appointment_cell::{HybridScheduler, InMemoryAppointmentStore};
use clock_cell::SystemClock;
use monitoring_cell::{AlertManagerService, HealthMonitorService, MetricsCollectorService, MonitoringHandlers};
use notification_dispatch_cell::{
    LoggingNotificationDispatcher, NotificationDispatchService, WebhookNotificationDispatcher,
};
use queue_engine_cell::QueueEngine;
use service_time_store_cell::InMemoryServiceTimeStore;
use shared_config::AppConfig;
use subscription_hub_cell::SubscriptionHub;
use ticket_store_cell::{InMemoryTicketStore, TicketStore};
use ws_gateway_cell::GatewayState;

#[tokio::main]
async fn main() {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("starting queue platform api");

    let config = Arc::new(AppConfig::from_env());

    let clock: Arc<dyn clock_cell::Clock> = Arc::new(SystemClock);
    let tickets = Arc::new(InMemoryTicketStore::new());
    let samples = Arc::new(InMemoryServiceTimeStore::new());
    let appointments = Arc::new(InMemoryAppointmentStore::new());
    let hub = Arc::new(SubscriptionHub::new(config.subscriber_backpressure_depth));

    let engine = Arc::new(QueueEngine::new(
        tickets.clone(),
        samples.clone(),
        hub.clone(),
        clock.clone(),
        config.clone(),
    ));
    let scheduler = Arc::new(HybridScheduler::new(appointments.clone(), tickets.clone()));

    let dispatcher: Arc<dyn notification_dispatch_cell::NotificationDispatcher> =
        if config.notification_webhook_url.is_empty() {
            warn!("QUEUE_NOTIFICATION_WEBHOOK_URL not set, notifications will only be logged");
            Arc::new(LoggingNotificationDispatcher)
        } else {
            Arc::new(WebhookNotificationDispatcher::new(config.notification_webhook_url.clone()))
        };
    let notifications = Arc::new(NotificationDispatchService::new(dispatcher, clock.clone(), &config));

    let metrics_service = Arc::new(MetricsCollectorService::new());
    let alert_service = Arc::new(AlertManagerService::new());
    let health_service = Arc::new(HealthMonitorService::new(
        tickets.clone(),
        hub.clone(),
        clock.clone(),
        metrics_service.clone(),
        alert_service.clone(),
    ));
    let monitoring_handlers = Arc::new(MonitoringHandlers::new(
        config.clone(),
        health_service,
        metrics_service,
        alert_service,
    ));

    let gateway_state = Arc::new(GatewayState {
        engine: engine.clone(),
        hub: hub.clone(),
        config: config.clone(),
        notifications: notifications.clone(),
        scheduler: scheduler.clone(),
        appointments: appointments.clone(),
    });

    spawn_sweep_tasks(engine.clone(), tickets.clone(), config.clone());

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let app = router::create_router(gateway_state, monitoring_handlers)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], 3000));
    info!("listening on {}", addr);

    let listener = TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

/// Periodic maintenance the queue engine can't trigger on its own: each open
/// queue gets its stale `called` tickets skipped and its wait estimates
/// recomputed from recent service history on its own cadence, mirroring the
/// worker loop shape the rest of this workspace uses for background sweeps.
fn spawn_sweep_tasks(engine: Arc<QueueEngine>, tickets: Arc<InMemoryTicketStore>, config: Arc<AppConfig>) {
    let cleanup_engine = engine.clone();
    let cleanup_tickets = tickets.clone();
    let cleanup_interval = config.cleanup_stale_called_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(cleanup_interval);
        loop {
            ticker.tick().await;
            for queue in cleanup_tickets.list_open_queues().await {
                if let Err(err) = cleanup_engine.cleanup_stale_called(queue.shop_id, queue.id).await {
                    warn!(queue_id = %queue.id, error = %err, "stale-called cleanup sweep failed");
                }
            }
        }
    });

    let recompute_engine = engine.clone();
    let recompute_tickets = tickets.clone();
    let recompute_interval = config.recompute_estimates_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(recompute_interval);
        loop {
            ticker.tick().await;
            for queue in recompute_tickets.list_open_queues().await {
                if let Err(err) = recompute_engine.recompute_estimates(queue.shop_id, queue.id).await {
                    warn!(queue_id = %queue.id, error = %err, "wait estimate recompute sweep failed");
                }
            }
        }
    });
}
