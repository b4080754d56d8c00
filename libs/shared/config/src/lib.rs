use std::env;
use std::time::Duration;
use tracing::warn;

/// Immutable configuration for the queue platform, populated once at
/// process start. No component mutates this after construction —
/// thresholds the source system treated as adjustable runtime knobs are
/// injected here instead.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Grace window before `now` during which a scheduled appointment still
    /// counts as "due" for `next_to_serve`.
    pub next_to_serve_grace_minutes: i64,
    /// Lookahead window after `now` during which a scheduled appointment
    /// counts as "due" for `next_to_serve`.
    pub next_to_serve_lookahead_minutes: i64,
    /// Window before/after `scheduled_start` that counts as "on time" for
    /// appointment arrival handling.
    pub arrival_grace_minutes: i64,
    /// How long a ticket may sit in `called` before `cleanup_stale_called`
    /// transitions it to `skipped`.
    pub stale_called_timeout_minutes: i64,
    /// Interval between `recompute_estimates` sweeps of each open queue.
    pub recompute_estimates_interval: Duration,
    /// Interval between `cleanup_stale_called` sweeps.
    pub cleanup_stale_called_interval: Duration,
    /// Per-session outbound event queue depth before `resync_required`
    /// is emitted and the session's queue is cleared.
    pub subscriber_backpressure_depth: usize,
    /// Ping cadence for WebSocket connections.
    pub ws_ping_interval: Duration,
    /// Disconnect a WebSocket connection if no pong is seen within this
    /// window of the last ping.
    pub ws_pong_timeout: Duration,
    /// Shared secret used to validate bearer tokens presented on WS connect
    /// and on the minimal REST surface.
    pub jwt_secret: String,
    /// Base URL the notification dispatcher posts outbound notifications
    /// to. Empty disables dispatch (logged, not sent).
    pub notification_webhook_url: String,
    /// Delivery attempts (including the first) before a notification is
    /// given up on and marked `failed`.
    pub notification_max_attempts: u32,
    /// Base delay for the dispatcher's exponential backoff between retries;
    /// attempt `n` waits `base * 2^(n-1)`.
    pub notification_retry_base_delay: Duration,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            next_to_serve_grace_minutes: env_i64("QUEUE_NEXT_TO_SERVE_GRACE_MINUTES", 5),
            next_to_serve_lookahead_minutes: env_i64("QUEUE_NEXT_TO_SERVE_LOOKAHEAD_MINUTES", 15),
            arrival_grace_minutes: env_i64("QUEUE_ARRIVAL_GRACE_MINUTES", 30),
            stale_called_timeout_minutes: env_i64("QUEUE_STALE_CALLED_TIMEOUT_MINUTES", 15),
            recompute_estimates_interval: env_duration_secs("QUEUE_RECOMPUTE_ESTIMATES_SECONDS", 30),
            cleanup_stale_called_interval: env_duration_secs("QUEUE_CLEANUP_STALE_CALLED_SECONDS", 60),
            subscriber_backpressure_depth: env_usize("QUEUE_SUBSCRIBER_BACKPRESSURE_DEPTH", 256),
            ws_ping_interval: env_duration_secs("QUEUE_WS_PING_INTERVAL_SECONDS", 20),
            ws_pong_timeout: env_duration_secs("QUEUE_WS_PONG_TIMEOUT_SECONDS", 30),
            jwt_secret: env::var("QUEUE_JWT_SECRET").unwrap_or_else(|_| {
                warn!("QUEUE_JWT_SECRET not set, using empty value");
                String::new()
            }),
            notification_webhook_url: env::var("QUEUE_NOTIFICATION_WEBHOOK_URL")
                .unwrap_or_default(),
            notification_max_attempts: env_u32("QUEUE_NOTIFICATION_MAX_ATTEMPTS", 5),
            notification_retry_base_delay: env_duration_millis("QUEUE_NOTIFICATION_RETRY_BASE_DELAY_MS", 500),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.jwt_secret.is_empty()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            next_to_serve_grace_minutes: 5,
            next_to_serve_lookahead_minutes: 15,
            arrival_grace_minutes: 30,
            stale_called_timeout_minutes: 15,
            recompute_estimates_interval: Duration::from_secs(30),
            cleanup_stale_called_interval: Duration::from_secs(60),
            subscriber_backpressure_depth: 256,
            ws_ping_interval: Duration::from_secs(20),
            ws_pong_timeout: Duration::from_secs(30),
            jwt_secret: "test-secret".to_string(),
            notification_webhook_url: String::new(),
            notification_max_attempts: 5,
            notification_retry_base_delay: Duration::from_millis(500),
        }
    }
}

fn env_i64(key: &str, default: i64) -> i64 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_duration_secs(key: &str, default_secs: u64) -> Duration {
    let secs = env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default_secs);
    Duration::from_secs(secs)
}

fn env_duration_millis(key: &str, default_millis: u64) -> Duration {
    let millis = env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default_millis);
    Duration::from_millis(millis)
}
