use std::sync::Arc;

use ticket_store_cell::TicketStore;
use tracing::{info, warn};

use crate::engine::QueueEngine;

/// Spawns the two periodic sweeps spec §5 requires of every open queue:
/// `cleanup_stale_called` (tickets stuck in `called` past the timeout are
/// skipped) and `recompute_estimates` (wait estimates are refreshed even
/// when no mutation triggered one). Mirrors the interval-loop shape the
/// teacher's worker used for its own background sweep, generalized from a
/// single global loop to one pass per open queue.
pub fn spawn_periodic_tasks(
    engine: QueueEngine,
    tickets: Arc<dyn TicketStore>,
    cleanup_interval: std::time::Duration,
    recompute_interval: std::time::Duration,
) {
    {
        let engine = engine.clone();
        let tickets = tickets.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cleanup_interval);
            loop {
                ticker.tick().await;
                for queue in tickets.list_open_queues().await {
                    match engine.cleanup_stale_called(queue.shop_id, queue.id).await {
                        Ok(skipped) if !skipped.is_empty() => {
                            info!(queue_id = %queue.id, count = skipped.len(), "stale called tickets skipped");
                        }
                        Ok(_) => {}
                        Err(err) => warn!(queue_id = %queue.id, error = %err, "cleanup_stale_called failed"),
                    }
                }
            }
        });
    }

    {
        let tickets = tickets.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(recompute_interval);
            loop {
                ticker.tick().await;
                for queue in tickets.list_open_queues().await {
                    if let Err(err) = engine.recompute_estimates(queue.shop_id, queue.id).await {
                        warn!(queue_id = %queue.id, error = %err, "recompute_estimates failed");
                    }
                }
            }
        });
    }
}
