use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{instrument, warn};
use uuid::Uuid;

use clock_cell::Clock;
use service_time_store_cell::{ServiceTimeSample, ServiceTimeStore};
use shared_config::AppConfig;
use subscription_hub_cell::{BroadcastEvent, EventAction, EventType, SubscriptionHub};
use ticket_store_cell::{Queue, QueueStatus, Ticket, TicketState, TicketStore};
use wait_predictor_cell::{predict, PredictionRequest, RemainingService};

use crate::error::QueueEngineError;
use crate::models::{JoinRequest, QueueSnapshot};

const MAILBOX_DEPTH: usize = 256;
/// Fallback duration used when no history exists yet for the specialist
/// currently serving position 1's predecessor (spec §4.3 edge case).
const DEFAULT_SERVICE_MINUTES: f64 = 15.0;

type Reply<T> = oneshot::Sender<Result<T, QueueEngineError>>;

enum ShopCommand {
    Join { req: JoinRequest, reply: Reply<Ticket> },
    CallNext { queue_id: Uuid, specialist_id: Option<Uuid>, reply: Reply<Ticket> },
    MarkServing { ticket_id: Uuid, specialist_id: Option<Uuid>, reply: Reply<Ticket> },
    MarkServed { ticket_id: Uuid, reply: Reply<Ticket> },
    Skip { ticket_id: Uuid, reason: Option<String>, reply: Reply<Ticket> },
    Cancel { ticket_id: Uuid, reply: Reply<Ticket> },
    Reorder { ticket_id: Uuid, new_position: u32, reply: Reply<Ticket> },
    CleanupStaleCalled { queue_id: Uuid, reply: Reply<Vec<Ticket>> },
    RecomputeEstimates { queue_id: Uuid, reply: Reply<usize> },
}

/// Handle to one shop's actor mailbox. Cloning is cheap; every clone
/// forwards to the same single-writer task (spec §5 "dedicated actor/worker
/// that owns the queue state").
#[derive(Clone)]
struct ShopActorHandle {
    sender: mpsc::Sender<ShopCommand>,
}

/// Sole mutator of queue and ticket state for one shop (spec §4.1). Owns
/// nothing directly — all durable state lives in the injected stores — but
/// serializes every mutation through its mailbox loop, and the `halted`
/// flag makes a detected invariant violation refuse further mutations
/// until an operator clears it (spec §7 "Fatal").
struct ShopActor {
    shop_id: Uuid,
    tickets: Arc<dyn TicketStore>,
    samples: Arc<dyn ServiceTimeStore>,
    hub: Arc<SubscriptionHub>,
    clock: Arc<dyn Clock>,
    config: Arc<AppConfig>,
    halted: bool,
}

impl ShopActor {
    fn spawn(
        shop_id: Uuid,
        tickets: Arc<dyn TicketStore>,
        samples: Arc<dyn ServiceTimeStore>,
        hub: Arc<SubscriptionHub>,
        clock: Arc<dyn Clock>,
        config: Arc<AppConfig>,
    ) -> ShopActorHandle {
        let (sender, receiver) = mpsc::channel(MAILBOX_DEPTH);
        let actor = ShopActor {
            shop_id,
            tickets,
            samples,
            hub,
            clock,
            config,
            halted: false,
        };
        tokio::spawn(actor.run(receiver));
        ShopActorHandle { sender }
    }

    async fn run(mut self, mut receiver: mpsc::Receiver<ShopCommand>) {
        while let Some(command) = receiver.recv().await {
            if self.halted {
                match command {
                    ShopCommand::Join { reply, .. } => { let _ = reply.send(Err(QueueEngineError::ShopHalted(self.shop_id))); }
                    ShopCommand::CallNext { reply, .. } => { let _ = reply.send(Err(QueueEngineError::ShopHalted(self.shop_id))); }
                    ShopCommand::MarkServing { reply, .. } => { let _ = reply.send(Err(QueueEngineError::ShopHalted(self.shop_id))); }
                    ShopCommand::MarkServed { reply, .. } => { let _ = reply.send(Err(QueueEngineError::ShopHalted(self.shop_id))); }
                    ShopCommand::Skip { reply, .. } => { let _ = reply.send(Err(QueueEngineError::ShopHalted(self.shop_id))); }
                    ShopCommand::Cancel { reply, .. } => { let _ = reply.send(Err(QueueEngineError::ShopHalted(self.shop_id))); }
                    ShopCommand::Reorder { reply, .. } => { let _ = reply.send(Err(QueueEngineError::ShopHalted(self.shop_id))); }
                    ShopCommand::CleanupStaleCalled { reply, .. } => { let _ = reply.send(Err(QueueEngineError::ShopHalted(self.shop_id))); }
                    ShopCommand::RecomputeEstimates { reply, .. } => { let _ = reply.send(Err(QueueEngineError::ShopHalted(self.shop_id))); }
                }
                continue;
            }

            match command {
                ShopCommand::Join { req, reply } => {
                    let queue_id = req.queue_id;
                    let result = self.join(req).await;
                    self.check_invariants_after(queue_id, &result).await;
                    let _ = reply.send(result);
                }
                ShopCommand::CallNext { queue_id, specialist_id, reply } => {
                    let result = self.call_next(queue_id, specialist_id).await;
                    self.check_invariants_after(queue_id, &result).await;
                    let _ = reply.send(result);
                }
                ShopCommand::MarkServing { ticket_id, specialist_id, reply } => {
                    let result = self.mark_serving(ticket_id, specialist_id).await;
                    if let Ok(ticket) = &result {
                        self.check_invariants_after(ticket.queue_id, &result).await;
                    }
                    let _ = reply.send(result);
                }
                ShopCommand::MarkServed { ticket_id, reply } => {
                    let result = self.mark_served(ticket_id).await;
                    if let Ok(ticket) = &result {
                        self.check_invariants_after(ticket.queue_id, &result).await;
                    }
                    let _ = reply.send(result);
                }
                ShopCommand::Skip { ticket_id, reason, reply } => {
                    let result = self.skip(ticket_id, reason).await;
                    if let Ok(ticket) = &result {
                        self.check_invariants_after(ticket.queue_id, &result).await;
                    }
                    let _ = reply.send(result);
                }
                ShopCommand::Cancel { ticket_id, reply } => {
                    let result = self.cancel(ticket_id).await;
                    if let Ok(ticket) = &result {
                        self.check_invariants_after(ticket.queue_id, &result).await;
                    }
                    let _ = reply.send(result);
                }
                ShopCommand::Reorder { ticket_id, new_position, reply } => {
                    let result = self.reorder(ticket_id, new_position).await;
                    if let Ok(ticket) = &result {
                        self.check_invariants_after(ticket.queue_id, &result).await;
                    }
                    let _ = reply.send(result);
                }
                ShopCommand::CleanupStaleCalled { queue_id, reply } => {
                    let result = self.cleanup_stale_called(queue_id).await;
                    let _ = reply.send(Ok(result));
                }
                ShopCommand::RecomputeEstimates { queue_id, reply } => {
                    let count = self.recompute_queue_estimates(queue_id).await;
                    let _ = reply.send(Ok(count));
                }
            }
        }
    }

    /// Re-checks spec §3 invariants 1 and 2 after a successful mutation and
    /// halts the shop if either is broken (spec §7 "Fatal": "refuse further
    /// mutations on that shop until operator intervention"). A failed
    /// mutation (`result` is `Err`) never reached a state change, so it is
    /// never checked.
    async fn check_invariants_after<T>(&mut self, queue_id: Uuid, result: &Result<T, QueueEngineError>) {
        if result.is_err() || self.halted {
            return;
        }
        if let Some(violation) = self.find_invariant_violation(queue_id).await {
            tracing::error!(shop_id = %self.shop_id, %queue_id, %violation, "invariant violation detected, halting shop");
            self.halted = true;
        }
    }

    /// Returns a description of the first broken invariant found, if any:
    /// waiting positions must be the dense sequence 1..N (spec §3 invariant
    /// 1), and no specialist may have more than one ticket `serving` at
    /// once (spec §3 invariant 2).
    async fn find_invariant_violation(&self, queue_id: Uuid) -> Option<String> {
        let mut waiting = self.tickets.list_waiting(queue_id).await;
        waiting.sort_by_key(|t| t.position);
        for (index, ticket) in waiting.iter().enumerate() {
            let expected = (index + 1) as u32;
            if ticket.position != expected {
                return Some(format!(
                    "waiting positions not dense: ticket {} has position {} at index {}",
                    ticket.id, ticket.position, index
                ));
            }
        }

        let active = self.tickets.list_active(queue_id).await;
        let mut serving_specialists = std::collections::HashSet::new();
        for ticket in active.iter().filter(|t| t.state == TicketState::Serving) {
            if let Some(specialist) = ticket.specialist_id {
                if !serving_specialists.insert(specialist) {
                    return Some(format!("specialist {specialist} has more than one ticket serving"));
                }
            }
        }

        None
    }

    async fn queue_or_err(&self, queue_id: Uuid) -> Result<Queue, QueueEngineError> {
        self.tickets
            .get_queue(queue_id)
            .await
            .ok_or(QueueEngineError::QueueNotFound(queue_id))
    }

    async fn ticket_or_err(&self, ticket_id: Uuid) -> Result<Ticket, QueueEngineError> {
        self.tickets
            .get_by_id(ticket_id)
            .await
            .ok_or(QueueEngineError::TicketNotFound(ticket_id))
    }

    #[instrument(skip(self))]
    async fn join(&self, req: JoinRequest) -> Result<Ticket, QueueEngineError> {
        let queue = self.queue_or_err(req.queue_id).await?;
        if queue.status != QueueStatus::Open {
            return Err(QueueEngineError::QueueClosed);
        }

        if self
            .tickets
            .active_ticket_for_customer(req.queue_id, req.customer_id)
            .await
            .is_some()
        {
            return Err(QueueEngineError::DuplicateCustomer);
        }

        let mut waiting = self.tickets.list_waiting(req.queue_id).await;
        let queued_count = self
            .tickets
            .list_active(req.queue_id)
            .await
            .into_iter()
            .filter(|t| matches!(t.state, TicketState::Waiting | TicketState::Called))
            .count();
        if queue.max_capacity > 0 && queued_count >= queue.max_capacity as usize {
            return Err(QueueEngineError::AtCapacity);
        }

        let n = waiting.len() as u32;
        let position = if req.appointment_id.is_some() {
            let target = (n / 3 + if n % 3 != 0 { 1 } else { 0 }).max(2);
            target.min(n + 1)
        } else {
            n + 1
        };

        // Shift positions >= target up by one (dense 1..N+1 invariant).
        waiting.sort_by_key(|t| t.position);
        for ticket in waiting.iter().filter(|t| t.position >= position) {
            let mut shifted = ticket.clone();
            let version = shifted.version;
            shifted.position += 1;
            self.tickets.update_state(shifted, version).await?;
        }

        let specialist_id = self.auto_assign_specialist(&req.eligible_specialist_ids).await;

        let now = self.clock.now();
        let number = self.tickets.next_ticket_number(self.shop_id, now.date_naive()).await;
        let ticket = Ticket::new(
            self.shop_id,
            req.queue_id,
            req.customer_id,
            req.service_id,
            req.appointment_id,
            number,
            position,
            req.priority,
            now,
        );
        let mut ticket = ticket;
        ticket.specialist_id = specialist_id;

        self.tickets.insert(ticket.clone()).await?;
        self.recompute_queue_estimates(req.queue_id).await;

        self.publish(
            EventType::QueueUpdate,
            EventAction::Join,
            json!({
                "ticket_id": ticket.id,
                "number": ticket.number,
                "position": ticket.position,
            }),
            req.queue_id,
        )
        .await;

        Ok(ticket)
    }

    async fn auto_assign_specialist(&self, eligible: &[Uuid]) -> Option<Uuid> {
        if eligible.is_empty() {
            return None;
        }
        let mut best: Option<(Uuid, usize)> = None;
        for &candidate in eligible {
            let load = self.tickets.specialist_active_ticket_count(self.shop_id, candidate).await;
            if best.map(|(_, b)| load < b).unwrap_or(true) {
                best = Some((candidate, load));
            }
        }
        best.map(|(id, _)| id)
    }

    #[instrument(skip(self))]
    async fn call_next(&self, queue_id: Uuid, specialist_id: Option<Uuid>) -> Result<Ticket, QueueEngineError> {
        self.queue_or_err(queue_id).await?;
        let mut waiting = self.tickets.list_waiting(queue_id).await;
        // Effective priority: priority desc, position asc (spec §4.1 call_next).
        waiting.sort_by_key(|t| (std::cmp::Reverse(t.priority), t.position));

        let chosen = match specialist_id {
            Some(target) => waiting
                .iter()
                .find(|t| t.specialist_id == Some(target))
                .or_else(|| waiting.iter().find(|t| t.specialist_id.is_none()))
                .cloned(),
            None => waiting.into_iter().next(),
        };

        let mut ticket = chosen.ok_or(QueueEngineError::QueueEmpty)?;
        let version = ticket.version;
        let at_position = ticket.position;

        ticket.state = TicketState::Called;
        ticket.called_at = Some(self.clock.now());
        if ticket.specialist_id.is_none() {
            ticket.specialist_id = specialist_id;
        }
        self.tickets.update_state(ticket.clone(), version).await?;
        self.shift_down_after(queue_id, at_position).await?;
        self.recompute_queue_estimates(queue_id).await;

        self.publish(
            EventType::TicketUpdate,
            EventAction::Call,
            json!({"ticket_id": ticket.id, "number": ticket.number, "specialist_id": ticket.specialist_id}),
            queue_id,
        )
        .await;

        Ok(ticket)
    }

    #[instrument(skip(self))]
    async fn mark_serving(&self, ticket_id: Uuid, specialist_id: Option<Uuid>) -> Result<Ticket, QueueEngineError> {
        let mut ticket = self.ticket_or_err(ticket_id).await?;
        if ticket.state != TicketState::Called {
            return Err(QueueEngineError::IllegalState { ticket_id, state: ticket.state });
        }

        let specialist = specialist_id.or(ticket.specialist_id);
        if let Some(specialist) = specialist {
            if self
                .tickets
                .specialist_serving_ticket(self.shop_id, specialist)
                .await
                .is_some()
            {
                return Err(QueueEngineError::SpecialistBusy(specialist));
            }
        }

        let version = ticket.version;
        let now = self.clock.now();
        ticket.state = TicketState::Serving;
        ticket.serve_started_at = Some(now);
        ticket.actual_wait_minutes = Some((now - ticket.joined_at).num_minutes());
        if ticket.specialist_id.is_none() {
            ticket.specialist_id = specialist;
        }
        self.tickets.update_state(ticket.clone(), version).await?;

        self.publish(
            EventType::TicketUpdate,
            EventAction::Serve,
            json!({"ticket_id": ticket.id, "number": ticket.number, "actual_wait_minutes": ticket.actual_wait_minutes}),
            ticket.queue_id,
        )
        .await;

        Ok(ticket)
    }

    #[instrument(skip(self))]
    async fn mark_served(&self, ticket_id: Uuid) -> Result<Ticket, QueueEngineError> {
        let mut ticket = self.ticket_or_err(ticket_id).await?;
        if ticket.state != TicketState::Serving {
            return Err(QueueEngineError::IllegalState { ticket_id, state: ticket.state });
        }

        let version = ticket.version;
        let now = self.clock.now();
        let serve_started_at = ticket.serve_started_at.expect("serving ticket has serve_started_at");
        ticket.state = TicketState::Served;
        ticket.completed_at = Some(now);
        self.tickets.update_state(ticket.clone(), version).await?;

        let duration = (now - serve_started_at).num_minutes() as f64;
        let sample = ServiceTimeSample::new(self.shop_id, ticket.service_id, ticket.specialist_id, duration, now);
        if sample.is_valid() {
            if let Err(err) = self.samples.insert(sample).await {
                warn!(ticket_id = %ticket_id, error = %err, "service time sample dropped");
            }
        }

        self.recompute_queue_estimates(ticket.queue_id).await;

        self.publish(
            EventType::TicketUpdate,
            EventAction::Complete,
            json!({"ticket_id": ticket.id, "number": ticket.number}),
            ticket.queue_id,
        )
        .await;

        Ok(ticket)
    }

    #[instrument(skip(self))]
    async fn skip(&self, ticket_id: Uuid, reason: Option<String>) -> Result<Ticket, QueueEngineError> {
        let mut ticket = self.ticket_or_err(ticket_id).await?;
        if ticket.state != TicketState::Called {
            return Err(QueueEngineError::IllegalState { ticket_id, state: ticket.state });
        }

        let version = ticket.version;
        let at_position = ticket.position;
        ticket.state = TicketState::Skipped;
        if let Some(reason) = reason {
            ticket.notes = reason;
        }
        self.tickets.update_state(ticket.clone(), version).await?;
        self.shift_down_after(ticket.queue_id, at_position).await?;
        self.recompute_queue_estimates(ticket.queue_id).await;

        self.publish(
            EventType::TicketUpdate,
            EventAction::Skip,
            json!({"ticket_id": ticket.id, "number": ticket.number, "notes": ticket.notes}),
            ticket.queue_id,
        )
        .await;
        self.publish(
            EventType::QueueUpdate,
            EventAction::Delete,
            json!({"ticket_id": ticket.id, "position": at_position}),
            ticket.queue_id,
        )
        .await;

        Ok(ticket)
    }

    #[instrument(skip(self))]
    async fn cancel(&self, ticket_id: Uuid) -> Result<Ticket, QueueEngineError> {
        let mut ticket = self.ticket_or_err(ticket_id).await?;
        if !matches!(ticket.state, TicketState::Waiting | TicketState::Called) {
            return Err(QueueEngineError::IllegalState { ticket_id, state: ticket.state });
        }

        let version = ticket.version;
        let at_position = ticket.position;
        ticket.state = TicketState::Cancelled;
        self.tickets.update_state(ticket.clone(), version).await?;
        self.shift_down_after(ticket.queue_id, at_position).await?;
        self.recompute_queue_estimates(ticket.queue_id).await;

        self.publish(
            EventType::TicketUpdate,
            EventAction::Cancel,
            json!({"ticket_id": ticket.id, "number": ticket.number}),
            ticket.queue_id,
        )
        .await;
        self.publish(
            EventType::QueueUpdate,
            EventAction::Delete,
            json!({"ticket_id": ticket.id, "position": at_position}),
            ticket.queue_id,
        )
        .await;

        Ok(ticket)
    }

    #[instrument(skip(self))]
    async fn reorder(&self, ticket_id: Uuid, new_position: u32) -> Result<Ticket, QueueEngineError> {
        let mut ticket = self.ticket_or_err(ticket_id).await?;
        if ticket.state != TicketState::Waiting {
            return Err(QueueEngineError::IllegalState { ticket_id, state: ticket.state });
        }

        let waiting = self.tickets.list_waiting(ticket.queue_id).await;
        let max_position = waiting.len() as u32;
        if new_position < 1 || new_position > max_position {
            return Err(QueueEngineError::InvalidPosition(new_position));
        }

        let old_position = ticket.position;
        if new_position == old_position {
            return Ok(ticket);
        }

        for other in waiting.iter().filter(|t| t.id != ticket_id) {
            let mut shifted = other.clone();
            let shift = if new_position < old_position {
                (shifted.position >= new_position && shifted.position < old_position).then_some(1i64)
            } else {
                (shifted.position > old_position && shifted.position <= new_position).then_some(-1i64)
            };
            if let Some(delta) = shift {
                let version = shifted.version;
                shifted.position = (shifted.position as i64 + delta) as u32;
                self.tickets.update_state(shifted, version).await?;
            }
        }

        let version = ticket.version;
        ticket.position = new_position;
        self.tickets.update_state(ticket.clone(), version).await?;
        self.recompute_queue_estimates(ticket.queue_id).await;

        self.publish(
            EventType::QueueUpdate,
            EventAction::Update,
            json!({"ticket_id": ticket.id, "position": ticket.position}),
            ticket.queue_id,
        )
        .await;

        Ok(ticket)
    }

    /// Decrements positions of every waiting ticket after `at_position` by
    /// one, restoring density once a ticket leaves the waiting set (spec
    /// §8 "cancel/skip of position k decrements positions k+1..N").
    async fn shift_down_after(&self, queue_id: Uuid, at_position: u32) -> Result<(), QueueEngineError> {
        let waiting = self.tickets.list_waiting(queue_id).await;
        for ticket in waiting.into_iter().filter(|t| t.position > at_position) {
            let mut shifted = ticket.clone();
            let version = shifted.version;
            shifted.position -= 1;
            self.tickets.update_state(shifted, version).await?;
        }
        Ok(())
    }

    async fn active_specialist_count(&self, queue_id: Uuid) -> u32 {
        let active = self.tickets.list_active(queue_id).await;
        let mut seen = std::collections::HashSet::new();
        for ticket in active.iter().filter(|t| t.state == TicketState::Serving) {
            if let Some(specialist) = ticket.specialist_id {
                seen.insert(specialist);
            }
        }
        seen.len() as u32
    }

    /// Recomputes `estimated_wait_minutes` for every waiting ticket in a
    /// queue and persists the deltas (spec §4.1 "estimates are recomputed").
    async fn recompute_queue_estimates(&self, queue_id: Uuid) -> usize {
        let now = self.clock.now();
        let mut waiting = self.tickets.list_waiting(queue_id).await;
        waiting.sort_by_key(|t| t.position);

        let samples = self.samples.recent(self.shop_id, now - chrono::Duration::days(30)).await;
        let active_specialists = self.active_specialist_count(queue_id).await;
        let serving = self.tickets.list_active(queue_id).await;
        let currently_serving = serving.iter().find(|t| t.state == TicketState::Serving).cloned();

        let mut updated = 0usize;
        for ticket in waiting {
            let position = ticket.position;
            let remaining = if position == 1 {
                currently_serving.as_ref().map(|serving_ticket| {
                    let expected = self
                        .expected_duration_for(&samples, serving_ticket.service_id, serving_ticket.specialist_id);
                    let elapsed = serving_ticket
                        .serve_started_at
                        .map(|start| (now - start).num_minutes() as f64)
                        .unwrap_or(0.0);
                    RemainingService { expected_duration_minutes: expected, elapsed_minutes: elapsed }
                })
            } else {
                None
            };

            let breakdown = predict(&PredictionRequest {
                position,
                samples: &samples,
                active_specialists,
                now,
                service_id: ticket.service_id,
                specialist_id: ticket.specialist_id,
                serving: remaining,
            });

            if ticket.estimated_wait_minutes != Some(breakdown.estimate_minutes) {
                let mut next = ticket.clone();
                let version = next.version;
                next.estimated_wait_minutes = Some(breakdown.estimate_minutes);
                if self.tickets.update_state(next, version).await.is_ok() {
                    updated += 1;
                }
            }
        }
        updated
    }

    fn expected_duration_for(
        &self,
        samples: &[ServiceTimeSample],
        service_id: Option<Uuid>,
        specialist_id: Option<Uuid>,
    ) -> f64 {
        let matching: Vec<f64> = samples
            .iter()
            .filter(|s| service_id.map(|id| s.service_id == Some(id)).unwrap_or(true))
            .filter(|s| specialist_id.map(|id| s.specialist_id == Some(id)).unwrap_or(true))
            .map(|s| s.duration_minutes)
            .collect();
        if matching.is_empty() {
            DEFAULT_SERVICE_MINUTES
        } else {
            matching.iter().sum::<f64>() / matching.len() as f64
        }
    }

    /// Transitions any ticket stuck in `called` past the configured
    /// timeout to `skipped` (spec §5 `cleanup_stale_called`).
    async fn cleanup_stale_called(&self, queue_id: Uuid) -> Vec<Ticket> {
        let now = self.clock.now();
        let active = self.tickets.list_active(queue_id).await;
        let mut skipped = Vec::new();
        for ticket in active.into_iter().filter(|t| t.state == TicketState::Called) {
            let elapsed = ticket
                .called_at
                .map(|called| now - called)
                .unwrap_or_default();
            if elapsed > chrono::Duration::minutes(self.config.stale_called_timeout_minutes) {
                if let Ok(result) = self.skip(ticket.id, Some("stale in called state".to_string())).await {
                    skipped.push(result);
                }
            }
        }
        skipped
    }

    async fn publish(&self, event_type: EventType, action: EventAction, payload: serde_json::Value, queue_id: Uuid) {
        let event = BroadcastEvent::new(event_type, action, payload, self.clock.now());
        self.hub.publish(&format!("queue:{}", queue_id), event.clone()).await;
        self.hub.publish(&format!("shop_queues:{}", self.shop_id), event).await;
    }
}

/// Public handle to the queue engine. Cloning is cheap (an `Arc` of shared
/// stores plus a registry of shop actor mailboxes) — every clone reaches
/// the same underlying actors.
#[derive(Clone)]
pub struct QueueEngine {
    shops: Arc<RwLock<HashMap<Uuid, ShopActorHandle>>>,
    tickets: Arc<dyn TicketStore>,
    samples: Arc<dyn ServiceTimeStore>,
    hub: Arc<SubscriptionHub>,
    clock: Arc<dyn Clock>,
    config: Arc<AppConfig>,
}

impl QueueEngine {
    pub fn new(
        tickets: Arc<dyn TicketStore>,
        samples: Arc<dyn ServiceTimeStore>,
        hub: Arc<SubscriptionHub>,
        clock: Arc<dyn Clock>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            shops: Arc::new(RwLock::new(HashMap::new())),
            tickets,
            samples,
            hub,
            clock,
            config,
        }
    }

    async fn handle_for(&self, shop_id: Uuid) -> ShopActorHandle {
        if let Some(handle) = self.shops.read().await.get(&shop_id) {
            return handle.clone();
        }
        let mut shops = self.shops.write().await;
        if let Some(handle) = shops.get(&shop_id) {
            return handle.clone();
        }
        let handle = ShopActor::spawn(
            shop_id,
            self.tickets.clone(),
            self.samples.clone(),
            self.hub.clone(),
            self.clock.clone(),
            self.config.clone(),
        );
        shops.insert(shop_id, handle.clone());
        handle
    }

    async fn send<T>(&self, shop_id: Uuid, build: impl FnOnce(Reply<T>) -> ShopCommand) -> Result<T, QueueEngineError> {
        let handle = self.handle_for(shop_id).await;
        let (tx, rx) = oneshot::channel();
        handle
            .sender
            .send(build(tx))
            .await
            .map_err(|_| QueueEngineError::ActorUnavailable)?;
        rx.await.map_err(|_| QueueEngineError::ActorUnavailable)?
    }

    pub async fn join(&self, shop_id: Uuid, req: JoinRequest) -> Result<Ticket, QueueEngineError> {
        self.send(shop_id, |reply| ShopCommand::Join { req, reply }).await
    }

    pub async fn call_next(
        &self,
        shop_id: Uuid,
        queue_id: Uuid,
        specialist_id: Option<Uuid>,
    ) -> Result<Ticket, QueueEngineError> {
        self.send(shop_id, |reply| ShopCommand::CallNext { queue_id, specialist_id, reply }).await
    }

    pub async fn mark_serving(
        &self,
        shop_id: Uuid,
        ticket_id: Uuid,
        specialist_id: Option<Uuid>,
    ) -> Result<Ticket, QueueEngineError> {
        self.send(shop_id, |reply| ShopCommand::MarkServing { ticket_id, specialist_id, reply }).await
    }

    pub async fn mark_served(&self, shop_id: Uuid, ticket_id: Uuid) -> Result<Ticket, QueueEngineError> {
        self.send(shop_id, |reply| ShopCommand::MarkServed { ticket_id, reply }).await
    }

    pub async fn skip(&self, shop_id: Uuid, ticket_id: Uuid, reason: Option<String>) -> Result<Ticket, QueueEngineError> {
        self.send(shop_id, |reply| ShopCommand::Skip { ticket_id, reason, reply }).await
    }

    pub async fn cancel(&self, shop_id: Uuid, ticket_id: Uuid) -> Result<Ticket, QueueEngineError> {
        self.send(shop_id, |reply| ShopCommand::Cancel { ticket_id, reply }).await
    }

    pub async fn reorder(&self, shop_id: Uuid, ticket_id: Uuid, new_position: u32) -> Result<Ticket, QueueEngineError> {
        self.send(shop_id, |reply| ShopCommand::Reorder { ticket_id, new_position, reply }).await
    }

    /// Runs `cleanup_stale_called` for one queue through its shop's actor
    /// (spec §5 periodic sweep).
    pub async fn cleanup_stale_called(&self, shop_id: Uuid, queue_id: Uuid) -> Result<Vec<Ticket>, QueueEngineError> {
        self.send(shop_id, |reply| ShopCommand::CleanupStaleCalled { queue_id, reply }).await
    }

    /// Runs `recompute_estimates` for one queue, returning how many tickets'
    /// estimates changed (spec §5 periodic sweep).
    pub async fn recompute_estimates(&self, shop_id: Uuid, queue_id: Uuid) -> Result<usize, QueueEngineError> {
        self.send(shop_id, |reply| ShopCommand::RecomputeEstimates { queue_id, reply }).await
    }

    /// Read-only snapshot of a queue's active tickets (spec §4.1). Does not
    /// go through the shop mailbox: `TicketStore` is already
    /// concurrency-safe per row, and a snapshot only needs a consistent
    /// point-in-time read, not serialization against other mutations
    /// (spec §5 "Reads may ... use a consistent snapshot").
    pub async fn snapshot(&self, queue_id: Uuid) -> Result<QueueSnapshot, QueueEngineError> {
        let queue = self.tickets.get_queue(queue_id).await.ok_or(QueueEngineError::QueueNotFound(queue_id))?;
        let active = self.tickets.list_active(queue_id).await;

        let mut waiting: Vec<Ticket> = active.iter().filter(|t| t.state == TicketState::Waiting).cloned().collect();
        waiting.sort_by_key(|t| t.position);
        let called: Vec<Ticket> = active.iter().filter(|t| t.state == TicketState::Called).cloned().collect();
        let serving: Vec<Ticket> = active.iter().filter(|t| t.state == TicketState::Serving).cloned().collect();

        Ok(QueueSnapshot {
            queue_id,
            shop_id: queue.shop_id,
            status: queue.status,
            max_capacity: queue.max_capacity,
            waiting,
            called,
            serving,
        })
    }

    pub async fn upsert_queue(&self, queue: Queue) {
        self.tickets.upsert_queue(queue).await;
    }

    /// Looks up a queue's static attributes (shop id, status, city) without
    /// going through the shop mailbox — callers use this to resolve the
    /// `shop_id` a mutation needs before dispatching it, and to check
    /// subscription authorization (spec §4.5).
    pub async fn get_queue(&self, queue_id: Uuid) -> Option<Queue> {
        self.tickets.get_queue(queue_id).await
    }

    pub async fn get_ticket(&self, ticket_id: Uuid) -> Option<Ticket> {
        self.tickets.get_by_id(ticket_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use clock_cell::FixedClock;
    use service_time_store_cell::InMemoryServiceTimeStore;
    use subscription_hub_cell::SessionMessage;
    use ticket_store_cell::{InMemoryTicketStore, Priority};

    fn harness() -> (QueueEngine, Arc<InMemoryTicketStore>, Arc<InMemoryServiceTimeStore>, Arc<SubscriptionHub>) {
        let tickets = Arc::new(InMemoryTicketStore::new());
        let samples = Arc::new(InMemoryServiceTimeStore::new());
        let hub = Arc::new(SubscriptionHub::default());
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap()));
        let config = Arc::new(AppConfig::default());
        let engine = QueueEngine::new(tickets.clone(), samples.clone(), hub.clone(), clock, config);
        (engine, tickets, samples, hub)
    }

    fn new_queue(shop_id: Uuid, max_capacity: u32) -> Queue {
        Queue {
            id: Uuid::new_v4(),
            shop_id,
            name: "front desk".to_string(),
            status: QueueStatus::Open,
            max_capacity,
            shop_city: None,
        }
    }

    fn join_req(queue_id: Uuid, customer_id: Uuid) -> JoinRequest {
        JoinRequest { queue_id, customer_id, ..Default::default() }
    }

    async fn positions(engine: &QueueEngine, queue_id: Uuid) -> Vec<u32> {
        engine.snapshot(queue_id).await.unwrap().waiting.iter().map(|t| t.position).collect()
    }

    #[tokio::test]
    async fn simple_fifo_join_and_call_next() {
        let (engine, _tickets, _samples, _hub) = harness();
        let shop = Uuid::new_v4();
        let queue = new_queue(shop, 0);
        engine.upsert_queue(queue.clone()).await;

        let mut joined = Vec::new();
        for _ in 0..3 {
            let ticket = engine.join(shop, join_req(queue.id, Uuid::new_v4())).await.unwrap();
            joined.push(ticket);
        }
        assert_eq!(positions(&engine, queue.id).await, vec![1, 2, 3]);

        let called = engine.call_next(shop, queue.id, None).await.unwrap();
        assert_eq!(called.id, joined[0].id);
        assert_eq!(called.state, TicketState::Called);

        // The remaining waiting tickets close the gap left behind.
        assert_eq!(positions(&engine, queue.id).await, vec![1, 2]);
        let snapshot = engine.snapshot(queue.id).await.unwrap();
        assert_eq!(snapshot.waiting[0].id, joined[1].id);
        assert_eq!(snapshot.waiting[1].id, joined[2].id);
        assert_eq!(snapshot.called[0].id, joined[0].id);
    }

    #[tokio::test]
    async fn appointment_linked_join_inserts_near_the_front() {
        let (engine, _tickets, _samples, _hub) = harness();
        let shop = Uuid::new_v4();
        let queue = new_queue(shop, 0);
        engine.upsert_queue(queue.clone()).await;

        let mut walk_ins = Vec::new();
        for _ in 0..6 {
            walk_ins.push(engine.join(shop, join_req(queue.id, Uuid::new_v4())).await.unwrap());
        }

        let mut req = join_req(queue.id, Uuid::new_v4());
        req.appointment_id = Some(Uuid::new_v4());
        let linked = engine.join(shop, req).await.unwrap();

        assert_eq!(linked.position, 2);
        let snapshot = engine.snapshot(queue.id).await.unwrap();
        let by_id = |id: Uuid| snapshot.waiting.iter().find(|t| t.id == id).unwrap().position;
        assert_eq!(by_id(walk_ins[0].id), 1);
        assert_eq!(by_id(linked.id), 2);
        assert_eq!(by_id(walk_ins[1].id), 3);
        assert_eq!(by_id(walk_ins[5].id), 7);
    }

    #[tokio::test]
    async fn capacity_rejection_leaves_state_unchanged() {
        let (engine, _tickets, _samples, _hub) = harness();
        let shop = Uuid::new_v4();
        let queue = new_queue(shop, 2);
        engine.upsert_queue(queue.clone()).await;

        engine.join(shop, join_req(queue.id, Uuid::new_v4())).await.unwrap();
        engine.join(shop, join_req(queue.id, Uuid::new_v4())).await.unwrap();

        let result = engine.join(shop, join_req(queue.id, Uuid::new_v4())).await;
        assert!(matches!(result, Err(QueueEngineError::AtCapacity)));
        assert_eq!(positions(&engine, queue.id).await.len(), 2);
    }

    #[tokio::test]
    async fn capacity_counts_only_waiting_and_called_not_serving() {
        // max_capacity=3: one ticket is moved all the way to `serving`, leaving
        // only two counted against capacity, so a third `join` must succeed
        // (spec §3 Queue invariant scopes capacity to {waiting, called}).
        let (engine, _tickets, _samples, _hub) = harness();
        let shop = Uuid::new_v4();
        let queue = new_queue(shop, 3);
        engine.upsert_queue(queue.clone()).await;

        let first = engine.join(shop, join_req(queue.id, Uuid::new_v4())).await.unwrap();
        engine.join(shop, join_req(queue.id, Uuid::new_v4())).await.unwrap();

        let called = engine.call_next(shop, queue.id, None).await.unwrap();
        assert_eq!(called.id, first.id);
        engine.mark_serving(shop, called.id, Some(Uuid::new_v4())).await.unwrap();

        let result = engine.join(shop, join_req(queue.id, Uuid::new_v4())).await;
        assert!(result.is_ok(), "serving ticket must not count against capacity");
    }

    #[tokio::test]
    async fn duplicate_customer_is_rejected() {
        let (engine, _tickets, _samples, _hub) = harness();
        let shop = Uuid::new_v4();
        let queue = new_queue(shop, 0);
        engine.upsert_queue(queue.clone()).await;
        let customer = Uuid::new_v4();

        engine.join(shop, join_req(queue.id, customer)).await.unwrap();
        let result = engine.join(shop, join_req(queue.id, customer)).await;
        assert!(matches!(result, Err(QueueEngineError::DuplicateCustomer)));
    }

    #[tokio::test]
    async fn skip_cascade_shifts_positions_and_emits_events_in_order() {
        let (engine, _tickets, _samples, hub) = harness();
        let shop = Uuid::new_v4();
        let queue = new_queue(shop, 0);
        engine.upsert_queue(queue.clone()).await;

        let mut joined = Vec::new();
        for _ in 0..5 {
            joined.push(engine.join(shop, join_req(queue.id, Uuid::new_v4())).await.unwrap());
        }

        let session = Uuid::new_v4();
        let mailbox = hub.register_session(session).await;
        hub.subscribe(session, &format!("queue:{}", queue.id)).await.unwrap();

        let called = engine.call_next(shop, queue.id, None).await.unwrap();
        assert_eq!(called.id, joined[0].id);
        engine.skip(shop, called.id, Some("no show".to_string())).await.unwrap();

        assert_eq!(positions(&engine, queue.id).await, vec![1, 2, 3, 4]);
        let snapshot = engine.snapshot(queue.id).await.unwrap();
        let by_id = |id: Uuid| snapshot.waiting.iter().find(|t| t.id == id).unwrap().position;
        assert_eq!(by_id(joined[1].id), 1);
        assert_eq!(by_id(joined[4].id), 4);

        let mut actions = Vec::new();
        for _ in 0..3 {
            if let SessionMessage::Event(event) = mailbox.recv().await {
                actions.push(event.action);
            }
        }
        assert_eq!(actions, vec![EventAction::Call, EventAction::Skip, EventAction::Delete]);
    }

    #[tokio::test]
    async fn broadcast_ordering_is_identical_across_subscribers() {
        let (engine, _tickets, _samples, hub) = harness();
        let shop = Uuid::new_v4();
        let queue = new_queue(shop, 0);
        engine.upsert_queue(queue.clone()).await;

        let session_a = Uuid::new_v4();
        let session_b = Uuid::new_v4();
        let mailbox_a = hub.register_session(session_a).await;
        let mailbox_b = hub.register_session(session_b).await;
        let group = format!("queue:{}", queue.id);
        hub.subscribe(session_a, &group).await.unwrap();
        hub.subscribe(session_b, &group).await.unwrap();

        let specialist = Uuid::new_v4();
        let ticket = engine.join(shop, join_req(queue.id, Uuid::new_v4())).await.unwrap();
        let called = engine.call_next(shop, queue.id, Some(specialist)).await.unwrap();
        assert_eq!(called.id, ticket.id);
        engine.mark_serving(shop, called.id, Some(specialist)).await.unwrap();
        engine.mark_served(shop, called.id).await.unwrap();

        for mailbox in [&mailbox_a, &mailbox_b] {
            let mut actions = Vec::new();
            for _ in 0..4 {
                if let SessionMessage::Event(event) = mailbox.recv().await {
                    actions.push(event.action);
                }
            }
            assert_eq!(actions, vec![EventAction::Join, EventAction::Call, EventAction::Serve, EventAction::Complete]);
        }
    }

    #[tokio::test]
    async fn join_then_cancel_restores_prior_layout() {
        let (engine, _tickets, _samples, _hub) = harness();
        let shop = Uuid::new_v4();
        let queue = new_queue(shop, 0);
        engine.upsert_queue(queue.clone()).await;

        let first = engine.join(shop, join_req(queue.id, Uuid::new_v4())).await.unwrap();
        let second = engine.join(shop, join_req(queue.id, Uuid::new_v4())).await.unwrap();
        let third = engine.join(shop, join_req(queue.id, Uuid::new_v4())).await.unwrap();
        assert_eq!(positions(&engine, queue.id).await, vec![1, 2, 3]);

        engine.cancel(shop, second.id).await.unwrap();

        let snapshot = engine.snapshot(queue.id).await.unwrap();
        assert_eq!(snapshot.waiting.len(), 2);
        let by_id = |id: Uuid| snapshot.waiting.iter().find(|t| t.id == id).unwrap().position;
        assert_eq!(by_id(first.id), 1);
        assert_eq!(by_id(third.id), 2);
    }

    #[tokio::test]
    async fn mark_served_is_rejected_once_ticket_is_terminal() {
        let (engine, _tickets, samples, _hub) = harness();
        let shop = Uuid::new_v4();
        let queue = new_queue(shop, 0);
        engine.upsert_queue(queue.clone()).await;
        let specialist = Uuid::new_v4();

        let ticket = engine.join(shop, join_req(queue.id, Uuid::new_v4())).await.unwrap();
        let called = engine.call_next(shop, queue.id, Some(specialist)).await.unwrap();
        engine.mark_serving(shop, called.id, Some(specialist)).await.unwrap();
        engine.mark_served(shop, ticket.id).await.unwrap();

        let recorded = samples.recent(shop, Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()).await;
        assert_eq!(recorded.len(), 1);

        let result = engine.mark_served(shop, ticket.id).await;
        assert!(matches!(result, Err(QueueEngineError::IllegalState { .. })));
        let recorded_again = samples.recent(shop, Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()).await;
        assert_eq!(recorded_again.len(), 1);
    }

    #[tokio::test]
    async fn specialist_cannot_serve_two_tickets_at_once() {
        let (engine, _tickets, _samples, _hub) = harness();
        let shop = Uuid::new_v4();
        let queue = new_queue(shop, 0);
        engine.upsert_queue(queue.clone()).await;
        let specialist = Uuid::new_v4();

        engine.join(shop, join_req(queue.id, Uuid::new_v4())).await.unwrap();
        engine.join(shop, join_req(queue.id, Uuid::new_v4())).await.unwrap();

        let first_called = engine.call_next(shop, queue.id, Some(specialist)).await.unwrap();
        engine.mark_serving(shop, first_called.id, Some(specialist)).await.unwrap();

        let second_called = engine.call_next(shop, queue.id, Some(specialist)).await.unwrap();
        let result = engine.mark_serving(shop, second_called.id, Some(specialist)).await;
        assert!(matches!(result, Err(QueueEngineError::SpecialistBusy(_))));
    }

    #[tokio::test]
    async fn recompute_estimates_uses_recorded_service_history() {
        let (engine, _tickets, samples, _hub) = harness();
        let shop = Uuid::new_v4();
        let queue = new_queue(shop, 0);
        engine.upsert_queue(queue.clone()).await;

        for _ in 0..5 {
            samples
                .insert(service_time_store_cell::ServiceTimeSample::new(shop, None, None, 10.0, Utc.with_ymd_and_hms(2025, 12, 20, 9, 0, 0).unwrap()))
                .await
                .unwrap();
        }

        for _ in 0..3 {
            engine.join(shop, join_req(queue.id, Uuid::new_v4())).await.unwrap();
        }
        engine.recompute_estimates(shop, queue.id).await.unwrap();

        let snapshot = engine.snapshot(queue.id).await.unwrap();
        let estimates: Vec<u32> = snapshot.waiting.iter().map(|t| t.estimated_wait_minutes.unwrap()).collect();
        assert!(estimates.windows(2).all(|pair| pair[1] >= pair[0]));
        assert!(estimates[0] < 15, "estimate should reflect the 10-minute history, not the 15-minute fallback");
    }

    #[tokio::test]
    async fn priority_is_served_before_earlier_normal_tickets() {
        let (engine, _tickets, _samples, _hub) = harness();
        let shop = Uuid::new_v4();
        let queue = new_queue(shop, 0);
        engine.upsert_queue(queue.clone()).await;

        let normal = engine.join(shop, join_req(queue.id, Uuid::new_v4())).await.unwrap();
        let mut vip_req = join_req(queue.id, Uuid::new_v4());
        vip_req.priority = Priority::Vip;
        let vip = engine.join(shop, vip_req).await.unwrap();
        assert_eq!(normal.position, 1);
        assert_eq!(vip.position, 2);

        let called = engine.call_next(shop, queue.id, None).await.unwrap();
        assert_eq!(called.id, vip.id);
    }

    #[tokio::test]
    async fn invariant_sweep_stays_dense_and_exclusive_across_a_mixed_sequence() {
        let (engine, _tickets, _samples, _hub) = harness();
        let shop = Uuid::new_v4();
        let queue = new_queue(shop, 0);
        engine.upsert_queue(queue.clone()).await;

        let specialists: Vec<Uuid> = (0..2).map(|_| Uuid::new_v4()).collect();
        let mut waiting_customers = Vec::new();
        for _ in 0..6 {
            let ticket = engine.join(shop, join_req(queue.id, Uuid::new_v4())).await.unwrap();
            waiting_customers.push(ticket.id);
            assert_dense_and_exclusive(&engine, queue.id).await;
        }

        let called_a = engine.call_next(shop, queue.id, Some(specialists[0])).await.unwrap();
        assert_dense_and_exclusive(&engine, queue.id).await;
        let called_b = engine.call_next(shop, queue.id, Some(specialists[1])).await.unwrap();
        assert_dense_and_exclusive(&engine, queue.id).await;

        engine.mark_serving(shop, called_a.id, Some(specialists[0])).await.unwrap();
        assert_dense_and_exclusive(&engine, queue.id).await;
        engine.skip(shop, called_b.id, None).await.unwrap();
        assert_dense_and_exclusive(&engine, queue.id).await;

        let mut req = join_req(queue.id, Uuid::new_v4());
        req.appointment_id = Some(Uuid::new_v4());
        engine.join(shop, req).await.unwrap();
        assert_dense_and_exclusive(&engine, queue.id).await;

        engine.mark_served(shop, called_a.id).await.unwrap();
        assert_dense_and_exclusive(&engine, queue.id).await;

        let remaining_waiting = engine.snapshot(queue.id).await.unwrap();
        let cancel_target = remaining_waiting.waiting[0].id;
        engine.cancel(shop, cancel_target).await.unwrap();
        assert_dense_and_exclusive(&engine, queue.id).await;
    }

    async fn assert_dense_and_exclusive(engine: &QueueEngine, queue_id: Uuid) {
        let snapshot = engine.snapshot(queue_id).await.unwrap();
        let mut sorted_positions: Vec<u32> = snapshot.waiting.iter().map(|t| t.position).collect();
        sorted_positions.sort_unstable();
        let expected: Vec<u32> = (1..=sorted_positions.len() as u32).collect();
        assert_eq!(sorted_positions, expected, "waiting positions must form a dense 1..N sequence");

        let mut serving_specialists = std::collections::HashSet::new();
        for ticket in snapshot.serving.iter() {
            if let Some(specialist) = ticket.specialist_id {
                assert!(serving_specialists.insert(specialist), "specialist {specialist} serving more than one ticket");
            }
        }
    }
}
