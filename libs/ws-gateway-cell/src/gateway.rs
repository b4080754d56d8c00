use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::Utc;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use appointment_cell::{ArrivalOutcome, AppointmentStore, HybridScheduler};
use notification_dispatch_cell::NotificationDispatchService;
use queue_engine_cell::{JoinRequest, QueueEngine};
use shared_config::AppConfig;
use shared_models::auth::User;
use shared_utils::jwt::validate_token;
use subscription_hub_cell::{SessionMessage, SubscriptionHub};

use crate::authorization::authorize_group;
use crate::error::{engine_error_code, WsGatewayError};
use crate::protocol::{ClientMessage, ServerMessage};

/// Outbound payloads larger than this may be sent zlib-compressed when the
/// client opted in (spec §6).
const COMPRESSION_THRESHOLD_BYTES: usize = 1024;
/// Consecutive authorization denials before the gateway gives up on a
/// session and disconnects it (spec §7 "repeated denials increment a
/// per-session counter").
const MAX_CONSECUTIVE_DENIALS: u32 = 5;

/// Shared state every connection handler reads from. One instance is built
/// at startup and cloned into axum's router state.
#[derive(Clone)]
pub struct GatewayState {
    pub engine: Arc<QueueEngine>,
    pub hub: Arc<SubscriptionHub>,
    pub config: Arc<AppConfig>,
    pub notifications: Arc<NotificationDispatchService>,
    pub scheduler: Arc<HybridScheduler>,
    pub appointments: Arc<dyn AppointmentStore>,
}

#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    pub token: String,
    pub client_id: Option<String>,
    #[serde(default)]
    pub compression: bool,
}

/// Axum handler for the `/ws` route. Upgrade always succeeds at the HTTP
/// layer; authentication failures are reported as a WebSocket close code
/// per spec §4.5 step 1, not an HTTP status.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<GatewayState>>,
    Query(params): Query<ConnectParams>,
) -> Response {
    ws.on_upgrade(move |socket| handle_connection(socket, state, params))
}

async fn handle_connection(socket: WebSocket, state: Arc<GatewayState>, params: ConnectParams) {
    let user = match validate_token(&params.token, &state.config.jwt_secret) {
        Ok(user) => user,
        Err(reason) => {
            debug!(%reason, "websocket rejected: invalid token");
            close_with_code(socket, WsGatewayError::InvalidToken.close_code()).await;
            return;
        }
    };

    let session_id = Uuid::new_v4();
    let mailbox = state.hub.register_session(session_id).await;
    let compression = params.compression;

    info!(session_id = %session_id, user_id = %user.id, client_id = ?params.client_id, "websocket connected");

    let (mut sink, mut stream) = socket.split();

    send_message(
        &mut sink,
        compression,
        &ServerMessage::Welcome { session_id, user_id: user.id.clone(), server_time: Utc::now() },
    )
    .await;

    let mut ping_ticker = tokio::time::interval(state.config.ws_ping_interval);
    ping_ticker.tick().await; // first tick fires immediately; skip it
    let mut awaiting_pong = false;
    let mut denial_count: u32 = 0u32;

    // Armed to `now + ws_pong_timeout` whenever a ping goes out, and disarmed
    // (pushed a year out) once the matching pong arrives. Separate from
    // `ping_ticker` so the disconnect deadline is the spec's 30s pong window,
    // not whatever multiple of the 20s ping cadence it happens to round up to.
    let pong_deadline = tokio::time::sleep(Duration::from_secs(365 * 24 * 3600));
    tokio::pin!(pong_deadline);

    loop {
        tokio::select! {
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if handle_inbound_text(&text, &user, session_id, &state, &mut sink, compression, &mut denial_count).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        awaiting_pong = false;
                        pong_deadline.as_mut().reset(tokio::time::Instant::now() + Duration::from_secs(365 * 24 * 3600));
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(session_id = %session_id, error = %err, "websocket read error");
                        break;
                    }
                }
            }
            outgoing = mailbox.recv() => {
                let sent = match outgoing {
                    SessionMessage::Event(event) => send_value(&mut sink, compression, &event).await,
                    SessionMessage::ResyncRequired => send_message(&mut sink, compression, &ServerMessage::ResyncRequired).await,
                };
                if !sent {
                    break;
                }
            }
            _ = ping_ticker.tick() => {
                awaiting_pong = true;
                pong_deadline.as_mut().reset(tokio::time::Instant::now() + state.config.ws_pong_timeout);
                if sink.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
            _ = &mut pong_deadline, if awaiting_pong => {
                info!(session_id = %session_id, "no pong within window, disconnecting");
                break;
            }
        }

        if denial_count >= MAX_CONSECUTIVE_DENIALS {
            info!(session_id = %session_id, "too many authorization denials, disconnecting");
            let _ = sink
                .send(Message::Close(Some(axum::extract::ws::CloseFrame {
                    code: WsGatewayError::ForbiddenGroup(String::new()).close_code(),
                    reason: "too many forbidden subscriptions".into(),
                })))
                .await;
            break;
        }
    }

    state.hub.unsubscribe_all(session_id).await;
    state.hub.remove_session(session_id).await;
    info!(session_id = %session_id, "websocket disconnected");
}

/// Parses and routes one inbound text frame. Returns `Err(())` when the
/// connection should be torn down (a protocol-breaking message).
async fn handle_inbound_text(
    text: &str,
    user: &User,
    session_id: Uuid,
    state: &Arc<GatewayState>,
    sink: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    compression: bool,
    denial_count: &mut u32,
) -> Result<(), ()> {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(err) => {
            send_message(
                sink,
                compression,
                &ServerMessage::Error { code: "protocol_error".to_string(), message: err.to_string() },
            )
            .await;
            return Ok(());
        }
    };

    match message {
        ClientMessage::Ping { .. } => {
            send_message(sink, compression, &ServerMessage::Pong { timestamp: Utc::now() }).await;
        }
        ClientMessage::Subscribe { groups } => {
            for group in groups {
                handle_subscribe(&group, user, session_id, state, sink, compression, denial_count).await;
            }
        }
        ClientMessage::Unsubscribe { groups } => {
            for group in groups {
                state.hub.unsubscribe(session_id, &group).await;
            }
        }
        ClientMessage::GetQueueState { queue_id } => {
            send_queue_state(queue_id, state, sink, compression).await;
        }
        ClientMessage::JoinQueue { queue_id, customer_id, service_id } => {
            let req = JoinRequest {
                queue_id,
                customer_id,
                service_id,
                appointment_id: None,
                eligible_specialist_ids: vec![],
                priority: ticket_store_cell::Priority::Normal,
            };
            match resolve_shop(queue_id, state).await {
                Ok(shop_id) => {
                    let result = state.engine.join(shop_id, req).await;
                    report_mutation(sink, compression, result).await;
                }
                Err(()) => send_queue_not_found(sink, compression, queue_id).await,
            }
        }
        ClientMessage::CallNext { queue_id, specialist_id } => match resolve_shop(queue_id, state).await {
            Ok(shop_id) => {
                let result = state.engine.call_next(shop_id, queue_id, specialist_id).await;
                report_mutation(sink, compression, result).await;
            }
            Err(()) => send_queue_not_found(sink, compression, queue_id).await,
        },
        ClientMessage::MarkServing { ticket_id, specialist_id } => match resolve_ticket_shop(ticket_id, state).await {
            Ok(shop_id) => {
                let result = state.engine.mark_serving(shop_id, ticket_id, specialist_id).await;
                report_mutation(sink, compression, result).await;
            }
            Err(()) => send_ticket_not_found(sink, compression, ticket_id).await,
        },
        ClientMessage::MarkServed { ticket_id } => match resolve_ticket_shop(ticket_id, state).await {
            Ok(shop_id) => {
                let result = state.engine.mark_served(shop_id, ticket_id).await;
                report_mutation(sink, compression, result).await;
            }
            Err(()) => send_ticket_not_found(sink, compression, ticket_id).await,
        },
        ClientMessage::CancelTicket { ticket_id } => match resolve_ticket_shop(ticket_id, state).await {
            Ok(shop_id) => {
                let result = state.engine.cancel(shop_id, ticket_id).await;
                report_mutation(sink, compression, result).await;
            }
            Err(()) => send_ticket_not_found(sink, compression, ticket_id).await,
        },
        ClientMessage::CheckInAppointment { appointment_id, queue_id } => {
            handle_check_in(appointment_id, queue_id, state, sink, compression).await;
        }
        ClientMessage::AcknowledgeNotification { notification_id } => {
            match state.notifications.acknowledge(notification_id).await {
                Ok(_) => debug!(session_id = %session_id, %notification_id, "notification acknowledged"),
                Err(err) => {
                    send_message(
                        sink,
                        compression,
                        &ServerMessage::Error { code: "notification_error".to_string(), message: err.to_string() },
                    )
                    .await;
                }
            }
        }
    }

    Ok(())
}

async fn handle_subscribe(
    group: &str,
    user: &User,
    session_id: Uuid,
    state: &Arc<GatewayState>,
    sink: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    compression: bool,
    denial_count: &mut u32,
) {
    match authorize_group(user, group, &state.engine).await {
        Ok(()) => {
            if state.hub.subscribe(session_id, group).await.is_ok() {
                if let Some(id) = group.strip_prefix("queue:") {
                    if let Ok(queue_id) = Uuid::parse_str(id) {
                        send_queue_state(queue_id, state, sink, compression).await;
                    }
                }
            }
        }
        Err(err) => {
            *denial_count += 1;
            warn!(session_id = %session_id, group, denials = *denial_count, "subscription denied");
            send_message(
                sink,
                compression,
                &ServerMessage::Error { code: err.code().to_string(), message: err.to_string() },
            )
            .await;
        }
    }
}

/// Check-in for a scheduled appointment, carried over the WebSocket since
/// it is the only client-facing mutation surface this system exposes.
/// `Confirmed` leaves the appointment as is;
/// `EarlyWalkIn` joins the walk-in queue as a high-priority ticket linked
/// back to the appointment; `LateAccepted` is reported without a ticket —
/// the appointment stays servable in place once a specialist is free.
async fn handle_check_in(
    appointment_id: Uuid,
    queue_id: Uuid,
    state: &Arc<GatewayState>,
    sink: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    compression: bool,
) {
    let outcome = match state.scheduler.handle_arrival(appointment_id, Utc::now()).await {
        Ok(outcome) => outcome,
        Err(err) => {
            send_message(
                sink,
                compression,
                &ServerMessage::Error { code: "appointment_error".to_string(), message: err.to_string() },
            )
            .await;
            return;
        }
    };

    let ticket = if matches!(outcome, ArrivalOutcome::EarlyWalkIn) {
        match state.appointments.get_by_id(appointment_id).await {
            Some(appointment) => match resolve_shop(queue_id, state).await {
                Ok(shop_id) => {
                    let req = JoinRequest {
                        queue_id,
                        customer_id: appointment.customer_id,
                        service_id: Some(appointment.service_id),
                        appointment_id: Some(appointment_id),
                        eligible_specialist_ids: appointment.specialist_id.into_iter().collect(),
                        priority: ticket_store_cell::Priority::High,
                    };
                    match state.engine.join(shop_id, req).await {
                        Ok(ticket) => Some(ticket),
                        Err(err) => {
                            send_message(
                                sink,
                                compression,
                                &ServerMessage::Error { code: engine_error_code(&err).to_string(), message: err.to_string() },
                            )
                            .await;
                            None
                        }
                    }
                }
                Err(()) => {
                    send_queue_not_found(sink, compression, queue_id).await;
                    None
                }
            },
            None => None,
        }
    } else {
        None
    };

    send_message(
        sink,
        compression,
        &ServerMessage::ArrivalHandled { appointment_id, outcome: format!("{outcome:?}"), ticket },
    )
    .await;
}

async fn send_queue_state(
    queue_id: Uuid,
    state: &Arc<GatewayState>,
    sink: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    compression: bool,
) {
    match state.engine.snapshot(queue_id).await {
        Ok(snapshot) => {
            send_message(sink, compression, &ServerMessage::QueueState { queue_id, snapshot }).await;
        }
        Err(_) => send_queue_not_found(sink, compression, queue_id).await,
    }
}

async fn send_queue_not_found(
    sink: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    compression: bool,
    queue_id: Uuid,
) {
    send_message(
        sink,
        compression,
        &ServerMessage::Error { code: "queue_not_found".to_string(), message: format!("queue {queue_id} not found") },
    )
    .await;
}

async fn send_ticket_not_found(
    sink: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    compression: bool,
    ticket_id: Uuid,
) {
    send_message(
        sink,
        compression,
        &ServerMessage::Error { code: "ticket_not_found".to_string(), message: format!("ticket {ticket_id} not found") },
    )
    .await;
}

async fn report_mutation<T>(
    sink: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    compression: bool,
    result: Result<T, queue_engine_cell::QueueEngineError>,
) where
    T: Serialize,
{
    match result {
        Ok(_) => {}
        Err(err) => {
            send_message(
                sink,
                compression,
                &ServerMessage::Error { code: engine_error_code(&err).to_string(), message: err.to_string() },
            )
            .await;
        }
    }
}

async fn resolve_shop(queue_id: Uuid, state: &Arc<GatewayState>) -> Result<Uuid, ()> {
    state.engine.get_queue(queue_id).await.map(|q| q.shop_id).ok_or(())
}

async fn resolve_ticket_shop(ticket_id: Uuid, state: &Arc<GatewayState>) -> Result<Uuid, ()> {
    state.engine.get_ticket(ticket_id).await.map(|t| t.shop_id).ok_or(())
}

async fn send_message(
    sink: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    compression: bool,
    message: &ServerMessage,
) -> bool {
    send_value(sink, compression, message).await
}

/// Serializes any outbound payload, optionally zlib-compressing it (spec
/// §6) when it exceeds the threshold and the client opted in. Returns
/// whether the frame was sent successfully.
async fn send_value(
    sink: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    compression: bool,
    value: &impl Serialize,
) -> bool {
    let json_text = match serde_json::to_string(value) {
        Ok(text) => text,
        Err(err) => {
            warn!(error = %err, "failed to serialize outbound websocket message");
            return false;
        }
    };

    let frame = if compression && json_text.len() > COMPRESSION_THRESHOLD_BYTES {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        use std::io::Write;
        if encoder.write_all(json_text.as_bytes()).is_err() {
            json_text
        } else {
            match encoder.finish() {
                Ok(compressed) => json!({"compressed": true, "data": STANDARD.encode(compressed)}).to_string(),
                Err(_) => json_text,
            }
        }
    } else {
        json_text
    };

    sink.send(Message::Text(frame.into())).await.is_ok()
}

async fn close_with_code(socket: WebSocket, code: u16) {
    let (mut sink, _) = socket.split();
    let _ = sink
        .send(Message::Close(Some(axum::extract::ws::CloseFrame { code, reason: "".into() })))
        .await;
}
