use thiserror::Error;

/// Error taxonomy for one WebSocket connection (spec §7 Authorization/Fatal
/// kinds, specialized to the gateway). Each variant maps to one of the wire
/// protocol's close codes (spec §6).
#[derive(Error, Debug, Clone)]
pub enum WsGatewayError {
    #[error("invalid or expired token")]
    InvalidToken,

    #[error("user is inactive")]
    InactiveUser,

    #[error("forbidden group: {0}")]
    ForbiddenGroup(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl WsGatewayError {
    pub fn close_code(&self) -> u16 {
        match self {
            WsGatewayError::InvalidToken => 4001,
            WsGatewayError::InactiveUser => 4002,
            WsGatewayError::ForbiddenGroup(_) => 4003,
            WsGatewayError::Protocol(_) => 4000,
            WsGatewayError::Internal(_) => 4500,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            WsGatewayError::InvalidToken => "invalid_token",
            WsGatewayError::InactiveUser => "inactive_user",
            WsGatewayError::ForbiddenGroup(_) => "forbidden_group",
            WsGatewayError::Protocol(_) => "protocol_error",
            WsGatewayError::Internal(_) => "internal_error",
        }
    }
}

/// Machine-readable code for an engine error surfaced in an `error` wire
/// message (spec §7 "short machine-readable code and a human-readable
/// message"). Distinct from `WsGatewayError`, whose variants are all
/// connection-terminating; an engine error never closes the socket.
pub fn engine_error_code(err: &queue_engine_cell::QueueEngineError) -> &'static str {
    use queue_engine_cell::QueueEngineError::*;
    match err {
        TicketNotFound(_) => "ticket_not_found",
        QueueNotFound(_) => "queue_not_found",
        QueueClosed => "queue_closed",
        DuplicateCustomer => "duplicate_customer",
        AtCapacity => "at_capacity",
        IllegalState { .. } => "illegal_state",
        SpecialistBusy(_) => "specialist_busy",
        InvalidPosition(_) => "invalid_position",
        ShopHalted(_) => "shop_halted",
        QueueEmpty => "queue_empty",
        Store(_) => "store_error",
        ActorUnavailable => "actor_unavailable",
    }
}
