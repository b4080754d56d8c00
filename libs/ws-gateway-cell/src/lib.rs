pub mod authorization;
pub mod error;
pub mod gateway;
pub mod protocol;
pub mod router;

pub use error::WsGatewayError;
pub use gateway::{ws_handler, ConnectParams, GatewayState};
pub use protocol::{ClientMessage, ServerMessage};
pub use router::create_gateway_router;
