use queue_engine_cell::QueueEngine;
use shared_models::auth::{User, UserRole};
use uuid::Uuid;

use crate::error::WsGatewayError;

/// Applies the group authorization rule set (spec §4.5) to one subscription
/// request. Looking up a `queue:<id>` group's shop requires the engine, so
/// this is async; `shop_queues:<id>` and `notifications:<id>` are pure
/// string comparisons against the caller's claims.
pub async fn authorize_group(user: &User, group: &str, engine: &QueueEngine) -> Result<(), WsGatewayError> {
    if let Some(id) = group.strip_prefix("queue:") {
        return authorize_queue_group(user, id, engine).await;
    }
    if let Some(shop_id) = group.strip_prefix("shop_queues:") {
        let allowed = match user.role {
            UserRole::Admin => true,
            UserRole::Employee => user.shop_id.as_deref() == Some(shop_id),
            UserRole::Customer => false,
        };
        return if allowed { Ok(()) } else { Err(WsGatewayError::ForbiddenGroup(group.to_string())) };
    }
    if let Some(user_id) = group.strip_prefix("notifications:") {
        return if user.id == user_id { Ok(()) } else { Err(WsGatewayError::ForbiddenGroup(group.to_string())) };
    }
    Err(WsGatewayError::ForbiddenGroup(group.to_string()))
}

async fn authorize_queue_group(user: &User, id: &str, engine: &QueueEngine) -> Result<(), WsGatewayError> {
    let queue_id = Uuid::parse_str(id).map_err(|_| WsGatewayError::ForbiddenGroup(format!("queue:{id}")))?;
    let queue = engine
        .get_queue(queue_id)
        .await
        .ok_or_else(|| WsGatewayError::ForbiddenGroup(format!("queue:{id}")))?;

    let allowed = match user.role {
        UserRole::Admin => user.has_permission("queue.view"),
        UserRole::Employee => user.shop_id.as_deref() == Some(queue.shop_id.to_string().as_str()),
        UserRole::Customer => user.city.is_some() && user.city == queue.shop_city,
    };

    if allowed {
        Ok(())
    } else {
        Err(WsGatewayError::ForbiddenGroup(format!("queue:{id}")))
    }
}
