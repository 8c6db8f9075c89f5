//! Notification producers: translate order domain events into routed
//! messages.
//!
//! Room delivery and the push collaborator are independent; a push failure
//! is logged and never rolls back or retries the in-process notification.

use serde_json::{json, Value};

use crate::auth::session::Role;
use crate::notify::order::{CustomerInfo, OrderStatus, OrderSummary, OrderUpdatePayload, PressingInfo};
use crate::state::AppState;
use crate::ws::protocol::ServerMessage;
use crate::ws::rooms::{self, ADMINS_ROOM};
use crate::ws::router;

/// A new order was placed: notify the pressing's private room and the
/// admins room. The pressing additionally gets a templated push when none
/// of its devices is connected.
pub fn notify_new_order(
    state: &AppState,
    order: &OrderSummary,
    customer: &CustomerInfo,
    pressing: &PressingInfo,
) {
    let envelope = ServerMessage::with_data(
        "new_order",
        json!({
            "order": order,
            "customer": customer,
            "pressing": pressing,
        }),
    );

    let pressing_room = rooms::private_room(Role::Pressing, &pressing.id);
    let pressing_reached = router::send_to_room(state, &pressing_room, &envelope, None);
    let admins_reached = router::send_to_room(state, ADMINS_ROOM, &envelope, None);
    tracing::info!(
        order_id = %order.id,
        pressing_id = %pressing.id,
        pressing_reached,
        admins_reached,
        "new order notified"
    );

    if pressing_reached == 0 {
        send_push(
            state,
            "new_order",
            &pressing.id,
            json!({
                "order_id": order.id,
                "reference": order.reference,
                "customer_name": customer.name,
            }),
        );
    }
}

/// An order changed status: notify the customer's and the pressing's private
/// rooms and the admins room. The customer gets the offline push on this
/// event.
pub fn notify_order_status_update(
    state: &AppState,
    order: &OrderSummary,
    previous_status: OrderStatus,
) {
    let envelope = ServerMessage::with_data(
        "order_status_update",
        json!({
            "order": order,
            "previous_status": previous_status,
        }),
    );

    let customer_room = rooms::private_room(Role::Client, &order.customer_id);
    let pressing_room = rooms::private_room(Role::Pressing, &order.pressing_id);
    let customer_reached = router::send_to_room(state, &customer_room, &envelope, None);
    let _ = router::send_to_room(state, &pressing_room, &envelope, None);
    let _ = router::send_to_room(state, ADMINS_ROOM, &envelope, None);
    tracing::info!(
        order_id = %order.id,
        status = order.status.as_str(),
        previous_status = previous_status.as_str(),
        customer_reached,
        "order status update notified"
    );

    if customer_reached == 0 {
        send_push(
            state,
            "order_status_update",
            &order.customer_id,
            json!({
                "order_id": order.id,
                "reference": order.reference,
                "status": order.status,
                "previous_status": previous_status,
            }),
        );
    }
}

/// Relay an inbound `order_update` from a live connection to the order's
/// customer, the pressing and the admins room, excluding the sender.
pub fn notify_order_update(state: &AppState, sender_id: &str, payload: &OrderUpdatePayload) {
    let envelope = ServerMessage::with_data("order_update", json!({ "data": payload }));

    let customer_room = rooms::private_room(Role::Client, &payload.customer_id);
    let pressing_room = rooms::private_room(Role::Pressing, &payload.pressing_id);
    let _ = router::send_to_room(state, &customer_room, &envelope, Some(sender_id));
    let _ = router::send_to_room(state, &pressing_room, &envelope, Some(sender_id));
    let _ = router::send_to_room(state, ADMINS_ROOM, &envelope, Some(sender_id));
    tracing::debug!(order_id = %payload.order_id, sender = %sender_id, "order update relayed");
}

/// Fire-and-forget push: spawned so producers never block on the
/// collaborator. Failures are logged, not retried.
fn send_push(state: &AppState, template: &'static str, user_id: &str, context: Value) {
    let push = state.push.clone();
    let user_id = user_id.to_string();
    let _ = tokio::spawn(async move {
        if let Err(err) = push.send_templated_push(template, &user_id, &context).await {
            tracing::warn!(user_id = %user_id, template, error = %err, "push notification failed");
        }
    });
}
