//! Webhook event routing.
//!
//! Maps a normalized [`WebhookEvent`] to a handler. Resolution is a pure
//! function over the event so it can be tested without a database: explicit
//! event types win; otherwise the type is inferred from the business
//! object's shape and status. Dispatch is a match over the resolved
//! [`EventKind`] — a tagged union, not a handler class hierarchy.
//!
//! Unroutable events are logged and answered with success: the provider
//! retries failed deliveries, and a retry storm over an event type we do
//! not care about is a bigger risk than a silently ignored event.

use crate::error::AppError;
use crate::models::webhook::{WebhookEvent, event_types};
use crate::services::handlers;
use crate::state::AppState;

/// The event families this service handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    PaymentIntentSucceeded,
    PaymentIntentFailed,
    PaymentIntentPending,
    CheckoutSessionFinished,
    CheckoutSessionExpired,
    RefundSucceeded,
    RefundFailed,
    RefundInProgress,
    /// A refund-shaped object without an explicit event type; the refund
    /// handler branches on the object's status.
    RefundEvent,
}

/// Resolve an event to a handler kind.
///
/// Explicit `event_type` strings are matched first. Without one, the type
/// is inferred: a `payment_intent` object by status (succeeded /
/// failed|rejected|expired / pending), a `checkout_session` object by
/// status (finished / expired), and any object type containing "refund"
/// maps to the generic refund event.
pub fn resolve(event: &WebhookEvent) -> Option<EventKind> {
    if let Some(event_type) = event.event_type.as_deref() {
        if let Some(kind) = from_type_str(event_type) {
            return Some(kind);
        }
    }

    let object_type = event.object_str("object")?;
    let status = event.object_str("status").unwrap_or("");
    match object_type {
        "payment_intent" => match status {
            "succeeded" => Some(EventKind::PaymentIntentSucceeded),
            "failed" | "rejected" | "expired" => Some(EventKind::PaymentIntentFailed),
            "pending" => Some(EventKind::PaymentIntentPending),
            _ => None,
        },
        "checkout_session" => match status {
            "finished" => Some(EventKind::CheckoutSessionFinished),
            "expired" => Some(EventKind::CheckoutSessionExpired),
            _ => None,
        },
        other if other.contains("refund") => Some(EventKind::RefundEvent),
        _ => None,
    }
}

fn from_type_str(event_type: &str) -> Option<EventKind> {
    match event_type {
        event_types::PI_SUCCEEDED => Some(EventKind::PaymentIntentSucceeded),
        event_types::PI_FAILED => Some(EventKind::PaymentIntentFailed),
        event_types::PI_PENDING => Some(EventKind::PaymentIntentPending),
        event_types::CS_FINISHED => Some(EventKind::CheckoutSessionFinished),
        event_types::CS_EXPIRED => Some(EventKind::CheckoutSessionExpired),
        event_types::REFUND_SUCCEEDED => Some(EventKind::RefundSucceeded),
        event_types::REFUND_FAILED => Some(EventKind::RefundFailed),
        event_types::REFUND_IN_PROGRESS => Some(EventKind::RefundInProgress),
        _ => None,
    }
}

/// Dispatch an event to its handler.
///
/// Events no handler claims are logged with a warning and return Ok.
pub async fn dispatch(state: &AppState, event: &WebhookEvent) -> Result<(), AppError> {
    let Some(kind) = resolve(event) else {
        tracing::warn!(
            event_type = ?event.event_type,
            object_keys = ?event.object.keys().collect::<Vec<_>>(),
            "unhandled webhook event"
        );
        return Ok(());
    };

    match kind {
        EventKind::PaymentIntentSucceeded => {
            handlers::payment_intent::handle_succeeded(state, event).await
        }
        EventKind::PaymentIntentFailed => {
            handlers::payment_intent::handle_failed(state, event).await
        }
        EventKind::PaymentIntentPending => {
            handlers::payment_intent::handle_pending(state, event).await
        }
        EventKind::CheckoutSessionFinished => {
            handlers::checkout_session::handle_finished(state, event).await
        }
        EventKind::CheckoutSessionExpired => {
            handlers::checkout_session::handle_expired(state, event).await
        }
        EventKind::RefundSucceeded => handlers::refund::handle_succeeded(state, event).await,
        EventKind::RefundFailed => handlers::refund::handle_failed(state, event).await,
        EventKind::RefundInProgress => handlers::refund::handle_in_progress(state, event).await,
        EventKind::RefundEvent => handlers::refund::handle_event(state, event).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::parser;
    use serde_json::json;

    fn event(value: serde_json::Value) -> WebhookEvent {
        parser::parse(value.to_string().as_bytes()).unwrap()
    }

    #[test]
    fn explicit_event_type_wins() {
        let e = event(json!({
            "type": "refund.succeeded",
            "data": {"object": {"object": "payment_intent", "status": "failed"}}
        }));
        assert_eq!(resolve(&e), Some(EventKind::RefundSucceeded));
    }

    #[test]
    fn infers_payment_intent_by_status() {
        for (status, kind) in [
            ("succeeded", EventKind::PaymentIntentSucceeded),
            ("failed", EventKind::PaymentIntentFailed),
            ("rejected", EventKind::PaymentIntentFailed),
            ("expired", EventKind::PaymentIntentFailed),
            ("pending", EventKind::PaymentIntentPending),
        ] {
            let e = event(json!({"data": {"object": "payment_intent", "status": status}}));
            assert_eq!(resolve(&e), Some(kind), "status {status}");
        }
    }

    #[test]
    fn infers_checkout_session_by_status() {
        let e = event(json!({"data": {"object": "checkout_session", "status": "finished"}}));
        assert_eq!(resolve(&e), Some(EventKind::CheckoutSessionFinished));
        let e = event(json!({"data": {"object": "checkout_session", "status": "expired"}}));
        assert_eq!(resolve(&e), Some(EventKind::CheckoutSessionExpired));
    }

    #[test]
    fn refund_shaped_objects_map_to_generic_refund_event() {
        let e = event(json!({"data": {"object": "payment_refund", "status": "succeeded"}}));
        assert_eq!(resolve(&e), Some(EventKind::RefundEvent));
    }

    #[test]
    fn unknown_events_resolve_to_none() {
        let e = event(json!({"type": "account.updated", "data": {"object": "account"}}));
        assert_eq!(resolve(&e), None);
        let e = event(json!({"data": {"object": "payment_intent", "status": "bizarre"}}));
        assert_eq!(resolve(&e), None);
    }
}
