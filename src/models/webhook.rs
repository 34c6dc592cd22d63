//! Webhook event model and event-type constants.
//!
//! # Webhook Flow
//!
//! 1. The provider POSTs a signed JSON body to `/webhooks/provider`
//! 2. The signature is verified against the exact raw bytes
//! 3. The body is normalized into a canonical [`WebhookEvent`]
//! 4. The idempotency ledger short-circuits duplicates
//! 5. The router dispatches the event to its handler
//!
//! The provider sends several differing envelope shapes; the parser absorbs
//! them so handler code never branches on raw shape.

use serde_json::{Map, Value};

/// Event type names the router knows about.
pub mod event_types {
    pub const PI_SUCCEEDED: &str = "payment_intent.succeeded";
    pub const PI_FAILED: &str = "payment_intent.failed";
    pub const PI_PENDING: &str = "payment_intent.pending";
    pub const CS_FINISHED: &str = "checkout_session.finished";
    pub const CS_EXPIRED: &str = "checkout_session.expired";
    pub const REFUND_SUCCEEDED: &str = "refund.succeeded";
    pub const REFUND_FAILED: &str = "refund.failed";
    pub const REFUND_IN_PROGRESS: &str = "refund.in_progress";
}

/// Metadata keys that might hold the order reference, in priority order.
///
/// The provider echoes back whatever metadata the checkout initiation sent,
/// and different integration versions used different spellings.
pub const ORDER_REFERENCE_KEYS: &[&str] = &[
    "ecommerceOrderId",
    "ecommerce_order_id",
    "order",
    "order_id",
    "order_increment_id",
];

/// Canonical webhook event, constructed per request by the payload normalizer.
///
/// # Invariant
///
/// `object` is never empty-by-construction in the sense of "missing": when no
/// nested business object is found it degrades to the full payload, so
/// handlers always have something to inspect.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    /// Provider event id, used for idempotent dedup when present
    pub event_id: Option<String>,

    /// Explicit event type; None when the provider omitted it and the router
    /// must infer one from the object's shape
    pub event_type: Option<String>,

    /// The business payload: a payment intent, checkout session, or refund
    pub object: Map<String, Value>,

    /// Raw envelope, kept for audit logging
    pub full_payload: Value,
}

impl WebhookEvent {
    /// String field of the business object, or None.
    pub fn object_str(&self, key: &str) -> Option<&str> {
        self.object.get(key).and_then(Value::as_str)
    }

    /// The object's `metadata` mapping, if it is an object.
    pub fn metadata(&self) -> Option<&Map<String, Value>> {
        self.object.get("metadata").and_then(Value::as_object)
    }
}
