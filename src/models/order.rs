//! Order collaborator model.
//!
//! The e-commerce order subsystem is an external collaborator; this model
//! carries only the fields the webhook handlers and refund orchestrator read
//! or flip. Nothing here owns order fulfillment logic.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Fulfillment state of an order.
///
/// `Processing` means payment succeeded and fulfillment started; a success
/// webhook redelivered for a processing order is treated as a duplicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "order_state", rename_all = "lowercase")]
pub enum OrderState {
    New,
    Processing,
    Canceled,
    Closed,
}

/// Represents an order record from the database.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Order {
    pub id: Uuid,

    /// External order reference (the e-commerce increment id)
    pub reference: String,

    pub state: OrderState,

    /// Payment method code the order was placed with
    pub payment_method: String,

    /// Provider payment identifier, set once a payment intent succeeds.
    /// Preferred source for refund resolution.
    pub payment_id: Option<String>,

    pub total_paid: f64,

    pub grand_total: f64,

    pub currency: String,

    /// Whether the customer's cart is active again (restored after a failed
    /// or expired checkout)
    pub cart_active: bool,

    pub invoiced: bool,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}
