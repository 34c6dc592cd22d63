//! Webhook event handlers.
//!
//! One module per provider event family. All handlers share the same
//! upsert protocol: resolve the order from the event's metadata, transition
//! the order's existing transaction when one exists (creating one only when
//! none does), then append the raw payload to the transaction's audit
//! trail. Out-of-order and repeated deliveries therefore converge on a
//! single ledger row per payment instead of piling up duplicates.

pub mod checkout_session;
pub mod payment_intent;
pub mod refund;

use crate::error::AppError;
use crate::models::order::Order;
use crate::models::transaction::{Transaction, TransactionStatus};
use crate::models::webhook::{ORDER_REFERENCE_KEYS, WebhookEvent};
use crate::services::amounts;
use crate::services::order_gateway;
use crate::services::transaction_service::{self, NewWebhookTransaction, StatusUpdate};
use crate::state::AppState;
use serde_json::Value;

/// Actor recorded on ledger writes made by webhook handlers.
pub(crate) const WEBHOOK_ACTOR: &str = "webhook";

/// Extract the e-commerce order reference from the event's metadata.
///
/// The checkout initiation stores the reference under one of several
/// spellings depending on integration version; they are tried in priority
/// order. Numeric values are accepted and stringified.
pub(crate) fn order_reference(event: &WebhookEvent) -> Result<String, AppError> {
    let metadata = event.metadata().ok_or(AppError::OrderReferenceMissing)?;

    for key in ORDER_REFERENCE_KEYS {
        match metadata.get(*key) {
            Some(Value::String(s)) if !s.is_empty() => return Ok(s.clone()),
            Some(Value::Number(n)) => return Ok(n.to_string()),
            _ => {}
        }
    }

    Err(AppError::OrderReferenceMissing)
}

/// Load the order an event refers to.
pub(crate) async fn load_order(state: &AppState, event: &WebhookEvent) -> Result<Order, AppError> {
    let reference = order_reference(event)?;
    order_gateway::load_by_reference(&state.pool, &reference).await
}

/// The payment amount carried by the business object, in major units.
///
/// Providers send minor units; a stringified integer is tolerated.
pub(crate) fn object_amount(event: &WebhookEvent) -> Option<f64> {
    let minor = match event.object.get("amount") {
        Some(Value::Number(n)) => n.as_i64()?,
        Some(Value::String(s)) => s.parse().ok()?,
        _ => return None,
    };
    Some(amounts::from_minor(minor))
}

/// Transition the order's transaction, creating one only when none exists.
///
/// # Process
///
/// 1. If the object's id matches a known transaction, transition that row
/// 2. Otherwise transition the order's earliest transaction, which is the
///    one the checkout initiation created
/// 3. Only when the order has no transaction at all, create a webhook row
pub(crate) async fn upsert_order_transaction(
    state: &AppState,
    order: &Order,
    event: &WebhookEvent,
    status: TransactionStatus,
    error_message: Option<String>,
) -> Result<Transaction, AppError> {
    let existing = match event.object_str("id") {
        Some(id) => transaction_service::find_by_transaction_id(&state.pool, id).await?,
        None => None,
    };
    let existing = match existing {
        Some(t) => Some(t),
        None => transaction_service::first_for_order(&state.pool, &order.reference).await?,
    };

    match existing {
        Some(current) => {
            transaction_service::update_transaction_status(
                &state.pool,
                &current.transaction_id,
                status,
                StatusUpdate {
                    error_message,
                    clear_errors: status == TransactionStatus::Success,
                    updated_by: Some(WEBHOOK_ACTOR),
                    ..Default::default()
                },
            )
            .await
        }
        None => {
            let transaction_id = event
                .object_str("id")
                .map(str::to_string)
                .or_else(|| event.event_id.clone())
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let currency = event
                .object_str("currency")
                .unwrap_or(&order.currency)
                .to_string();

            transaction_service::create_webhook_transaction(
                &state.pool,
                NewWebhookTransaction {
                    transaction_id,
                    order,
                    amount: object_amount(event),
                    currency,
                    status,
                    error_message,
                    created_by: WEBHOOK_ACTOR,
                },
            )
            .await
        }
    }
}

/// Append the raw event payload to a transaction's audit trail.
///
/// Best-effort: the audit copy never fails a handler that has already
/// committed its state transition.
pub(crate) async fn audit(state: &AppState, transaction_id: &str, event: &WebhookEvent) {
    let event_type = event.event_type.as_deref().unwrap_or("");
    if let Err(e) = transaction_service::append_webhook_data(
        &state.pool,
        transaction_id,
        event_type,
        &event.full_payload,
    )
    .await
    {
        tracing::warn!(
            transaction_id,
            event_type,
            error = %e,
            "failed to append webhook payload to audit trail"
        );
    }
}

/// Add an order history comment, logging instead of failing.
pub(crate) async fn comment(state: &AppState, order: &Order, text: &str) {
    if let Err(e) = order_gateway::add_history_comment(&state.pool, order.id, text).await {
        tracing::warn!(order = %order.reference, error = %e, "failed to add order comment");
    }
}

/// Reactivate the customer's cart, logging instead of failing.
pub(crate) async fn restore_cart(state: &AppState, order: &Order) {
    if let Err(e) = order_gateway::restore_cart(&state.pool, order.id).await {
        tracing::warn!(order = %order.reference, error = %e, "failed to restore cart");
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
    fn order_reference_respects_key_priority() {
        let e = event(json!({
            "data": {"object": {
                "metadata": {"order_id": "B", "ecommerceOrderId": "A"}
            }}
        }));
        assert_eq!(order_reference(&e).unwrap(), "A");
    }

    #[test]
    fn order_reference_accepts_numbers_and_skips_empty_strings() {
        let e = event(json!({
            "data": {"object": {
                "metadata": {"ecommerceOrderId": "", "order": 123}
            }}
        }));
        assert_eq!(order_reference(&e).unwrap(), "123");
    }

    #[test]
    fn missing_reference_is_an_error() {
        let e = event(json!({"data": {"object": {"metadata": {"other": "x"}}}}));
        assert!(matches!(
            order_reference(&e),
            Err(AppError::OrderReferenceMissing)
        ));
        let e = event(json!({"data": {"object": {"id": "pi_1"}}}));
        assert!(matches!(
            order_reference(&e),
            Err(AppError::OrderReferenceMissing)
        ));
    }

    #[test]
    fn object_amount_converts_minor_units() {
        let e = event(json!({"data": {"object": {"amount": 12345}}}));
        assert_eq!(object_amount(&e), Some(123.45));
        let e = event(json!({"data": {"object": {"amount": "500"}}}));
        assert_eq!(object_amount(&e), Some(5.0));
        let e = event(json!({"data": {"object": {}}}));
        assert_eq!(object_amount(&e), None);
    }
}
