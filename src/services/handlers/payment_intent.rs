//! Payment-intent webhook handlers.
//!
//! The payment lifecycle: `pending` while the customer is mid-flow,
//! `succeeded` when the provider confirms the charge, `failed` when it is
//! rejected or times out. Succeeded and failed are idempotent against the
//! order's state so retried deliveries do not re-invoice or re-cancel.

use super::{WEBHOOK_ACTOR, audit, comment, load_order, restore_cart, upsert_order_transaction};
use crate::error::AppError;
use crate::models::order::OrderState;
use crate::models::transaction::TransactionStatus;
use crate::models::webhook::WebhookEvent;
use crate::services::{order_gateway, transaction_service};
use crate::state::AppState;

/// Payment confirmed.
///
/// Transitions the transaction to success, stores the provider payment id
/// on the order for later refunds, and invoices the order. When the order
/// is already processing the delivery is a retry: only the audit trail is
/// touched.
pub async fn handle_succeeded(state: &AppState, event: &WebhookEvent) -> Result<(), AppError> {
    let order = load_order(state, event).await?;

    if order.state == OrderState::Processing {
        tracing::info!(order = %order.reference, "order already processing, recording audit only");
        if let Some(t) = transaction_service::first_for_order(&state.pool, &order.reference).await?
        {
            audit(state, &t.transaction_id, event).await;
        }
        return Ok(());
    }

    let transaction =
        upsert_order_transaction(state, &order, event, TransactionStatus::Success, None).await?;

    if let Some(payment_id) = event.object_str("id") {
        order_gateway::set_payment_id(&state.pool, order.id, payment_id).await?;
    }
    if let Err(e) = order_gateway::mark_invoiced(&state.pool, order.id).await {
        tracing::error!(order = %order.reference, error = %e, "failed to invoice order");
    }

    comment(
        state,
        &order,
        &format!(
            "Payment confirmed by provider (transaction {})",
            transaction.transaction_id
        ),
    )
    .await;
    audit(state, &transaction.transaction_id, event).await;

    Ok(())
}

/// Payment rejected or expired.
///
/// Transitions the transaction to failed with the provider's reason,
/// cancels the order, and reactivates the cart so the customer can retry.
/// Already-canceled orders only get the audit copy and the cart restore.
pub async fn handle_failed(state: &AppState, event: &WebhookEvent) -> Result<(), AppError> {
    let order = load_order(state, event).await?;

    if order.state == OrderState::Canceled {
        tracing::info!(order = %order.reference, "order already canceled, recording audit only");
        if let Some(t) = transaction_service::first_for_order(&state.pool, &order.reference).await?
        {
            audit(state, &t.transaction_id, event).await;
        }
        restore_cart(state, &order).await;
        return Ok(());
    }

    let reason = failure_reason(event);
    let transaction = upsert_order_transaction(
        state,
        &order,
        event,
        TransactionStatus::Failed,
        Some(reason.clone()),
    )
    .await?;

    order_gateway::cancel(&state.pool, order.id).await?;
    comment(state, &order, &format!("Payment failed: {reason}")).await;
    restore_cart(state, &order).await;
    audit(state, &transaction.transaction_id, event).await;

    Ok(())
}

/// Payment awaiting confirmation (e.g. a bank transfer in flight).
pub async fn handle_pending(state: &AppState, event: &WebhookEvent) -> Result<(), AppError> {
    let order = load_order(state, event).await?;

    let transaction =
        upsert_order_transaction(state, &order, event, TransactionStatus::Pending, None).await?;

    comment(
        state,
        &order,
        "Payment pending confirmation from provider",
    )
    .await;
    audit(state, &transaction.transaction_id, event).await;

    tracing::info!(
        order = %order.reference,
        actor = WEBHOOK_ACTOR,
        "payment marked pending"
    );

    Ok(())
}

/// The provider's failure reason, wherever this payload version carries it.
fn failure_reason(event: &WebhookEvent) -> String {
    event
        .object_str("errorReason")
        .or_else(|| {
            event
                .object
                .get("last_payment_error")
                .and_then(|e| e.get("message"))
                .and_then(serde_json::Value::as_str)
        })
        .unwrap_or("payment failed")
        .to_string()
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
    fn failure_reason_prefers_error_reason_field() {
        let e = event(json!({"data": {"object": {
            "errorReason": "insufficient_funds",
            "last_payment_error": {"message": "other"}
        }}}));
        assert_eq!(failure_reason(&e), "insufficient_funds");
    }

    #[test]
    fn failure_reason_falls_back_to_last_payment_error() {
        let e = event(json!({"data": {"object": {
            "last_payment_error": {"message": "card declined"}
        }}}));
        assert_eq!(failure_reason(&e), "card declined");
        let e = event(json!({"data": {"object": {}}}));
        assert_eq!(failure_reason(&e), "payment failed");
    }
}
