//! Checkout-session webhook handlers.
//!
//! A checkout session wraps a payment intent. `finished` arrives alongside
//! the payment intent's own success event and carries no new state, so it
//! is audit-only; `expired` means the customer abandoned the flow and the
//! order should be released.

use super::{audit, comment, load_order, restore_cart, upsert_order_transaction};
use crate::error::AppError;
use crate::models::order::OrderState;
use crate::models::transaction::TransactionStatus;
use crate::models::webhook::WebhookEvent;
use crate::services::{order_gateway, transaction_service};
use crate::state::AppState;

/// Customer completed the checkout flow.
///
/// State transitions belong to the payment-intent events; this only files
/// the payload into the audit trail.
pub async fn handle_finished(state: &AppState, event: &WebhookEvent) -> Result<(), AppError> {
    let order = load_order(state, event).await?;

    match transaction_service::first_for_order(&state.pool, &order.reference).await? {
        Some(t) => audit(state, &t.transaction_id, event).await,
        None => tracing::info!(
            order = %order.reference,
            "checkout session finished before any transaction was recorded"
        ),
    }

    Ok(())
}

/// Checkout session expired without payment.
pub async fn handle_expired(state: &AppState, event: &WebhookEvent) -> Result<(), AppError> {
    let order = load_order(state, event).await?;

    let transaction = upsert_order_transaction(
        state,
        &order,
        event,
        TransactionStatus::Canceled,
        Some("Checkout session expired".to_string()),
    )
    .await?;

    if order.state != OrderState::Canceled {
        order_gateway::cancel(&state.pool, order.id).await?;
        comment(state, &order, "Checkout session expired, order canceled").await;
    }
    restore_cart(state, &order).await;
    audit(state, &transaction.transaction_id, event).await;

    Ok(())
}
