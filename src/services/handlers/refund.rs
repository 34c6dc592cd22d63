//! Refund webhook handlers.
//!
//! Refund transactions are created as pending by the refund orchestrator;
//! these handlers settle them. The refund id in the webhook matches the
//! external id stored on the pending transaction, so settlement is a direct
//! lookup. A refund issued outside this service matches nothing; its
//! merchant-side effects (credit memo, comment) still run, because the
//! money already moved at the provider regardless of who initiated it.

use super::{WEBHOOK_ACTOR, audit, comment, load_order};
use crate::error::AppError;
use crate::models::order::Order;
use crate::models::transaction::{Transaction, TransactionStatus};
use crate::models::webhook::WebhookEvent;
use crate::services::order_gateway::{self, CreditMemoPlan, credit_memo_plan};
use crate::services::transaction_service::{self, StatusUpdate};
use crate::state::AppState;
use serde_json::{Map, Value};

/// Refund settled at the provider.
///
/// Transitions the pending refund transaction to success and, when
/// configured and the order is invoiced, cuts a credit memo from the plan
/// in the refund's metadata. An unmatched refund id skips the transition
/// but keeps the credit memo, comment, and audit copy.
pub async fn handle_succeeded(state: &AppState, event: &WebhookEvent) -> Result<(), AppError> {
    let Some(transaction) = find_refund_transaction(state, event).await? else {
        return settle_unmatched(state, event).await;
    };

    let transaction = transaction_service::update_transaction_status(
        &state.pool,
        &transaction.transaction_id,
        TransactionStatus::Success,
        StatusUpdate {
            clear_errors: true,
            updated_by: Some(WEBHOOK_ACTOR),
            ..Default::default()
        },
    )
    .await?;

    if let Some(reference) = transaction.order_reference.as_deref() {
        let order = order_gateway::load_by_reference(&state.pool, reference).await?;

        create_settlement_credit_memo(state, &order, event, &transaction.transaction_id).await;
        comment(
            state,
            &order,
            &format!("Refund {} settled by provider", transaction.transaction_id),
        )
        .await;
    }

    audit(state, &transaction.transaction_id, event).await;

    Ok(())
}

/// Refund rejected after being accepted.
pub async fn handle_failed(state: &AppState, event: &WebhookEvent) -> Result<(), AppError> {
    let Some(transaction) = find_refund_transaction(state, event).await? else {
        return audit_unmatched(state, event, "refund.failed").await;
    };

    let transaction = transaction_service::update_transaction_status(
        &state.pool,
        &transaction.transaction_id,
        TransactionStatus::Failed,
        failure_update(event),
    )
    .await?;

    if let Some(reference) = transaction.order_reference.as_deref() {
        if let Ok(order) = order_gateway::load_by_reference(&state.pool, reference).await {
            comment(
                state,
                &order,
                &format!(
                    "Refund {} failed at provider: {}",
                    transaction.transaction_id,
                    transaction.error_message.as_deref().unwrap_or("unknown")
                ),
            )
            .await;
        }
    }

    audit(state, &transaction.transaction_id, event).await;

    Ok(())
}

/// Refund acknowledged and executing. Audit-only: the transaction is
/// already pending.
pub async fn handle_in_progress(state: &AppState, event: &WebhookEvent) -> Result<(), AppError> {
    match find_refund_transaction(state, event).await? {
        Some(t) => {
            audit(state, &t.transaction_id, event).await;
            Ok(())
        }
        None => audit_unmatched(state, event, "refund.in_progress").await,
    }
}

/// Refund-shaped event without an explicit type; branch on the object's
/// status.
pub async fn handle_event(state: &AppState, event: &WebhookEvent) -> Result<(), AppError> {
    match event.object_str("status").unwrap_or("") {
        "succeeded" => handle_succeeded(state, event).await,
        "failed" | "rejected" | "canceled" => handle_failed(state, event).await,
        _ => handle_in_progress(state, event).await,
    }
}

/// Locate the pending refund transaction this event settles.
async fn find_refund_transaction(
    state: &AppState,
    event: &WebhookEvent,
) -> Result<Option<Transaction>, AppError> {
    let id = event
        .object_str("id")
        .or_else(|| event.object_str("refund_id"));
    let Some(id) = id else {
        return Ok(None);
    };
    transaction_service::find_by_transaction_id(&state.pool, id).await
}

/// Settlement of a refund no local transaction claims (issued through the
/// provider's own dashboard or another channel). There is no row to
/// transition, but the merchant-side effects still run: the money moved.
async fn settle_unmatched(state: &AppState, event: &WebhookEvent) -> Result<(), AppError> {
    let refund_id = event
        .object_str("id")
        .or_else(|| event.object_str("refund_id"))
        .unwrap_or("unknown");
    tracing::warn!(
        refund_id,
        "settled refund does not match any known refund transaction"
    );

    let Ok(order) = load_order(state, event).await else {
        return Ok(());
    };

    if let Some(t) = transaction_service::latest_for_order(&state.pool, &order.reference).await? {
        audit(state, &t.transaction_id, event).await;
    }

    create_settlement_credit_memo(state, &order, event, refund_id).await;
    comment(
        state,
        &order,
        &format!("Refund {refund_id} settled by provider (no matching transaction)"),
    )
    .await;

    Ok(())
}

/// Last resort for a non-settlement refund webhook with no matching
/// transaction: pin the payload onto the order's most recent transaction so
/// it is at least visible, and flag the mismatch.
async fn audit_unmatched(
    state: &AppState,
    event: &WebhookEvent,
    label: &str,
) -> Result<(), AppError> {
    tracing::warn!(
        event = label,
        refund_id = ?event.object_str("id"),
        "refund webhook does not match any known refund transaction"
    );

    let Ok(order) = load_order(state, event).await else {
        return Ok(());
    };
    if let Some(t) = transaction_service::latest_for_order(&state.pool, &order.reference).await? {
        audit(state, &t.transaction_id, event).await;
    }

    Ok(())
}

/// Cut the credit memo for a settled refund, when one is due. Error-isolated:
/// the settlement is already committed and must not be reverted.
async fn create_settlement_credit_memo(
    state: &AppState,
    order: &Order,
    event: &WebhookEvent,
    refund_id: &str,
) {
    let Some(plan) = settlement_plan(
        state.config.refunds_auto_creditmemo,
        order.invoiced,
        event.metadata(),
    ) else {
        return;
    };

    match order_gateway::create_credit_memo(&state.pool, order.id, &plan).await {
        Ok(memo_id) => {
            tracing::info!(
                order = %order.reference,
                credit_memo = %memo_id,
                "credit memo created for settled refund"
            );
        }
        Err(e) => {
            // Money already moved at the provider; this must be reconciled
            // by hand.
            tracing::error!(
                order = %order.reference,
                refund_id,
                error = %e,
                "refund settled but credit memo creation failed"
            );
        }
    }
}

/// Whether a settled refund gets a credit memo, and which plan.
///
/// None when auto credit memos are off or the order was never invoiced;
/// otherwise the plan derived from the refund's metadata.
fn settlement_plan(
    auto_creditmemo: bool,
    invoiced: bool,
    metadata: Option<&Map<String, Value>>,
) -> Option<CreditMemoPlan> {
    if !auto_creditmemo || !invoiced {
        return None;
    }
    Some(credit_memo_plan(metadata))
}

/// Failure details for a rejected refund, wherever this payload version
/// carries them.
fn failure_update(event: &WebhookEvent) -> StatusUpdate<'static> {
    StatusUpdate {
        error_code: failure_field(event, &["failure_code", "error_code"]),
        error_message: failure_field(event, &["failure_reason", "error_reason", "error_message"]),
        updated_by: Some(WEBHOOK_ACTOR),
        ..Default::default()
    }
}

fn failure_field(event: &WebhookEvent, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        event
            .object
            .get(*key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
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
    fn failure_fields_are_scanned_in_order() {
        let e = event(json!({"data": {"object": {
            "error_code": "bank_rejected",
            "failure_reason": "",
            "error_reason": "account closed"
        }}}));
        assert_eq!(
            failure_field(&e, &["failure_code", "error_code"]),
            Some("bank_rejected".to_string())
        );
        assert_eq!(
            failure_field(&e, &["failure_reason", "error_reason", "error_message"]),
            Some("account closed".to_string())
        );
        assert_eq!(failure_field(&e, &["missing"]), None);
    }

    #[test]
    fn failure_update_carries_details_without_clearing_errors() {
        let e = event(json!({"data": {"object": {
            "failure_code": "insufficient_balance",
            "failure_reason": "account empty"
        }}}));
        let update = failure_update(&e);
        assert_eq!(update.error_code.as_deref(), Some("insufficient_balance"));
        assert_eq!(update.error_message.as_deref(), Some("account empty"));
        assert_eq!(update.updated_by, Some(WEBHOOK_ACTOR));
        assert!(!update.clear_errors);
    }

    #[test]
    fn settlement_plan_respects_gates() {
        let md = json!({"mode": "full"});
        let md = md.as_object();
        assert_eq!(settlement_plan(false, true, md), None);
        assert_eq!(settlement_plan(true, false, md), None);
        assert_eq!(settlement_plan(true, true, md), Some(CreditMemoPlan::Full));
    }

    #[test]
    fn settlement_plan_derives_item_plan_from_metadata() {
        let md = json!({"mode": "items", "qtys": {"7": 2}});
        match settlement_plan(true, true, md.as_object()) {
            Some(CreditMemoPlan::Items { qtys, .. }) => assert_eq!(qtys["7"], 2.0),
            other => panic!("expected items plan, got {other:?}"),
        }
    }
}
