//! Refund orchestration.
//!
//! The two-phase refund protocol: validate locally, call the provider API
//! with a deterministic idempotency key, persist a pending refund
//! transaction — and settle it only when the `refund.succeeded` /
//! `refund.failed` webhook arrives, because the provider executes refunds
//! asynchronously and can fail one after accepting it.

use crate::error::AppError;
use crate::models::order::Order;
use crate::models::refund::RefundRequest;
use crate::models::transaction::{Transaction, TransactionStatus, TransactionType};
use crate::services::amounts::{self, EPSILON};
use crate::services::order_gateway;
use crate::services::transaction_service::{self, StatusUpdate};
use crate::state::AppState;

/// Request a refund for an order.
///
/// # Process
///
/// 1. Gate on the refunds feature flag and the order's payment method
/// 2. Re-derive the refundable ceiling from the transaction ledger (never
///    a cached value — concurrent refunds must not double-spend it)
/// 3. Validate the requested amount against the ceiling
/// 4. Resolve the provider payment identifier
/// 5. Call the provider with a deterministic idempotency key
/// 6. Persist the refund transaction as pending, carrying the external
///    refund id and the request/response payloads
///
/// Settlement happens later via the refund webhook handlers, never here.
///
/// # Errors
///
/// `RefundsDisabled`, `WrongPaymentMethod`, `InvalidAmount`,
/// `PartialNotAllowed`, `ExceedsRefundable`, `NothingToRefund`,
/// `MissingPaymentIdentifier`, `RefundApiFailure`.
pub async fn request_refund(
    state: &AppState,
    request: RefundRequest,
) -> Result<Transaction, AppError> {
    if !state.config.refunds_enabled {
        return Err(AppError::RefundsDisabled);
    }

    let order = order_gateway::load_by_reference(&state.pool, &request.order_reference).await?;
    if order.payment_method != state.config.payment_method_code {
        return Err(AppError::WrongPaymentMethod);
    }

    let currency = request
        .currency
        .unwrap_or_else(|| order.currency.clone());

    let history =
        transaction_service::history_for_order(&state.pool, &order.reference).await?;
    let refundable = refundable_amount(order.total_paid, order.grand_total, &history);

    let record_amount = validate_amount(
        refundable,
        request.amount,
        state.config.refunds_allow_partial,
    )?;

    // Omitting the amount asks the provider to refund the whole payment,
    // which is only correct when nothing was refunded before. Any earlier
    // refund forces an explicit amount.
    let paid = if order.total_paid > 0.0 {
        order.total_paid
    } else {
        order.grand_total
    };
    let send_amount_minor = if request.amount.is_none() && (paid - refundable).abs() <= EPSILON {
        None
    } else {
        Some(amounts::to_minor(record_amount))
    };

    let payment_id = resolve_payment_id(&order, history.last())
        .ok_or(AppError::MissingPaymentIdentifier)?;

    let mut metadata = request.metadata;
    metadata
        .entry("mode".to_string())
        .or_insert_with(|| "full".to_string());
    metadata.insert("ecommerce_order_id".to_string(), order.reference.clone());

    let api_result = state
        .refund_api
        .create_refund(&payment_id, send_amount_minor, &currency, &metadata)
        .await?;

    let request_data = serde_json::json!({
        "payment_id": payment_id,
        "amount": send_amount_minor,
        "currency": currency,
        "metadata": metadata,
    });

    let transaction = transaction_service::create_refund_transaction(
        &state.pool,
        &api_result.external_id,
        &order,
        record_amount,
        &currency,
        Some(request_data),
        Some(api_result.response),
        "admin",
    )
    .await?;

    Ok(transaction)
}

/// Cancel a pending refund at the provider.
///
/// Best-effort on the local side: if the local transaction cannot be found
/// the provider's outcome is still returned, with the inconsistency logged.
pub async fn cancel_refund(state: &AppState, external_id: &str) -> Result<bool, AppError> {
    let result = state.refund_api.cancel_refund(external_id).await?;

    let target = if result.canceled {
        TransactionStatus::Canceled
    } else {
        TransactionStatus::Failed
    };
    let update = transaction_service::update_transaction_status(
        &state.pool,
        external_id,
        target,
        StatusUpdate {
            updated_by: Some("admin"),
            ..Default::default()
        },
    )
    .await;
    if let Err(e) = update {
        tracing::error!(
            refund_id = external_id,
            error = %e,
            "failed to update local transaction after refund cancel"
        );
    }

    Ok(result.canceled)
}

/// The authoritative refundable ceiling for an order.
///
/// `max(0, total_paid_or_grand_total − Σ refund transactions in
/// {success, pending})`, rounded to 2 decimals. Pending refunds count as
/// spent: they may still settle.
pub fn refundable_amount(total_paid: f64, grand_total: f64, history: &[Transaction]) -> f64 {
    let paid = if total_paid > 0.0 { total_paid } else { grand_total };
    let refunded: f64 = history
        .iter()
        .filter(|t| {
            t.transaction_type == TransactionType::Refund
                && matches!(
                    t.status,
                    TransactionStatus::Success | TransactionStatus::Pending
                )
        })
        .filter_map(|t| t.amount)
        .sum();

    amounts::round2((paid - refunded).max(0.0))
}

/// Validate a requested amount against the refundable ceiling.
///
/// Returns the amount the pending transaction should record: the request's
/// amount for partial refunds, the full refundable balance otherwise.
pub fn validate_amount(
    refundable: f64,
    amount: Option<f64>,
    allow_partial: bool,
) -> Result<f64, AppError> {
    match amount {
        Some(amount) => {
            if amount <= 0.0 {
                return Err(AppError::InvalidAmount);
            }
            if !allow_partial && amount < refundable {
                return Err(AppError::PartialNotAllowed(refundable));
            }
            if amount - refundable > EPSILON {
                return Err(AppError::ExceedsRefundable(refundable));
            }
            Ok(amount)
        }
        None => {
            if refundable <= 0.0 {
                return Err(AppError::NothingToRefund);
            }
            Ok(refundable)
        }
    }
}

/// Resolve the provider payment identifier for an order.
///
/// Prefers the payment id stored on the order by the success handler;
/// falls back to the most recent non-refund transaction's id.
pub fn resolve_payment_id(order: &Order, latest: Option<&Transaction>) -> Option<String> {
    if let Some(payment_id) = order.payment_id.as_deref() {
        if !payment_id.is_empty() {
            return Some(payment_id.to_string());
        }
    }
    latest
        .filter(|t| t.transaction_type != TransactionType::Refund)
        .map(|t| t.transaction_id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sqlx::types::Json;
    use uuid::Uuid;

    fn refund_tx(status: TransactionStatus, amount: f64) -> Transaction {
        tx(TransactionType::Refund, status, Some(amount))
    }

    fn tx(
        transaction_type: TransactionType,
        status: TransactionStatus,
        amount: Option<f64>,
    ) -> Transaction {
        Transaction {
            id: Uuid::new_v4(),
            transaction_id: Uuid::new_v4().to_string(),
            order_id: None,
            order_reference: Some("000000123".to_string()),
            transaction_type,
            status,
            previous_status: None,
            amount,
            currency: "CLP".to_string(),
            request_data: None,
            response_data: None,
            webhook_data: None,
            status_history: Json(Vec::new()),
            error_code: None,
            error_message: None,
            retry_attempts: 0,
            created_by: None,
            updated_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn refundable_subtracts_success_and_pending_refunds() {
        let history = vec![
            tx(TransactionType::Webhook, TransactionStatus::Success, Some(100.0)),
            refund_tx(TransactionStatus::Success, 40.0),
            refund_tx(TransactionStatus::Pending, 20.0),
            // failed and canceled refunds do not consume the balance
            refund_tx(TransactionStatus::Failed, 15.0),
            refund_tx(TransactionStatus::Canceled, 5.0),
        ];
        assert_eq!(refundable_amount(100.0, 100.0, &history), 40.0);
    }

    #[test]
    fn refundable_falls_back_to_grand_total_and_floors_at_zero() {
        assert_eq!(refundable_amount(0.0, 80.0, &[]), 80.0);
        let history = vec![refund_tx(TransactionStatus::Success, 90.0)];
        assert_eq!(refundable_amount(0.0, 80.0, &history), 0.0);
    }

    #[test]
    fn amount_over_refundable_is_rejected() {
        let err = validate_amount(40.0, Some(50.0), true).unwrap_err();
        assert!(matches!(err, AppError::ExceedsRefundable(r) if r == 40.0));
        // epsilon absorbs float rounding noise
        assert!(validate_amount(40.0, Some(40.00009), true).is_ok());
    }

    #[test]
    fn partial_gating() {
        let err = validate_amount(100.0, Some(60.0), false).unwrap_err();
        assert!(matches!(err, AppError::PartialNotAllowed(r) if r == 100.0));
        assert_eq!(validate_amount(100.0, Some(100.0), false).unwrap(), 100.0);
        assert_eq!(validate_amount(100.0, None, false).unwrap(), 100.0);
        assert_eq!(validate_amount(100.0, Some(60.0), true).unwrap(), 60.0);
    }

    #[test]
    fn zero_or_negative_amounts_are_rejected() {
        assert!(matches!(
            validate_amount(100.0, Some(0.0), true),
            Err(AppError::InvalidAmount)
        ));
        assert!(matches!(
            validate_amount(100.0, Some(-5.0), true),
            Err(AppError::InvalidAmount)
        ));
    }

    #[test]
    fn full_refund_with_nothing_left_is_rejected() {
        assert!(matches!(
            validate_amount(0.0, None, true),
            Err(AppError::NothingToRefund)
        ));
    }

    #[test]
    fn payment_id_prefers_order_over_ledger() {
        let mut order = sample_order();
        order.payment_id = Some("pi_stored".to_string());
        let latest = tx(TransactionType::Webhook, TransactionStatus::Success, None);
        assert_eq!(
            resolve_payment_id(&order, Some(&latest)),
            Some("pi_stored".to_string())
        );
    }

    #[test]
    fn payment_id_falls_back_to_latest_non_refund_transaction() {
        let order = sample_order();
        let latest = tx(TransactionType::Webhook, TransactionStatus::Success, None);
        assert_eq!(
            resolve_payment_id(&order, Some(&latest)),
            Some(latest.transaction_id.clone())
        );
        // a refund as the latest transaction is not a payment identifier
        let refund = refund_tx(TransactionStatus::Pending, 10.0);
        assert_eq!(resolve_payment_id(&order, Some(&refund)), None);
        assert_eq!(resolve_payment_id(&order, None), None);
    }

    fn sample_order() -> Order {
        use crate::models::order::OrderState;
        Order {
            id: Uuid::new_v4(),
            reference: "000000123".to_string(),
            state: OrderState::Processing,
            payment_method: "provider_checkout".to_string(),
            payment_id: None,
            total_paid: 100.0,
            grand_total: 100.0,
            currency: "CLP".to_string(),
            cart_active: false,
            invoiced: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}
