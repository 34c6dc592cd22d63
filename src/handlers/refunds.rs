//! Refund creation and cancellation endpoints.

use crate::error::AppError;
use crate::models::refund::{CancelRefundResponse, RefundRequest};
use crate::models::transaction::TransactionResponse;
use crate::services::refund_service;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

/// Request a refund for an order.
///
/// # Request
///
/// ```json
/// {
///   "order_reference": "000000123",
///   "amount": 10.00,
///   "metadata": {"mode": "items", "qtys": "{\"7\": 1}"}
/// }
/// ```
///
/// Omit `amount` for a full refund of the remaining balance.
///
/// # Response (201 Created)
///
/// The refund transaction, status `pending`. It settles to `success` or
/// `failed` when the provider's refund webhook arrives.
///
/// # Errors
///
/// 422 for business-rule rejections (refunds disabled, wrong payment
/// method, amount over the refundable balance, nothing left to refund),
/// 502 when the provider API rejects or times out.
pub async fn create(
    State(state): State<AppState>,
    Json(request): Json<RefundRequest>,
) -> Result<(StatusCode, Json<TransactionResponse>), AppError> {
    let transaction = refund_service::request_refund(&state, request).await?;

    Ok((StatusCode::CREATED, Json(transaction.into())))
}

/// Cancel a still-pending refund at the provider.
///
/// # Response (200 OK)
///
/// `{"canceled": true}` when the provider confirmed the cancellation,
/// `{"canceled": false}` when the refund had already executed.
pub async fn cancel(
    State(state): State<AppState>,
    Path(external_id): Path<String>,
) -> Result<Json<CancelRefundResponse>, AppError> {
    let canceled = refund_service::cancel_refund(&state, &external_id).await?;

    Ok(Json(CancelRefundResponse { canceled }))
}
