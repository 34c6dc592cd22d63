//! Checkout authorization and transaction query endpoints.

use crate::error::AppError;
use crate::middleware::auth::AuthContext;
use crate::models::transaction::{AuthorizeRequest, TransactionResponse};
use crate::services::{order_gateway, transaction_service};
use crate::state::AppState;
use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
};
use uuid::Uuid;

/// Record the authorization leg of a checkout initiation.
///
/// Called by the storefront when it hands the customer to the provider's
/// checkout: creates the pending transaction the webhook handlers will
/// later transition, so success and failure webhooks converge on this row.
///
/// # Request
///
/// ```json
/// {
///   "order_reference": "000000123",
///   "amount": 49.90,
///   "currency": "CLP",
///   "transaction_id": "pi_abc123"
/// }
/// ```
///
/// # Errors
///
/// - 400 if amount is not positive
/// - 500 (`ORDER_NOT_FOUND`) if the order reference is unknown
pub async fn authorize(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<AuthorizeRequest>,
) -> Result<(StatusCode, Json<TransactionResponse>), AppError> {
    if request.amount <= 0.0 {
        return Err(AppError::InvalidRequest(
            "amount must be positive".to_string(),
        ));
    }

    let order = order_gateway::load_by_reference(&state.pool, &request.order_reference).await?;
    let currency = request.currency.unwrap_or_else(|| order.currency.clone());
    let transaction_id = request
        .transaction_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let transaction = transaction_service::create_authorization_transaction(
        &state.pool,
        &transaction_id,
        &order,
        request.amount,
        &currency,
        request.request_data,
        &auth.business_name,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(transaction.into())))
}

/// Fetch a transaction by its external id.
pub async fn get_transaction(
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
) -> Result<Json<TransactionResponse>, AppError> {
    let transaction = transaction_service::find_by_transaction_id(&state.pool, &transaction_id)
        .await?
        .ok_or(AppError::TransactionNotFound)?;

    Ok(Json(transaction.into()))
}

/// List an order's transactions, oldest first.
///
/// The full audit view: every status transition each row went through is
/// in its `status_history`.
pub async fn list_for_order(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Json<Vec<TransactionResponse>>, AppError> {
    // 404 for unknown orders rather than an empty list
    order_gateway::load_by_reference(&state.pool, &reference).await?;

    let transactions = transaction_service::history_for_order(&state.pool, &reference).await?;

    Ok(Json(transactions.into_iter().map(Into::into).collect()))
}
