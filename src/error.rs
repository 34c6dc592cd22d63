//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Application-wide error type.
///
/// This enum represents all possible errors that can occur in the application.
/// Each variant maps to a specific HTTP status code and error message.
///
/// # Error Categories
///
/// - **Webhook Errors**: Signature or payload rejected before any side effect
/// - **Domain Errors**: Order lookup failures while processing an event;
///   the provider retries these deliveries, which is safe because no partial
///   state was committed
/// - **Refund Validation Errors**: Rejected refund requests, surfaced
///   synchronously to the refund caller
/// - **External API Errors**: Failures talking to the provider refund API
/// - **Database Errors**: Any sqlx::Error from database operations
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed (e.g., connection error, query error).
    ///
    /// This wraps any sqlx::Error using the `#[from]` attribute, which
    /// automatically implements `From<sqlx::Error> for AppError`.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// API key is missing, invalid, or inactive.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("Invalid API key")]
    InvalidApiKey,

    /// The webhook signature header is missing, malformed, stale, or does
    /// not match the request body.
    ///
    /// Returns HTTP 400 Bad Request. Verification happens on the raw bytes
    /// before any parsing, so a rejected body never reaches the handlers.
    #[error("Invalid webhook signature: {0}")]
    SignatureInvalid(String),

    /// The webhook body is not a JSON object.
    ///
    /// Returns HTTP 400 Bad Request.
    #[error("Invalid webhook payload: {0}")]
    PayloadInvalid(String),

    /// No known order-reference key was found in the event metadata.
    #[error("No order reference found in event metadata")]
    OrderReferenceMissing,

    /// The referenced order does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    /// The requested transaction does not exist.
    ///
    /// Returns HTTP 404 Not Found.
    #[error("Transaction not found")]
    TransactionNotFound,

    /// Refunds are turned off in configuration.
    #[error("Refunds are disabled in configuration")]
    RefundsDisabled,

    /// The order was not paid through this provider.
    #[error("Order is not paid with the configured payment method")]
    WrongPaymentMethod,

    /// The requested refund amount is zero or negative.
    #[error("Refund amount must be greater than zero")]
    InvalidAmount,

    /// Partial refunds are disabled and the requested amount is below the
    /// refundable ceiling.
    #[error("Partial refunds are disabled; the full refundable amount ({0:.2}) must be refunded")]
    PartialNotAllowed(f64),

    /// The requested amount exceeds what is still refundable.
    #[error("Refund amount exceeds refundable amount ({0:.2})")]
    ExceedsRefundable(f64),

    /// A full refund was requested but nothing is left to refund.
    #[error("Nothing to refund")]
    NothingToRefund,

    /// No provider payment identifier could be resolved for the order.
    #[error("Missing provider payment identifier for order")]
    MissingPaymentIdentifier,

    /// The provider refund API returned an error or was unreachable.
    ///
    /// Carries the provider's HTTP status when one was received. Network
    /// failures and timeouts land here too; the deterministic idempotency
    /// key makes a client-side retry safe.
    #[error("Refund API failure: {message}")]
    RefundApiFailure { status: Option<u16>, message: String },

    /// Request body or parameters are invalid.
    ///
    /// Returns HTTP 400 Bad Request.
    /// The String contains details about what was invalid.
    #[error("Invalid request")]
    InvalidRequest(String),
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::RefundApiFailure {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

/// Convert AppError into an HTTP response.
///
/// This implementation allows Axum handlers to return `Result<T, AppError>`
/// and have errors automatically converted to proper HTTP responses.
///
/// # Response Format
///
/// All errors return JSON in this format:
/// ```json
/// {
///   "error": "Human-readable error message",
///   "code": "error_type"
/// }
/// ```
///
/// # Status Code Mapping
///
/// - `InvalidApiKey` → 401 Unauthorized
/// - `SignatureInvalid` / `PayloadInvalid` / `InvalidRequest` → 400 Bad Request
/// - `TransactionNotFound` → 404 Not Found
/// - Refund validation errors → 422 Unprocessable Entity
/// - `OrderReferenceMissing` / `OrderNotFound` → 500 (the provider retries)
/// - `RefundApiFailure` → 502 Bad Gateway
/// - `Database` → 500 Internal Server Error (hides details from client)
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Map each error variant to (HTTP status, error code, message)
        let (status, code, message) = match self {
            AppError::InvalidApiKey => (
                StatusCode::UNAUTHORIZED,
                "invalid_api_key",
                self.to_string(),
            ),
            AppError::SignatureInvalid(_) => {
                (StatusCode::BAD_REQUEST, "signature_invalid", self.to_string())
            }
            AppError::PayloadInvalid(_) => {
                (StatusCode::BAD_REQUEST, "payload_invalid", self.to_string())
            }
            AppError::InvalidRequest(ref msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", msg.clone())
            }
            AppError::TransactionNotFound => (
                StatusCode::NOT_FOUND,
                "transaction_not_found",
                self.to_string(),
            ),
            AppError::RefundsDisabled => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "refunds_disabled",
                self.to_string(),
            ),
            AppError::WrongPaymentMethod => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "wrong_payment_method",
                self.to_string(),
            ),
            AppError::InvalidAmount => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "invalid_amount",
                self.to_string(),
            ),
            AppError::PartialNotAllowed(_) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "partial_not_allowed",
                self.to_string(),
            ),
            AppError::ExceedsRefundable(_) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "exceeds_refundable",
                self.to_string(),
            ),
            AppError::NothingToRefund => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "nothing_to_refund",
                self.to_string(),
            ),
            AppError::MissingPaymentIdentifier => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "missing_payment_identifier",
                self.to_string(),
            ),
            AppError::OrderReferenceMissing => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "order_reference_missing",
                self.to_string(),
            ),
            AppError::OrderNotFound(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "order_not_found",
                self.to_string(),
            ),
            AppError::RefundApiFailure { .. } => {
                (StatusCode::BAD_GATEWAY, "refund_api_failure", self.to_string())
            }
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "An internal error occurred".to_string(),
            ),
        };

        // Build JSON response body
        let body = Json(json!({
            "error": message,
            "code": code
        }));

        // Return the response with status code and JSON body
        (status, body).into_response()
    }
}
