//! Transaction ledger models and API request/response types.
//!
//! This module defines:
//! - `Transaction`: the persistent ledger entity, one row per external
//!   transaction id
//! - `TransactionType` / `TransactionStatus`: the closed sets of types and
//!   statuses a transaction can carry
//! - `StatusChange`: one entry of the append-only status history
//! - Request/response types for the management API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

/// Kind of ledger entry.
///
/// `Webhook` covers both transactions created by webhook handlers for orders
/// the provider notified us about and the bare idempotency markers keyed by
/// webhook event id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Authorization,
    Capture,
    Refund,
    Void,
    Webhook,
}

/// Lifecycle status of a transaction.
///
/// Transitions are recorded, not constrained: the provider does not guarantee
/// in-order delivery, so a `pending` redelivered after `success` simply
/// re-records `pending`. The latest write is authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Processing,
    Success,
    Failed,
    Canceled,
}

/// One entry of the append-only status history.
///
/// `from` is the status the row carried immediately before the write; the
/// first entry of a row created directly in its target status has `from: None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChange {
    pub from: Option<TransactionStatus>,
    pub to: TransactionStatus,
    pub timestamp: DateTime<Utc>,
    /// Who performed the transition, e.g. "webhook" or "admin".
    pub actor: Option<String>,
}

/// Represents a transaction record from the database.
///
/// # Database Table
///
/// Maps to the `transactions` table. Each transaction:
/// - Has a unique external `transaction_id` (provider id, locally generated
///   authorization id, or webhook event id for idempotency markers)
/// - Optionally references an order by id and external reference
/// - Carries `previous_status` set on every transition and an append-only
///   `status_history` that is never rewritten or truncated
/// - Accumulates raw webhook payloads in `webhook_data`, grouped by event
///   type so repeated deliveries stay individually visible
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Transaction {
    /// Surrogate key
    pub id: Uuid,

    /// External transaction id, unique across the ledger
    pub transaction_id: String,

    /// Owning order, NULL for webhook idempotency markers
    pub order_id: Option<Uuid>,

    /// External order reference, NULL for webhook idempotency markers
    pub order_reference: Option<String>,

    pub transaction_type: TransactionType,

    pub status: TransactionStatus,

    /// Status the row carried immediately before the current write
    pub previous_status: Option<TransactionStatus>,

    /// Amount in major currency units, rounded to 2 decimals
    pub amount: Option<f64>,

    /// Currency code (ISO 4217)
    pub currency: String,

    /// Opaque serialized request payload (e.g. refund API request)
    pub request_data: Option<serde_json::Value>,

    /// Opaque serialized response payload (e.g. refund API response)
    pub response_data: Option<serde_json::Value>,

    /// Raw webhook payloads grouped by event type
    pub webhook_data: Option<serde_json::Value>,

    /// Append-only ordered log of status transitions
    pub status_history: Json<Vec<StatusChange>>,

    pub error_code: Option<String>,

    pub error_message: Option<String>,

    pub retry_attempts: i32,

    pub created_by: Option<String>,

    pub updated_by: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Request to record the authorization leg of a checkout initiation.
///
/// # JSON Example
///
/// ```json
/// {
///   "transaction_id": "auth-000000123",
///   "order_reference": "000000123",
///   "amount": 100.0,
///   "currency": "CLP"
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct AuthorizeRequest {
    /// External transaction id; generated locally when omitted
    pub transaction_id: Option<String>,

    /// External order reference the authorization belongs to
    pub order_reference: String,

    /// Amount in major currency units
    pub amount: f64,

    /// Currency code; defaults to the order's currency
    pub currency: Option<String>,

    /// Opaque request payload to store alongside the transaction
    pub request_data: Option<serde_json::Value>,
}

/// Response returned for transaction operations.
#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub id: Uuid,
    pub transaction_id: String,
    pub order_reference: Option<String>,
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    pub previous_status: Option<TransactionStatus>,
    pub amount: Option<f64>,
    pub currency: String,
    pub status_history: Vec<StatusChange>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Convert database Transaction to API TransactionResponse.
///
/// This removes the opaque request/response/webhook blobs that API clients
/// don't need to see.
impl From<Transaction> for TransactionResponse {
    fn from(transaction: Transaction) -> Self {
        Self {
            id: transaction.id,
            transaction_id: transaction.transaction_id,
            order_reference: transaction.order_reference,
            transaction_type: transaction.transaction_type,
            status: transaction.status,
            previous_status: transaction.previous_status,
            amount: transaction.amount,
            currency: transaction.currency,
            status_history: transaction.status_history.0,
            error_code: transaction.error_code,
            error_message: transaction.error_message,
            created_at: transaction.created_at,
            updated_at: transaction.updated_at,
        }
    }
}
