//! Transaction ledger service - state machine and audit trail.
//!
//! This service owns every write to the `transactions` table:
//! - Creation of authorization, webhook, and refund rows
//! - The `update_transaction_status` transition, which always records
//!   `previous_status` and appends exactly one status-history entry
//! - Appending raw webhook payloads into the audit trail, grouped by
//!   event type
//!
//! # Serialization Guarantee
//!
//! Concurrent status updates for the same `transaction_id` are serialized
//! with a row-level `FOR UPDATE` lock inside a database transaction, so
//! `previous_status` and `status_history` can never be corrupted by a lost
//! update. No lock is ever held across an outbound API call.

use crate::db::DbPool;
use crate::error::AppError;
use crate::models::order::Order;
use crate::models::transaction::{StatusChange, Transaction, TransactionStatus, TransactionType};
use chrono::Utc;
use serde_json::Value;

/// Fields for a transaction created by a webhook handler.
#[derive(Debug)]
pub struct NewWebhookTransaction<'a> {
    pub transaction_id: String,
    pub order: &'a Order,
    pub amount: Option<f64>,
    pub currency: String,
    pub status: TransactionStatus,
    pub error_message: Option<String>,
    pub created_by: &'a str,
}

/// Extra fields recorded by a status transition.
#[derive(Debug, Default)]
pub struct StatusUpdate<'a> {
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    /// Erase stale error details instead of keeping them; set on success
    /// transitions so a recovered transaction does not carry an old failure.
    pub clear_errors: bool,
    pub updated_by: Option<&'a str>,
}

/// Look up a transaction by its external id.
///
/// Returns `None` when absent: upsert logic is a branch on this Option,
/// never an error handler.
pub async fn find_by_transaction_id(
    pool: &DbPool,
    transaction_id: &str,
) -> Result<Option<Transaction>, AppError> {
    let transaction =
        sqlx::query_as::<_, Transaction>("SELECT * FROM transactions WHERE transaction_id = $1")
            .bind(transaction_id)
            .fetch_optional(pool)
            .await?;

    Ok(transaction)
}

/// Earliest transaction recorded for an order, if any.
///
/// This is the row the upsert protocol transitions instead of creating a
/// duplicate per webhook delivery.
pub async fn first_for_order(
    pool: &DbPool,
    order_reference: &str,
) -> Result<Option<Transaction>, AppError> {
    let transaction = sqlx::query_as::<_, Transaction>(
        "SELECT * FROM transactions WHERE order_reference = $1 ORDER BY created_at ASC LIMIT 1",
    )
    .bind(order_reference)
    .fetch_optional(pool)
    .await?;

    Ok(transaction)
}

/// Most recent transaction recorded for an order, if any.
pub async fn latest_for_order(
    pool: &DbPool,
    order_reference: &str,
) -> Result<Option<Transaction>, AppError> {
    let transaction = sqlx::query_as::<_, Transaction>(
        "SELECT * FROM transactions WHERE order_reference = $1 ORDER BY created_at DESC LIMIT 1",
    )
    .bind(order_reference)
    .fetch_optional(pool)
    .await?;

    Ok(transaction)
}

/// All transactions recorded for an order, oldest first.
pub async fn history_for_order(
    pool: &DbPool,
    order_reference: &str,
) -> Result<Vec<Transaction>, AppError> {
    let transactions = sqlx::query_as::<_, Transaction>(
        "SELECT * FROM transactions WHERE order_reference = $1 ORDER BY created_at ASC",
    )
    .bind(order_reference)
    .fetch_all(pool)
    .await?;

    Ok(transactions)
}

/// Record the authorization leg of a checkout initiation, status pending.
pub async fn create_authorization_transaction(
    pool: &DbPool,
    transaction_id: &str,
    order: &Order,
    amount: f64,
    currency: &str,
    request_data: Option<Value>,
    created_by: &str,
) -> Result<Transaction, AppError> {
    let transaction = sqlx::query_as::<_, Transaction>(
        r#"
        INSERT INTO transactions (
            transaction_id, order_id, order_reference, transaction_type,
            status, amount, currency, request_data, created_by
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING *
        "#,
    )
    .bind(transaction_id)
    .bind(order.id)
    .bind(&order.reference)
    .bind(TransactionType::Authorization)
    .bind(TransactionStatus::Pending)
    .bind(amount)
    .bind(currency)
    .bind(request_data)
    .bind(created_by)
    .fetch_one(pool)
    .await?;

    tracing::info!(
        transaction_id,
        order = %order.reference,
        amount,
        currency,
        "authorization transaction created"
    );

    Ok(transaction)
}

/// Create a webhook-type transaction for an order.
pub async fn create_webhook_transaction(
    pool: &DbPool,
    new: NewWebhookTransaction<'_>,
) -> Result<Transaction, AppError> {
    let transaction = sqlx::query_as::<_, Transaction>(
        r#"
        INSERT INTO transactions (
            transaction_id, order_id, order_reference, transaction_type,
            status, amount, currency, error_message, created_by
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING *
        "#,
    )
    .bind(&new.transaction_id)
    .bind(new.order.id)
    .bind(&new.order.reference)
    .bind(TransactionType::Webhook)
    .bind(new.status)
    .bind(new.amount)
    .bind(&new.currency)
    .bind(&new.error_message)
    .bind(new.created_by)
    .fetch_one(pool)
    .await?;

    tracing::info!(
        transaction_id = %new.transaction_id,
        order = %new.order.reference,
        status = ?new.status,
        "webhook transaction created"
    );

    Ok(transaction)
}

/// Create a refund transaction, normally status pending; settlement happens
/// later via the refund webhook handlers.
#[allow(clippy::too_many_arguments)]
pub async fn create_refund_transaction(
    pool: &DbPool,
    transaction_id: &str,
    order: &Order,
    amount: f64,
    currency: &str,
    request_data: Option<Value>,
    response_data: Option<Value>,
    created_by: &str,
) -> Result<Transaction, AppError> {
    let transaction = sqlx::query_as::<_, Transaction>(
        r#"
        INSERT INTO transactions (
            transaction_id, order_id, order_reference, transaction_type,
            status, amount, currency, request_data, response_data, created_by
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING *
        "#,
    )
    .bind(transaction_id)
    .bind(order.id)
    .bind(&order.reference)
    .bind(TransactionType::Refund)
    .bind(TransactionStatus::Pending)
    .bind(amount)
    .bind(currency)
    .bind(request_data)
    .bind(response_data)
    .bind(created_by)
    .fetch_one(pool)
    .await?;

    tracing::info!(
        transaction_id,
        order = %order.reference,
        amount,
        currency,
        "refund transaction created as pending"
    );

    Ok(transaction)
}

/// Transition a transaction to a new status.
///
/// # Process
///
/// 1. Lock the row (`FOR UPDATE`) inside a database transaction
/// 2. Set `previous_status` to the status read under the lock
/// 3. Append one `{from, to, timestamp, actor}` entry to `status_history`
/// 4. Write the new status and any error details atomically
///
/// The history is append-only; N transitions on a row produce exactly N
/// entries, each `from` equal to the status immediately before that call.
///
/// # Errors
///
/// Returns `TransactionNotFound` if no row carries this external id.
pub async fn update_transaction_status(
    pool: &DbPool,
    transaction_id: &str,
    status: TransactionStatus,
    update: StatusUpdate<'_>,
) -> Result<Transaction, AppError> {
    let mut tx = pool.begin().await?;

    let current = sqlx::query_as::<_, Transaction>(
        "SELECT * FROM transactions WHERE transaction_id = $1 FOR UPDATE",
    )
    .bind(transaction_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::TransactionNotFound)?;

    let history = push_transition(
        current.status_history.0.clone(),
        current.status,
        status,
        update.updated_by,
    );

    let updated = sqlx::query_as::<_, Transaction>(
        r#"
        UPDATE transactions
        SET previous_status = status,
            status = $1,
            status_history = $2,
            error_code = CASE WHEN $3 THEN $4 ELSE COALESCE($4, error_code) END,
            error_message = CASE WHEN $3 THEN $5 ELSE COALESCE($5, error_message) END,
            updated_by = COALESCE($6, updated_by),
            updated_at = NOW()
        WHERE transaction_id = $7
        RETURNING *
        "#,
    )
    .bind(status)
    .bind(sqlx::types::Json(history))
    .bind(update.clear_errors)
    .bind(&update.error_code)
    .bind(&update.error_message)
    .bind(update.updated_by)
    .bind(transaction_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        transaction_id,
        from = ?updated.previous_status,
        to = ?updated.status,
        "transaction status updated"
    );

    Ok(updated)
}

/// Append a raw webhook payload into the transaction's audit trail.
///
/// Payloads are grouped by event type, each type holding an ordered list, so
/// repeated deliveries of the same event type stay individually visible for
/// forensic review instead of overwriting each other. Row-locked like the
/// status transition.
pub async fn append_webhook_data(
    pool: &DbPool,
    transaction_id: &str,
    event_type: &str,
    payload: &Value,
) -> Result<(), AppError> {
    let mut tx = pool.begin().await?;

    let existing: Option<Option<Value>> = sqlx::query_scalar(
        "SELECT webhook_data FROM transactions WHERE transaction_id = $1 FOR UPDATE",
    )
    .bind(transaction_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(existing) = existing else {
        return Err(AppError::TransactionNotFound);
    };

    let merged = merge_webhook_payload(existing, event_type, payload);

    sqlx::query("UPDATE transactions SET webhook_data = $1, updated_at = NOW() WHERE transaction_id = $2")
        .bind(merged)
        .bind(transaction_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(())
}

/// Append one transition entry to a status history.
///
/// `from` is the status read under the row lock, i.e. the status the row
/// carried immediately before this write. Append-only: entries are never
/// rewritten or dropped.
fn push_transition(
    mut history: Vec<StatusChange>,
    from: TransactionStatus,
    to: TransactionStatus,
    actor: Option<&str>,
) -> Vec<StatusChange> {
    history.push(StatusChange {
        from: Some(from),
        to,
        timestamp: Utc::now(),
        actor: actor.map(str::to_string),
    });
    history
}

/// Merge one payload into the grouped audit structure.
///
/// The structure is a mapping from event-type string to an ordered list of
/// payloads. Pre-existing data that is not an object is preserved under a
/// sentinel key rather than discarded.
fn merge_webhook_payload(existing: Option<Value>, event_type: &str, payload: &Value) -> Value {
    let mut data = match existing {
        Some(Value::Object(map)) => map,
        Some(other) => {
            let mut map = serde_json::Map::new();
            map.insert("__previous_invalid__".to_string(), other);
            map
        }
        None => serde_json::Map::new(),
    };

    let key = if event_type.is_empty() { "unknown" } else { event_type };
    let entry = data
        .entry(key.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    if !entry.is_array() {
        *entry = Value::Array(vec![entry.take()]);
    }
    if let Value::Array(list) = entry {
        list.push(payload.clone());
    }

    Value::Object(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn n_transitions_produce_n_entries_with_pre_write_from() {
        let transitions = [
            TransactionStatus::Processing,
            TransactionStatus::Success,
            TransactionStatus::Pending,
            TransactionStatus::Failed,
            TransactionStatus::Canceled,
        ];

        let mut history = Vec::new();
        let mut current = TransactionStatus::Pending;
        for to in transitions {
            history = push_transition(history, current, to, Some("webhook"));
            current = to;
        }

        assert_eq!(history.len(), transitions.len());
        assert_eq!(history[0].from, Some(TransactionStatus::Pending));
        // each entry's from is the previous entry's to
        for pair in history.windows(2) {
            assert_eq!(pair[1].from, Some(pair[0].to));
        }
        assert_eq!(history.last().unwrap().to, TransactionStatus::Canceled);
        assert!(history.iter().all(|c| c.actor.as_deref() == Some("webhook")));
    }

    #[test]
    fn merge_groups_payloads_by_event_type() {
        let first = merge_webhook_payload(None, "payment_intent.pending", &json!({"n": 1}));
        let second =
            merge_webhook_payload(Some(first), "payment_intent.pending", &json!({"n": 2}));
        let third =
            merge_webhook_payload(Some(second), "payment_intent.succeeded", &json!({"n": 3}));

        let pending = third["payment_intent.pending"].as_array().unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0]["n"], 1);
        assert_eq!(pending[1]["n"], 2);
        assert_eq!(third["payment_intent.succeeded"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn merge_defaults_empty_event_type_to_unknown() {
        let merged = merge_webhook_payload(None, "", &json!({"x": true}));
        assert!(merged["unknown"].as_array().is_some());
    }

    #[test]
    fn merge_keeps_invalid_previous_data() {
        let merged =
            merge_webhook_payload(Some(json!("oops")), "refund.succeeded", &json!({"id": "re_1"}));
        assert_eq!(merged["__previous_invalid__"], "oops");
        assert_eq!(merged["refund.succeeded"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn merge_wraps_scalar_bucket_into_list() {
        let existing = json!({"refund.failed": {"old": true}});
        let merged = merge_webhook_payload(Some(existing), "refund.failed", &json!({"new": true}));
        let bucket = merged["refund.failed"].as_array().unwrap();
        assert_eq!(bucket.len(), 2);
        assert_eq!(bucket[0]["old"], true);
        assert_eq!(bucket[1]["new"], true);
    }
}
