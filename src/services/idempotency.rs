//! Webhook idempotency ledger.
//!
//! Every processed event id leaves a marker row in the transaction ledger
//! (type `webhook`, `transaction_id` = event id). A second delivery of the
//! same event id is answered with success without routing it again.
//!
//! `seen` followed by `mark_seen` is deliberately not atomic against a
//! concurrent duplicate delivery of the same event: the handlers' upsert
//! logic is idempotent in effect, so the narrow race window only risks a
//! harmless double-append of audit data, never a double state transition
//! with a corrupted history.

use crate::db::DbPool;
use crate::models::transaction::{TransactionStatus, TransactionType};

/// Whether a transaction with this external id already exists (of any type).
pub async fn seen(pool: &DbPool, event_id: &str) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM transactions WHERE transaction_id = $1)")
        .bind(event_id)
        .fetch_one(pool)
        .await
}

/// Best-effort creation of an idempotency marker.
///
/// Failure to mark is logged but never aborts the request: rejecting the
/// webhook would make the provider retry and is worse than the occasional
/// duplicate-marker race. `ON CONFLICT DO NOTHING` absorbs the case where a
/// concurrent delivery marked the event first.
pub async fn mark_seen(pool: &DbPool, event_id: &str) {
    let result = sqlx::query(
        r#"
        INSERT INTO transactions (transaction_id, transaction_type, status, currency, created_by)
        VALUES ($1, $2, $3, 'USD', 'webhook-idem')
        ON CONFLICT (transaction_id) DO NOTHING
        "#,
    )
    .bind(event_id)
    .bind(TransactionType::Webhook)
    .bind(TransactionStatus::Success)
    .execute(pool)
    .await;

    if let Err(e) = result {
        tracing::warn!(event_id, error = %e, "failed to record idempotency marker");
    }
}
