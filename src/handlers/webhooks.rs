//! Signed provider webhook intake.
//!
//! The single endpoint the payment provider delivers events to. Not behind
//! the API-key middleware: the HMAC signature over the raw body is the
//! authentication. The provider retries non-2xx responses, so only
//! signature and payload problems are rejected; domain failures return 500
//! and rely on the provider's retry to re-deliver.

use crate::error::AppError;
use crate::services::{idempotency, parser, router, signature};
use crate::state::AppState;
use axum::{Json, body::Bytes, extract::State, http::HeaderMap};
use serde_json::{Value, json};

/// Name of the signature header the provider sends.
pub const SIGNATURE_HEADER: &str = "Provider-Signature";

/// Provider webhook handler.
///
/// # Flow
///
/// 1. Verify the `Provider-Signature` header against the exact raw body
/// 2. Normalize the payload into a canonical event
/// 3. Short-circuit event ids already processed (`{"success":true,"duplicate":true}`)
/// 4. Route the event to its handler
/// 5. Mark the event id processed only after routing succeeded, so a failed
///    delivery is retried by the provider instead of being swallowed
///
/// # Responses
///
/// - 200 `{"success": true}` — processed (or ignored as unroutable)
/// - 200 `{"success": true, "duplicate": true}` — already processed
/// - 400 — bad signature or malformed payload
/// - 500 — domain failure; the provider will retry
pub async fn receive(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let header = headers
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            AppError::SignatureInvalid(format!("missing {SIGNATURE_HEADER} header"))
        })?;

    signature::verify_header(
        &body,
        header,
        &state.config.webhook_secret,
        state.config.webhook_tolerance_secs,
    )?;

    let event = parser::parse(&body)?;

    if let Some(event_id) = event.event_id.as_deref() {
        if idempotency::seen(&state.pool, event_id).await? {
            tracing::info!(event_id, "duplicate webhook delivery ignored");
            return Ok(Json(json!({"success": true, "duplicate": true})));
        }
    }

    router::dispatch(&state, &event).await?;

    if let Some(event_id) = event.event_id.as_deref() {
        idempotency::mark_seen(&state.pool, event_id).await;
    }

    tracing::info!(
        event_id = ?event.event_id,
        event_type = ?event.event_type,
        "webhook processed"
    );

    Ok(Json(json!({"success": true})))
}
