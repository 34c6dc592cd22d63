//! Webhook payload normalization.
//!
//! The provider has shipped at least three envelope shapes over time:
//!
//! ```json
//! {"id": "evt_1", "type": "payment_intent.succeeded", "data": {"object": {...}}}
//! {"type": "payment_intent.succeeded", "data": {...}}
//! {"object": "payment_intent", "status": "succeeded", ...}
//! ```
//!
//! This module absorbs all of them into one canonical [`WebhookEvent`] so
//! handler code never branches on raw shape.

use crate::error::AppError;
use crate::models::webhook::WebhookEvent;
use serde_json::{Map, Value};

/// Parse a signature-verified raw body into a [`WebhookEvent`].
///
/// # Extraction rules
///
/// - `event_id`: first string found among `id`, `data.id`
/// - `event_type`: `type` if present and a string, else None (the router
///   infers one from the object's shape)
/// - `object`: `data.object` if an object, else `data` if an object, else
///   top-level `object` if an object, else the whole body
/// - `object.metadata`: snake_case keys gain camelCase duplicates,
///   non-destructively, so handlers read a single naming convention
///
/// # Errors
///
/// Returns `PayloadInvalid` if the body is not a JSON object.
pub fn parse(raw: &[u8]) -> Result<WebhookEvent, AppError> {
    if raw.is_empty() {
        return Err(AppError::PayloadInvalid("empty webhook body".to_string()));
    }
    let data: Value = serde_json::from_slice(raw)
        .map_err(|e| AppError::PayloadInvalid(e.to_string()))?;
    let envelope = data
        .as_object()
        .ok_or_else(|| AppError::PayloadInvalid("webhook body is not an object".to_string()))?;

    let event_id = envelope
        .get("id")
        .and_then(Value::as_str)
        .or_else(|| envelope.get("data").and_then(|d| d.get("id")).and_then(Value::as_str))
        .map(str::to_string);

    let event_type = envelope
        .get("type")
        .and_then(Value::as_str)
        .map(str::to_string);

    let mut object = extract_object(envelope);

    if let Some(Value::Object(metadata)) = object.get("metadata") {
        let normalized = normalize_metadata(metadata);
        object.insert("metadata".to_string(), Value::Object(normalized));
    }

    Ok(WebhookEvent {
        event_id,
        event_type,
        object,
        full_payload: data,
    })
}

/// Pick the business object out of the envelope.
///
/// The nested `data.object` shape wins over bare `data`: when present,
/// `data` is just a wrapper and the business fields live one level down.
fn extract_object(envelope: &Map<String, Value>) -> Map<String, Value> {
    if let Some(Value::Object(data)) = envelope.get("data") {
        if let Some(Value::Object(inner)) = data.get("object") {
            return inner.clone();
        }
        return data.clone();
    }
    if let Some(Value::Object(top)) = envelope.get("object") {
        return top.clone();
    }
    envelope.clone()
}

/// Produce camelCase duplicates of snake_case metadata keys.
///
/// Both spellings coexist afterwards; nothing is removed.
fn normalize_metadata(metadata: &Map<String, Value>) -> Map<String, Value> {
    let mut normalized = metadata.clone();
    for (key, value) in metadata {
        let camel = camelize(key);
        if camel != *key && !normalized.contains_key(&camel) {
            normalized.insert(camel, value.clone());
        }
    }
    normalized
}

/// snake_case → camelCase ("order_id" → "orderId").
fn camelize(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper_next = false;
    for ch in key.chars() {
        if ch == '_' {
            upper_next = true;
        } else if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_nested_data_object_envelope() {
        let body = json!({
            "type": "payment_intent.succeeded",
            "data": {"object": {"id": "pi_1", "status": "succeeded",
                "metadata": {"order_id": "000000123"}}}
        });
        let event = parse(body.to_string().as_bytes()).unwrap();
        assert_eq!(event.event_type.as_deref(), Some("payment_intent.succeeded"));
        assert_eq!(event.event_id, None);
        assert_eq!(event.object_str("id"), Some("pi_1"));
        // metadata gained a camelCase duplicate, snake_case is still there
        let metadata = event.metadata().unwrap();
        assert_eq!(metadata["order_id"], "000000123");
        assert_eq!(metadata["orderId"], "000000123");
    }

    #[test]
    fn parses_flat_data_envelope_with_event_id() {
        let body = json!({
            "id": "evt_42",
            "type": "refund.succeeded",
            "data": {"id": "re_9", "status": "succeeded", "amount": 4000}
        });
        let event = parse(body.to_string().as_bytes()).unwrap();
        assert_eq!(event.event_id.as_deref(), Some("evt_42"));
        assert_eq!(event.object_str("id"), Some("re_9"));
    }

    #[test]
    fn event_id_falls_back_to_data_id() {
        let body = json!({"data": {"id": "evt_7", "status": "pending"}});
        let event = parse(body.to_string().as_bytes()).unwrap();
        assert_eq!(event.event_id.as_deref(), Some("evt_7"));
    }

    #[test]
    fn object_degrades_to_full_payload() {
        let body = json!({"object": "payment_intent", "status": "succeeded"});
        let event = parse(body.to_string().as_bytes()).unwrap();
        assert_eq!(event.object_str("object"), Some("payment_intent"));
        assert_eq!(event.event_type, None);
    }

    #[test]
    fn rejects_non_object_bodies() {
        assert!(parse(b"").is_err());
        assert!(parse(b"[1,2,3]").is_err());
        assert!(parse(b"not json").is_err());
        assert!(parse(b"\"string\"").is_err());
    }

    #[test]
    fn camelize_handles_plain_and_snake_keys() {
        assert_eq!(camelize("order_id"), "orderId");
        assert_eq!(camelize("ecommerce_order_id"), "ecommerceOrderId");
        assert_eq!(camelize("order"), "order");
    }

    #[test]
    fn normalization_does_not_clobber_existing_camel_keys() {
        let body = json!({
            "data": {"metadata": {"order_id": "a", "orderId": "b"}}
        });
        let event = parse(body.to_string().as_bytes()).unwrap();
        let metadata = event.metadata().unwrap();
        assert_eq!(metadata["orderId"], "b");
        assert_eq!(metadata["order_id"], "a");
    }
}
