//! HTTP client for the provider refunds API.
//!
//! A thin, swappable collaborator: create and cancel refunds against
//! configurable endpoint paths. Every create call carries a deterministic
//! `Idempotency-Key` so retried HTTP calls for the identical logical refund
//! never create two provider-side refunds.

use crate::config::Config;
use crate::error::AppError;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::time::Duration;

/// Result of a successful refund creation.
///
/// The provider-reported status is not surfaced separately; the full
/// response payload is stored on the local transaction and the row stays
/// pending until the refund webhook settles it.
#[derive(Debug)]
pub struct RefundApiResult {
    /// Provider-side refund id
    pub external_id: String,
    /// Full response payload, stored on the local transaction
    pub response: Value,
}

/// Result of a refund cancellation.
#[derive(Debug)]
pub struct CancelApiResult {
    pub canceled: bool,
    pub response: Value,
}

/// Client for the provider refunds API.
#[derive(Clone)]
pub struct RefundApiClient {
    http: reqwest::Client,
    base_url: String,
    create_path: String,
    cancel_path: String,
    api_secret: String,
}

impl RefundApiClient {
    /// Build a client from configuration.
    ///
    /// The base URL is validated up front and the HTTP client carries a
    /// bounded timeout; a hung provider call must not hold a webhook or
    /// refund request open indefinitely.
    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let base = url::Url::parse(&config.refund_api_base_url).map_err(|e| {
            AppError::InvalidRequest(format!("invalid refund API base URL: {e}"))
        })?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.refund_api_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: base.as_str().trim_end_matches('/').to_string(),
            create_path: config.refunds_create_path.clone(),
            cancel_path: config.refunds_cancel_path.clone(),
            api_secret: config.api_secret.clone(),
        })
    }

    /// Create a refund at the provider.
    ///
    /// `amount_minor` is in minor currency units; None requests a full
    /// refund of the payment.
    ///
    /// # Errors
    ///
    /// Network failures, timeouts, and 4xx/5xx responses map to
    /// `RefundApiFailure`. The idempotency key makes a retry safe.
    pub async fn create_refund(
        &self,
        payment_id: &str,
        amount_minor: Option<i64>,
        currency: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<RefundApiResult, AppError> {
        let url = format!("{}{}", self.base_url, self.create_path);
        let idempotency_key = build_idempotency_key(
            payment_id,
            amount_minor,
            currency,
            metadata.get("mode").map(String::as_str),
        );

        let mut payload = json!({
            "resource_id": payment_id,
            "resource_type": "payment_intent",
            "currency": currency,
        });
        if let Some(amount) = amount_minor {
            payload["amount"] = json!(amount);
        }
        if !metadata.is_empty() {
            payload["metadata"] = json!(metadata);
        }

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_secret)
            .header("Idempotency-Key", &idempotency_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);

        if status.as_u16() >= 400 {
            tracing::error!(
                operation = "create",
                status = status.as_u16(),
                body = %body,
                "refund API error"
            );
            return Err(AppError::RefundApiFailure {
                status: Some(status.as_u16()),
                message: api_error_message(&body, "refund create failed"),
            });
        }

        // Some response shapes nest the refund under "data"
        let object = body.get("data").filter(|d| d.is_object()).unwrap_or(&body);
        let external_id = object
            .get("id")
            .or_else(|| object.get("refund_id"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        if external_id.is_empty() {
            return Err(AppError::RefundApiFailure {
                status: Some(status.as_u16()),
                message: "refund API did not return a refund id".to_string(),
            });
        }

        Ok(RefundApiResult {
            external_id,
            response: body,
        })
    }

    /// Cancel a still-pending refund at the provider.
    pub async fn cancel_refund(&self, external_id: &str) -> Result<CancelApiResult, AppError> {
        let path = self.cancel_path.replace("{id}", external_id);
        let url = format!("{}{}", self.base_url, path);

        let response = self.http.post(&url).bearer_auth(&self.api_secret).send().await?;

        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);

        if status.as_u16() >= 400 {
            tracing::error!(
                operation = "cancel",
                status = status.as_u16(),
                body = %body,
                "refund API error"
            );
            return Err(AppError::RefundApiFailure {
                status: Some(status.as_u16()),
                message: api_error_message(&body, "refund cancel failed"),
            });
        }

        let object = body.get("data").filter(|d| d.is_object()).unwrap_or(&body);
        let refund_status = object
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_ascii_lowercase();
        let canceled = refund_status == "canceled"
            || refund_status == "cancelled"
            || object.get("canceled").and_then(Value::as_bool).unwrap_or(false);

        Ok(CancelApiResult {
            canceled,
            response: body,
        })
    }
}

/// Derive the idempotency key for a logical refund request.
///
/// Deterministic over (payment id, amount-or-"full", currency, mode): the
/// same logical request always produces the same key, while a different
/// amount or mode produces a different one.
pub fn build_idempotency_key(
    payment_id: &str,
    amount_minor: Option<i64>,
    currency: &str,
    mode: Option<&str>,
) -> String {
    let amount_part = match amount_minor {
        Some(minor) => minor.to_string(),
        None => "full".to_string(),
    };
    let mut parts = format!("{payment_id}|{amount_part}|{currency}");
    if let Some(mode) = mode {
        parts.push('|');
        parts.push_str(mode);
    }

    let digest = Sha256::digest(parts.as_bytes());
    format!("refund-{}", &hex::encode(digest)[..32])
}

fn api_error_message(body: &Value, fallback: &str) -> String {
    body.get("error")
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .unwrap_or(fallback)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idempotency_key_is_stable() {
        let a = build_idempotency_key("pi_1", Some(4000), "CLP", Some("full"));
        let b = build_idempotency_key("pi_1", Some(4000), "CLP", Some("full"));
        assert_eq!(a, b);
        assert!(a.starts_with("refund-"));
        assert_eq!(a.len(), "refund-".len() + 32);
    }

    #[test]
    fn idempotency_key_varies_with_inputs() {
        let base = build_idempotency_key("pi_1", Some(4000), "CLP", Some("full"));
        assert_ne!(base, build_idempotency_key("pi_1", Some(4001), "CLP", Some("full")));
        assert_ne!(base, build_idempotency_key("pi_1", Some(4000), "CLP", Some("items")));
        assert_ne!(base, build_idempotency_key("pi_1", None, "CLP", Some("full")));
        assert_ne!(base, build_idempotency_key("pi_2", Some(4000), "CLP", Some("full")));
        assert_ne!(base, build_idempotency_key("pi_1", Some(4000), "USD", Some("full")));
    }

    #[test]
    fn error_message_prefers_provider_detail() {
        let body = serde_json::json!({"error": {"message": "insufficient funds"}});
        assert_eq!(api_error_message(&body, "fallback"), "insufficient funds");
        assert_eq!(api_error_message(&Value::Null, "fallback"), "fallback");
    }
}
