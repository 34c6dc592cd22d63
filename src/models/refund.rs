//! Refund request/response types for the management API.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Request to refund an order through the provider.
///
/// # JSON Example
///
/// ```json
/// {
///   "order_reference": "000000123",
///   "amount": 40.0,
///   "metadata": { "mode": "items", "qtys": "{\"7\": 2}" }
/// }
/// ```
///
/// Omitting `amount` requests a full refund of whatever is still refundable.
/// `metadata` is forwarded to the provider after sanitization and drives the
/// credit-memo mode once the refund settles.
#[derive(Debug, Deserialize)]
pub struct RefundRequest {
    pub order_reference: String,

    /// Amount in major currency units; absent means full refund
    pub amount: Option<f64>,

    /// Currency code; defaults to the order's currency
    pub currency: Option<String>,

    /// Arbitrary reason/mode/quantity breakdown forwarded to the provider
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Response for a refund cancellation.
#[derive(Debug, Serialize)]
pub struct CancelRefundResponse {
    pub canceled: bool,
}
