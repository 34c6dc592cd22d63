//! Order collaborator gateway.
//!
//! The order/cart/invoice subsystem is external to this core; these are the
//! thin CRUD operations the webhook handlers and refund orchestrator need.
//! Each write here is a best-effort side effect from the handlers'
//! perspective: a failure is logged and never rolls back a committed
//! transaction-status transition.

use crate::db::DbPool;
use crate::error::AppError;
use crate::models::order::{Order, OrderState};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Look up an order by its external reference.
pub async fn find_by_reference(
    pool: &DbPool,
    reference: &str,
) -> Result<Option<Order>, AppError> {
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE reference = $1")
        .bind(reference)
        .fetch_optional(pool)
        .await?;

    Ok(order)
}

/// Look up an order by reference, failing with `OrderNotFound` when absent.
pub async fn load_by_reference(pool: &DbPool, reference: &str) -> Result<Order, AppError> {
    find_by_reference(pool, reference)
        .await?
        .ok_or_else(|| AppError::OrderNotFound(reference.to_string()))
}

/// Set the order's fulfillment state.
pub async fn set_state(pool: &DbPool, order_id: Uuid, state: OrderState) -> Result<(), AppError> {
    sqlx::query("UPDATE orders SET state = $1, updated_at = NOW() WHERE id = $2")
        .bind(state)
        .bind(order_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Cancel the order.
pub async fn cancel(pool: &DbPool, order_id: Uuid) -> Result<(), AppError> {
    set_state(pool, order_id, OrderState::Canceled).await
}

/// Append a history comment to the order.
pub async fn add_history_comment(
    pool: &DbPool,
    order_id: Uuid,
    comment: &str,
) -> Result<(), AppError> {
    sqlx::query("INSERT INTO order_comments (order_id, comment) VALUES ($1, $2)")
        .bind(order_id)
        .bind(comment)
        .execute(pool)
        .await?;

    Ok(())
}

/// Reactivate the customer's cart so a failed or expired checkout can be
/// retried.
pub async fn restore_cart(pool: &DbPool, order_id: Uuid) -> Result<(), AppError> {
    sqlx::query("UPDATE orders SET cart_active = true, updated_at = NOW() WHERE id = $1")
        .bind(order_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Mark the order invoiced and move it to processing.
///
/// This stands in for the invoice/capture flow of the e-commerce subsystem.
pub async fn mark_invoiced(pool: &DbPool, order_id: Uuid) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE orders SET invoiced = true, state = $1, total_paid = grand_total, updated_at = NOW() WHERE id = $2",
    )
    .bind(OrderState::Processing)
    .bind(order_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Store the provider payment identifier on the order.
///
/// The refund orchestrator prefers this id over ledger fallbacks.
pub async fn set_payment_id(
    pool: &DbPool,
    order_id: Uuid,
    payment_id: &str,
) -> Result<(), AppError> {
    sqlx::query("UPDATE orders SET payment_id = $1, updated_at = NOW() WHERE id = $2")
        .bind(payment_id)
        .bind(order_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// How a credit memo should be cut when a refund settles.
#[derive(Debug, PartialEq)]
pub enum CreditMemoPlan {
    /// Refund the whole order
    Full,
    /// Line-item-accurate refund driven by the refund metadata
    Items {
        /// item id → quantity, entries with non-positive quantities dropped
        qtys: BTreeMap<String, f64>,
        shipping_amount: Option<f64>,
        adjustment_positive: Option<f64>,
        adjustment_negative: Option<f64>,
    },
}

/// Derive the credit-memo plan from refund metadata.
///
/// `mode == "items"` with a non-empty quantity breakdown yields an item
/// plan; anything else falls back to a full credit memo. The `qtys` value
/// may arrive as a JSON object or as a JSON-encoded string of one.
pub fn credit_memo_plan(metadata: Option<&Map<String, Value>>) -> CreditMemoPlan {
    let Some(metadata) = metadata else {
        return CreditMemoPlan::Full;
    };
    let mode = metadata
        .get("mode")
        .or_else(|| metadata.get("Mode"))
        .and_then(Value::as_str);
    if mode != Some("items") {
        return CreditMemoPlan::Full;
    }

    let qtys_raw = metadata.get("qtys").or_else(|| metadata.get("Qtys"));
    let qtys_obj: Option<Map<String, Value>> = match qtys_raw {
        Some(Value::Object(map)) => Some(map.clone()),
        Some(Value::String(s)) if !s.is_empty() => serde_json::from_str(s).ok(),
        _ => None,
    };

    let mut qtys = BTreeMap::new();
    if let Some(map) = qtys_obj {
        for (item, qty) in map {
            let qty = match qty {
                Value::Number(n) => n.as_f64().unwrap_or(0.0),
                Value::String(s) => s.parse().unwrap_or(0.0),
                _ => 0.0,
            };
            if qty > 0.0 {
                qtys.insert(item, qty);
            }
        }
    }
    if qtys.is_empty() {
        return CreditMemoPlan::Full;
    }

    let number = |key: &str| -> Option<f64> {
        match metadata.get(key) {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.parse().ok(),
            _ => None,
        }
    };

    CreditMemoPlan::Items {
        qtys,
        shipping_amount: number("shipping_amount"),
        adjustment_positive: number("adjustment_positive"),
        adjustment_negative: number("adjustment_negative"),
    }
}

/// Record a credit memo for the order.
pub async fn create_credit_memo(
    pool: &DbPool,
    order_id: Uuid,
    plan: &CreditMemoPlan,
) -> Result<Uuid, AppError> {
    let id: Uuid = match plan {
        CreditMemoPlan::Full => {
            sqlx::query_scalar(
                "INSERT INTO credit_memos (order_id, mode) VALUES ($1, 'full') RETURNING id",
            )
            .bind(order_id)
            .fetch_one(pool)
            .await?
        }
        CreditMemoPlan::Items {
            qtys,
            shipping_amount,
            adjustment_positive,
            adjustment_negative,
        } => {
            sqlx::query_scalar(
                r#"
                INSERT INTO credit_memos (
                    order_id, mode, qtys, shipping_amount, adjustment_positive, adjustment_negative
                )
                VALUES ($1, 'items', $2, $3, $4, $5)
                RETURNING id
                "#,
            )
            .bind(order_id)
            .bind(serde_json::to_value(qtys).unwrap_or(Value::Null))
            .bind(shipping_amount)
            .bind(adjustment_positive)
            .bind(adjustment_negative)
            .fetch_one(pool)
            .await?
        }
    };

    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn metadata(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn defaults_to_full_plan() {
        assert_eq!(credit_memo_plan(None), CreditMemoPlan::Full);
        let md = metadata(json!({"mode": "full"}));
        assert_eq!(credit_memo_plan(Some(&md)), CreditMemoPlan::Full);
    }

    #[test]
    fn items_mode_without_quantities_falls_back_to_full() {
        let md = metadata(json!({"mode": "items"}));
        assert_eq!(credit_memo_plan(Some(&md)), CreditMemoPlan::Full);
        let md = metadata(json!({"mode": "items", "qtys": {"7": 0}}));
        assert_eq!(credit_memo_plan(Some(&md)), CreditMemoPlan::Full);
    }

    #[test]
    fn items_mode_parses_object_quantities() {
        let md = metadata(json!({
            "mode": "items",
            "qtys": {"7": 2, "9": 0, "11": "1.5"},
            "shipping_amount": 5.0
        }));
        match credit_memo_plan(Some(&md)) {
            CreditMemoPlan::Items {
                qtys,
                shipping_amount,
                ..
            } => {
                assert_eq!(qtys.len(), 2);
                assert_eq!(qtys["7"], 2.0);
                assert_eq!(qtys["11"], 1.5);
                assert_eq!(shipping_amount, Some(5.0));
            }
            other => panic!("expected items plan, got {other:?}"),
        }
    }

    #[test]
    fn items_mode_parses_json_string_quantities() {
        let md = metadata(json!({
            "mode": "items",
            "qtys": "{\"3\": 1}",
            "adjustment_negative": "2.5"
        }));
        match credit_memo_plan(Some(&md)) {
            CreditMemoPlan::Items {
                qtys,
                adjustment_negative,
                ..
            } => {
                assert_eq!(qtys["3"], 1.0);
                assert_eq!(adjustment_negative, Some(2.5));
            }
            other => panic!("expected items plan, got {other:?}"),
        }
    }
}
