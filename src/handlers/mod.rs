//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives HTTP request data (JSON body, URL params, etc.)
//! 2. Performs business logic via the service layer
//! 3. Returns HTTP response (JSON, status code)

/// Service health endpoint
pub mod health;
/// Refund creation and cancellation endpoints
pub mod refunds;
/// Checkout authorization and transaction query endpoints
pub mod transactions;
/// Signed provider webhook intake
pub mod webhooks;
