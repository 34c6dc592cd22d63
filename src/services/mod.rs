pub mod amounts;
pub mod handlers;
pub mod idempotency;
pub mod order_gateway;
pub mod parser;
pub mod refund_api;
pub mod refund_service;
pub mod router;
pub mod signature;
pub mod transaction_service;
