//! Data models for the payment webhook server.

pub mod api_key;
pub mod order;
pub mod refund;
pub mod transaction;
pub mod webhook;
