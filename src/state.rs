//! Shared application state.
//!
//! Dependencies are passed explicitly through this struct rather than read
//! from process-wide singletons, which keeps the core independently
//! testable.

use crate::config::Config;
use crate::db::DbPool;
use crate::services::refund_api::RefundApiClient;

/// State shared with all request handlers via axum's `State` extraction.
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub config: Config,
    pub refund_api: RefundApiClient,
}
