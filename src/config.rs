//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to automatically deserialize environment variables into a type-safe struct.

use serde::Deserialize;

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `WEBHOOK_SECRET` (required): shared secret for verifying provider signatures
/// - `API_SECRET` (required): bearer secret for the provider refund API
/// - `REFUND_API_BASE_URL` (required): base URL of the provider refund API
/// - `REFUNDS_CREATE_PATH` / `REFUNDS_CANCEL_PATH` (optional): endpoint paths
/// - `REFUNDS_ENABLED` (optional): refund feature flag, defaults to false
/// - `REFUNDS_ALLOW_PARTIAL` (optional): allow partial refunds, defaults to false
/// - `REFUNDS_AUTO_CREDITMEMO` (optional): create credit memos when a refund
///   settles, defaults to true
/// - `WEBHOOK_TOLERANCE_SECS` (optional): signature timestamp tolerance, 300s
/// - `REFUND_API_TIMEOUT_SECS` (optional): outbound call timeout, 10s
/// - `PAYMENT_METHOD_CODE` (optional): payment method an order must carry to
///   be refundable through this provider
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    pub webhook_secret: String,

    pub api_secret: String,

    pub refund_api_base_url: String,

    #[serde(default = "default_refunds_create_path")]
    pub refunds_create_path: String,

    #[serde(default = "default_refunds_cancel_path")]
    pub refunds_cancel_path: String,

    #[serde(default)]
    pub refunds_enabled: bool,

    #[serde(default)]
    pub refunds_allow_partial: bool,

    #[serde(default = "default_true")]
    pub refunds_auto_creditmemo: bool,

    #[serde(default = "default_tolerance_secs")]
    pub webhook_tolerance_secs: i64,

    #[serde(default = "default_api_timeout_secs")]
    pub refund_api_timeout_secs: u64,

    #[serde(default = "default_payment_method_code")]
    pub payment_method_code: String,
}

/// Default port if SERVER_PORT environment variable is not set.
fn default_port() -> u16 {
    3000
}

fn default_refunds_create_path() -> String {
    "/v1/refunds".to_string()
}

fn default_refunds_cancel_path() -> String {
    "/v1/refunds/{id}/cancel".to_string()
}

fn default_true() -> bool {
    true
}

/// Default signature timestamp tolerance in seconds.
fn default_tolerance_secs() -> i64 {
    300
}

fn default_api_timeout_secs() -> u64 {
    10
}

fn default_payment_method_code() -> String {
    "provider_checkout".to_string()
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and deserializes them into a Config struct.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing (e.g., DATABASE_URL)
    /// - Environment variable values cannot be parsed into expected types
    pub fn from_env() -> Result<Self, envy::Error> {
        // Try to load .env file if it exists (does nothing if not found)
        dotenvy::dotenv().ok();

        // Parse environment variables into Config struct
        // Field names are automatically converted: database_url -> DATABASE_URL
        envy::from_env::<Config>()
    }
}
