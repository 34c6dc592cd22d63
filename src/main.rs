//! Payment webhook reconciliation service - main application entry point.
//!
//! A REST API server that keeps an e-commerce order ledger consistent with
//! an external payment provider. It ingests signed provider webhooks
//! (payment intents, checkout sessions, refunds), maintains an append-only
//! transaction audit trail, and orchestrates refunds against the provider's
//! API.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx (async queries)
//! - **Webhook auth**: timestamped HMAC-SHA256 signature over the raw body
//! - **Management auth**: API key with SHA-256 hashing
//! - **Format**: JSON requests/responses
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool
//! 3. Run database migrations
//! 4. Build the refund API client
//! 5. Build HTTP router with routes and middleware
//! 6. Start server on configured port

mod config;
mod db;
mod error;
mod handlers;
mod middleware;
mod models;
mod services;
mod state;

use tracing_subscriber::EnvFilter;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use state::AppState;
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging with tracing subscriber. Reads RUST_LOG environment variable (defaults to "info" level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // Load configuration
    let config = config::Config::from_env()?;
    tracing::info!("Configuration loaded");

    // Create database pool
    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Database pool created");

    // Run migrations
    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    let refund_api = services::refund_api::RefundApiClient::from_config(&config)?;
    let state = AppState {
        pool,
        config: config.clone(),
        refund_api,
    };

    // Management routes, authenticated with an API key
    let authenticated_routes = Router::new()
        .route(
            "/api/v1/transactions/authorize",
            post(handlers::transactions::authorize),
        )
        .route(
            "/api/v1/transactions/{transaction_id}",
            get(handlers::transactions::get_transaction),
        )
        .route(
            "/api/v1/orders/{reference}/transactions",
            get(handlers::transactions::list_for_order),
        )
        .route("/api/v1/refunds", post(handlers::refunds::create))
        .route(
            "/api/v1/refunds/{external_id}/cancel",
            post(handlers::refunds::cancel),
        )
        // Apply authentication middleware to all routes in this group
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ));

    let app = Router::new()
        // Public routes: health, and the webhook endpoint which carries its
        // own HMAC authentication
        .route("/health", get(handlers::health::health_check))
        .route("/webhooks/provider", post(handlers::webhooks::receive))
        .merge(authenticated_routes)
        // Add distributed tracing middleware for observability
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Bind to network address and start server
    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Start serving HTTP requests
    axum::serve(listener, app).await?;

    Ok(())
}
