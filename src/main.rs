//! Nomina Backend
//!
//! Pays workers through a Lightning wallet admin API, generates invoices and
//! follows them until paid, and keeps per-worker notes in SQLite.

mod api;
mod auth;
mod capture;
mod config;
mod db;
mod errors;
mod invoices;
mod ledger;
mod models;
mod wallet;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use capture::CaptureSurface;
use config::Config;
use db::Repository;
use invoices::{InvoicePoller, PollSettings};
use ledger::Ledger;
use wallet::WalletClient;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<Ledger>,
    pub wallet: WalletClient,
    pub poller: InvoicePoller,
    pub capture: Arc<CaptureSurface>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Load the ledger from `repo` and wire up the services around it.
    pub async fn build(repo: Repository, config: Config) -> Result<Self, errors::AppError> {
        let ledger = Arc::new(Ledger::load(repo).await?);
        let wallet = WalletClient::new(config.wallet_timeout)?;
        let poller = InvoicePoller::new(
            Arc::clone(&ledger),
            wallet.clone(),
            PollSettings {
                interval: config.poll_interval,
                max_attempts: config.poll_max_attempts,
            },
        );

        Ok(Self {
            ledger,
            wallet,
            poller,
            capture: Arc::new(CaptureSurface::new()),
            config: Arc::new(config),
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Nomina Backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Bind address: {}", config.bind_addr);
    tracing::info!(
        "Invoice poll: every {:?}, up to {} attempts",
        config.poll_interval,
        config.poll_max_attempts
    );

    if config.api_psk.is_none() {
        tracing::warn!("No API PSK configured (NOMINA_API_PSK). Authentication is disabled!");
    }

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;
    let repo = Repository::new(pool);

    let bind_addr = config.bind_addr;
    let state = AppState::build(repo, config).await?;
    if !state.ledger.settings().await.is_configured() {
        tracing::warn!("Wallet URL and admin key are not configured yet");
    }

    let poller = state.poller.clone();
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("Server listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Cancelling {} running invoice poll(s)", poller.active_count());
    poller.cancel_all();
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Clone PSK for the auth layer
    let psk = state.config.api_psk.clone();

    // API routes
    let api_routes = Router::new()
        .route("/revision", get(api::get_revision))
        // Settings
        .route("/settings", get(api::get_settings).put(api::save_settings))
        // Wallet
        .route("/wallet/balance", get(api::get_balance))
        .route("/payments", post(api::pay_invoice))
        // Workers
        .route("/workers", get(api::list_workers).post(api::create_worker))
        .route("/workers/{id}", delete(api::delete_worker))
        .route("/workers/{id}/pay", post(api::pay_worker))
        .route("/workers/{id}/qr", get(api::get_worker_qr))
        // Notes
        .route("/notes", get(api::list_notes))
        .route(
            "/workers/{id}/notes",
            get(api::get_note).put(api::save_note),
        )
        // Invoices
        .route("/invoices", get(api::list_invoices).post(api::create_invoice))
        .route(
            "/invoices/{id}",
            get(api::get_invoice).delete(api::delete_invoice),
        )
        .route("/invoices/{id}/qr", get(api::get_invoice_qr))
        .route(
            "/invoices/{id}/poll",
            post(api::start_invoice_poll).delete(api::cancel_invoice_poll),
        )
        // Capture
        .route("/capture", post(api::open_capture))
        .route(
            "/capture/{id}",
            get(api::get_capture).delete(api::close_capture),
        )
        .route("/capture/{id}/frame", post(api::submit_frame))
        .route("/capture/{id}/upload", post(api::submit_upload))
        .layer(DefaultBodyLimit::max(capture::MAX_IMAGE_BYTES))
        // Apply PSK auth middleware
        .layer(middleware::from_fn(move |req, next| {
            auth::psk_auth_layer(psk.clone(), req, next)
        }));

    // Health check (no auth required)
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests;
