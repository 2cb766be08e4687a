pub mod ai;
pub mod api;
pub mod config;
pub mod database;
pub mod payments;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use tokio::signal;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/chat",
            post(api::chat::orchestrate)
                .get(api::chat::get_session_state)
                .delete(api::chat::clear_session),
        )
        .route("/api/completions", post(api::completions::complete))
        .route("/api/images", post(api::images::generate))
        .route("/api/vision", post(api::vision::analyze))
        .route("/api/video/talks", post(api::video::create_talk))
        .route(
            "/api/payments/checkout",
            post(api::payments::create_checkout_session),
        )
        .route("/api/payments/webhook", post(api::payments::handle_webhook))
        .route("/health", get(api::health::health))
        .layer(middleware::from_fn(api::middleware::bearer_identity_middleware))
        .layer(middleware::from_fn(api::middleware::diagnostics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let port = *config::HTTP_PORT;

    let _ = database::initialize_database().await?;

    let state = AppState::from_config()?;
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "starting {} gateway", *config::APP_NAME);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    database::cleanup_database().await;
    tracing::info!("shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, shutting down");
        },
        _ = terminate => {
            tracing::info!("received terminate signal, shutting down");
        },
    }
}
