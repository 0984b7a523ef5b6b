//! Session/broadcast gateway of the signal hub.
//!
//! Terminals and UI clients hold one WebSocket session each. Inbound frames
//! are decoded into signals or UI messages; replies go out to every session
//! through the [`BroadcastHub`].

pub mod hub;
pub mod messages;
pub mod routes;
pub mod state;
pub mod ws;

pub use hub::BroadcastHub;
pub use state::{AppState, HubOptions};

use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the Axum application router.
pub fn build_router(state: Arc<AppState>, ws_path: &str) -> Router {
    Router::new()
        .route(ws_path, get(ws::ws_handler))
        .nest("/api", routes::api_routes())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the gateway and serve until the listener fails.
pub async fn start_server(state: Arc<AppState>, bind_addr: &str, ws_path: &str) -> anyhow::Result<()> {
    let app = build_router(state, ws_path);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("Signal hub listening on {}{}", bind_addr, ws_path);
    axum::serve(listener, app).await?;
    Ok(())
}
