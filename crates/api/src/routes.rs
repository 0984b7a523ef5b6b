use crate::state::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::Local;
use std::sync::Arc;

pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        // Health
        .route("/health", get(health_check))
        // Deals
        .route("/deals", get(list_deals))
        .route("/deals/today", get(todays_deals))
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": state.hub.session_count(),
    }))
}

// ---------------------------------------------------------------------------
// Deals
// ---------------------------------------------------------------------------

async fn list_deals(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.deals.history().await {
        Ok(deals) => (StatusCode::OK, Json(serde_json::json!(deals))),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": e.to_string()})),
        ),
    }
}

async fn todays_deals(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.deals.closed_on(Local::now().date_naive()).await {
        Ok(deals) => (StatusCode::OK, Json(serde_json::json!(deals))),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": e.to_string()})),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::HubOptions;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use sighub_data::MemoryStore;
    use tower::ServiceExt;

    fn app() -> Router {
        let state = Arc::new(AppState::new(Arc::new(MemoryStore::new()), HubOptions::default()));
        Router::new().nest("/api", api_routes()).with_state(state)
    }

    async fn get_json(uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health_reports_sessions() {
        let (status, body) = get_json("/api/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["sessions"], 0);
        assert!(body["version"].is_string());
    }

    #[tokio::test]
    async fn test_deal_lists_start_empty() {
        let (status, body) = get_json("/api/deals").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!([]));

        let (_, body) = get_json("/api/deals/today").await;
        assert_eq!(body, serde_json::json!([]));
    }
}
